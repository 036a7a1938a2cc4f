//! Public types for the Heimdall API.

mod message;
mod options;
mod response;

pub use message::{Message, Role};
pub use options::LlmConfig;
pub use response::{ChatResponse, TokenUsage};
