//! The resilient client facade.

mod builder;
mod client;

pub use builder::ResilientClientBuilder;
pub use client::{ClientStats, ResilientClient};
