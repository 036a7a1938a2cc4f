//! heimdall: send prompts through a resilient client
//!
//! Builds a `ResilientClient` from configuration and issues chat calls
//! against the configured OpenAI-compatible backend.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heimdall::{HeimdallConfig, LlmConfig, Message, ResilientClient};

/// Heimdall CLI
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version)]
#[command(about = "Resilient LLM client: cache, rate limit, circuit breaker, retry")]
struct Args {
    /// Config file (default: ~/.heimdall/config.toml if present)
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt and print the reply
    Chat {
        /// User message (or omit to read from stdin)
        message: Option<String>,
        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
        /// Model to request (default: backend.model from config)
        #[arg(short, long)]
        model: Option<String>,
        /// Sampling temperature
        #[arg(short, long)]
        temperature: Option<f32>,
        /// Maximum tokens to generate
        #[arg(long)]
        max_tokens: Option<u32>,
        /// Send the same prompt this many times (later calls hit the cache)
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
        /// Print client stats as JSON after the calls
        #[arg(long)]
        stats: bool,
    },

    /// Print the resolved configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = HeimdallConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Config => {
            println!("{config:#?}");
            if config.api_key().is_none() {
                eprintln!("note: ${} is not set", config.backend.api_key_env);
            }
        }

        Command::Chat {
            message,
            system,
            model,
            temperature,
            max_tokens,
            repeat,
            stats,
        } => {
            let client = ResilientClient::from_config(&config)?;

            let message = resolve_text(message, "chat")?;
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system {
                messages.push(Message::system(system));
            }
            messages.push(Message::user(message));

            let mut options = LlmConfig::new();
            if let Some(model) = model {
                options = options.model(model);
            }
            if let Some(t) = temperature {
                options = options.temperature(t);
            }
            if let Some(n) = max_tokens {
                options = options.max_tokens(n);
            }

            for _ in 0..repeat.max(1) {
                let reply = client.chat(&messages, &options).await?;
                println!("{reply}");
            }

            if stats {
                println!("{}", serde_json::to_string_pretty(&client.stats())?);
            }
        }
    }

    Ok(())
}

/// Resolve text input from an optional CLI argument and/or stdin.
///
/// - arg only → arg
/// - stdin only → stdin
/// - both → `"{arg}\n\n{stdin}"`
/// - neither → error
fn resolve_text(arg: Option<String>, command: &str) -> Result<String, Box<dyn std::error::Error>> {
    let stdin_text = if io::stdin().is_terminal() {
        None
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        let trimmed = buf.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    };

    match (arg, stdin_text) {
        (Some(a), Some(s)) => Ok(format!("{a}\n\n{s}")),
        (Some(a), None) => Ok(a),
        (None, Some(s)) => Ok(s),
        (None, None) => {
            Err(format!("{command}: no input provided (pass text as argument or via stdin)").into())
        }
    }
}
