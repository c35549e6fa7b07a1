//! # sessionwire Client
//!
//! Sends one message over an authenticated, encrypted session and prints the
//! reply.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sessionwire::{exchange_message, plain_exchange, EndpointConfig};
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

/// Send a message to a sessionwire responder
#[derive(Parser)]
#[command(name = "sessionwire-client")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Endpoint configuration (JSON or TOML)
    #[arg(short, long, default_value = "sample.json")]
    config: PathBuf,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Plain TCP echo exchange: no certificate check, no encryption
    #[arg(long)]
    plain: bool,

    /// Message to send
    message: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install log subscriber")?;

    let config = EndpointConfig::load(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    debug!("Loaded config: {:?}", config);

    let reply = if cli.plain {
        plain_exchange(&config, cli.message.as_bytes()).await
    } else {
        exchange_message(&config, cli.message.as_bytes()).await
    }
    .with_context(|| format!("Exchange with {} failed", config.address()))?;

    println!("server: {}", String::from_utf8_lossy(&reply));
    Ok(())
}
