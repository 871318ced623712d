//! Sluice - streaming enrichment pipeline
//!
//! # Usage
//!
//! ```bash
//! # Run the pipeline
//! sluice run --config configs/sluice.toml
//!
//! # Send framed sample payloads at a running pipeline
//! sluice send --target 127.0.0.1:7401 --count 10
//! ```
//!
//! Exit codes: 0 on clean shutdown, non-zero on a configuration error or
//! an unrecoverable runtime failure.

mod cmd;
mod environment;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Streaming enrichment pipeline
#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline
    Run(cmd::run::RunArgs),

    /// Send framed sample collector payloads to a pipeline input
    Send(cmd::send::SendArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Command::Run(args) => cmd::run::run(args).await,
        Command::Send(args) => cmd::send::run(args).await,
    }
}

/// Initialize the tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}
