//! Vidnotes - resilient AI generation for study material
//!
//! CLI entry point wrapping the `vidnotes-llm` orchestrator.

#![forbid(unsafe_code)]

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Parsed first: --json-logs picks the formatter.
    let cli = cli::Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "vidnotes=info,vidnotes_llm=info".into());
    let (json_layer, text_layer) = if cli.json_logs {
        (
            Some(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
            None,
        )
    } else {
        (
            None,
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .init();

    if cli.command.is_some() {
        debug!("Starting Vidnotes v{}", env!("CARGO_PKG_VERSION"));
    }

    cli::run(cli).await
}
