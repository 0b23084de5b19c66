//! CLI module for Vidnotes
//!
//! Provides commands:
//! - `generate`: run one request through the orchestrator
//! - `models`: show which models a prompt size would be routed to
//! - `status`: credential, model and usage state

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use vidnotes_llm::RequiredCapability;

pub mod generate;
pub mod models;
pub mod status;

/// Vidnotes AI generation CLI
#[derive(Parser, Debug)]
#[command(name = "vidnotes")]
#[command(about = "Resilient AI generation for study material")]
#[command(version)]
pub struct Cli {
    /// Extra configuration file layered over the defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate content for a domain
    Generate(generate::GenerateArgs),
    /// List model candidates for a prompt size
    Models {
        /// Estimated prompt tokens
        #[arg(long, default_value_t = 1_000)]
        tokens: usize,
        /// Required capability (low, medium, high)
        #[arg(long)]
        capability: Option<RequiredCapability>,
    },
    /// Show pool, catalog and usage state
    Status {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let load = || crate::config::load_config(cli.config.as_deref());
    match cli.command {
        Some(Commands::Generate(ref args)) => generate::run(load()?, args).await,
        Some(Commands::Models {
            tokens,
            capability,
        }) => models::run(load()?, tokens, capability).await,
        Some(Commands::Status { json }) => status::run(load()?, json).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
