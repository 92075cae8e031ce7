//! `chains` command line interface

use anyhow::{Context, Result};
use chain_orchestration::{Orchestrator, OrchestratorConfig};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[command(name = "chains")]
#[command(about = "Create blockchain node containers and the services attached to them")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to <home>/config.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage chains
    Chain {
        #[command(subcommand)]
        command: commands::chain::ChainCommands,
    },

    /// Manage services
    Service {
        #[command(subcommand)]
        command: commands::service::ServiceCommands,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    smol::block_on(async {
        let config = OrchestratorConfig::load_or_default(cli.config.as_deref())
            .context("Failed to load settings")?;
        let orchestrator = Orchestrator::new(config).context("Failed to set up orchestrator")?;

        match cli.command {
            Commands::Chain { command } => commands::chain::run(&orchestrator, command).await,
            Commands::Service { command } => commands::service::run(&orchestrator, command).await,
        }
    })
}
