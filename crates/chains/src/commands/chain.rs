use super::LogArgs;
use anyhow::{Context, Result};
use chain_orchestration::{
    ChainArtifact, ChainState, ContainerKind, Orchestrator, RemoveChainOptions,
};
use clap::Subcommand;
use comfy_table::{Cell, Color, Table};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum ChainCommands {
    /// Create and start a new chain
    New {
        /// Chain name
        name: String,

        /// Chain type template
        #[arg(short = 't', long = "type", default_value = "simplechain")]
        chain_type: String,

        /// Directory to write the chain artifacts to
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Publish all exposed ports on the host
        #[arg(short, long)]
        publish: bool,
    },

    /// Start a stopped chain
    Start {
        /// Chain name
        name: String,

        /// Publish all exposed ports (only honoured at creation)
        #[arg(short, long)]
        publish: bool,
    },

    /// Stop a running chain
    Stop {
        /// Chain name
        name: String,

        /// Stop without a grace period
        #[arg(short, long)]
        force: bool,
    },

    /// Kill a chain and remove its containers, keeping its files
    Kill {
        /// Chain name
        name: String,
    },

    /// Remove a chain
    Rm {
        /// Chain name
        name: String,

        /// Also remove the data container
        #[arg(short = 'x', long)]
        data: bool,

        /// Also remove the chain directory on the host
        #[arg(short, long)]
        dir: bool,

        /// Remove even if running
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command in a chain container
    Exec {
        /// Chain name
        name: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },

    /// Show chain logs
    Logs {
        /// Chain name
        name: String,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Show chain container metadata
    Inspect {
        /// Chain name
        name: String,

        /// Fields: name, id, image, state, running, mounts, links or all
        fields: Vec<String>,
    },

    /// Print a chain artifact: config, genesis or validator
    Cat {
        /// Chain name
        name: String,

        /// Artifact to print
        artifact: ChainArtifact,
    },

    /// List known chains
    Ls {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

pub async fn run(orchestrator: &Orchestrator, command: ChainCommands) -> Result<()> {
    let chains = orchestrator.chains();
    match command {
        ChainCommands::New {
            name,
            chain_type,
            dir,
            publish,
        } => {
            let chain = orchestrator
                .new_chain(&name, &chain_type, dir.as_deref(), publish)
                .await
                .with_context(|| format!("Failed to create chain '{}'", name))?;
            println!("Chain '{}' is running", chain.name);
            println!("  container: {}", chain.container);
            println!("  data:      {}", chain.data_container);
            println!("  directory: {}", chain.host_dir.display());
            if let Some(identity) = &chain.identity {
                println!("  validator: {}", identity.validator_address);
            }
            if !chain.keys_imported {
                eprintln!("Warning: validator key was not imported into the key store");
            }
            Ok(())
        }
        ChainCommands::Start { name, publish } => {
            chains
                .start(&name, publish)
                .await
                .with_context(|| format!("Failed to start chain '{}'", name))?;
            println!("Chain '{}' is running", name);
            Ok(())
        }
        ChainCommands::Stop { name, force } => {
            chains
                .stop(&name, force)
                .await
                .with_context(|| format!("Failed to stop chain '{}'", name))?;
            println!("Chain '{}' stopped", name);
            Ok(())
        }
        ChainCommands::Kill { name } => {
            chains
                .kill(&name)
                .await
                .with_context(|| format!("Failed to kill chain '{}'", name))?;
            println!("Chain '{}' killed", name);
            Ok(())
        }
        ChainCommands::Rm {
            name,
            data,
            dir,
            force,
        } => {
            let options = RemoveChainOptions {
                remove_data_volume: data,
                remove_home_dir: dir,
                force,
            };
            chains
                .remove(&name, options)
                .await
                .with_context(|| format!("Failed to remove chain '{}'", name))?;
            println!("Chain '{}' removed", name);
            Ok(())
        }
        ChainCommands::Exec { name, args } => {
            super::exec(orchestrator, ContainerKind::Chain, &name, &args).await
        }
        ChainCommands::Logs { name, log } => {
            super::logs(orchestrator, ContainerKind::Chain, &name, &log).await
        }
        ChainCommands::Inspect { name, fields } => {
            super::inspect(orchestrator, ContainerKind::Chain, &name, &fields).await
        }
        ChainCommands::Cat { name, artifact } => {
            let contents = orchestrator.exec().cat_chain(&name, artifact).await?;
            print!("{}", contents);
            Ok(())
        }
        ChainCommands::Ls { format } => list(orchestrator, &format).await,
    }
}

async fn list(orchestrator: &Orchestrator, format: &str) -> Result<()> {
    if format != "table" && format != "json" {
        anyhow::bail!("Invalid format: {}. Must be 'table' or 'json'", format);
    }

    let summaries = orchestrator.chains().list().await?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }

    if summaries.is_empty() {
        println!("No chains found");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Chain", "State", "Data", "Directory"]);
    for summary in &summaries {
        let color = match summary.state {
            ChainState::Running => Color::Green,
            ChainState::Absent => Color::Red,
            ChainState::Created | ChainState::Stopped => Color::Yellow,
        };
        table.add_row(vec![
            Cell::new(&summary.name),
            Cell::new(summary.state).fg(color),
            Cell::new(if summary.data { "yes" } else { "no" }),
            Cell::new(summary.host_dir.display()),
        ]);
    }
    println!("{table}");
    Ok(())
}
