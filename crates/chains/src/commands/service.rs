use super::LogArgs;
use anyhow::{Context, Result};
use chain_orchestration::{ChainContext, ContainerKind, Orchestrator};
use clap::Subcommand;
use comfy_table::Table;

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Start a service and everything it depends on
    Start {
        /// Service name
        name: String,

        /// Chain that `$chain` links resolve to
        #[arg(long)]
        chain: Option<String>,
    },

    /// Stop a running service
    Stop {
        /// Service name
        name: String,

        /// Stop without a grace period
        #[arg(short, long)]
        force: bool,
    },

    /// Kill a service
    Kill {
        /// Service name
        name: String,

        /// Also remove the service container
        #[arg(long)]
        rm: bool,

        /// Also remove the data container
        #[arg(short = 'x', long)]
        data: bool,
    },

    /// Run a command in a service container
    Exec {
        /// Service name
        name: String,

        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true)]
        args: Vec<String>,
    },

    /// Show service logs
    Logs {
        /// Service name
        name: String,

        #[command(flatten)]
        log: LogArgs,
    },

    /// Show service container metadata
    Inspect {
        /// Service name
        name: String,

        /// Fields: name, id, image, state, running, mounts, links or all
        fields: Vec<String>,
    },

    /// List service definitions
    Ls,
}

pub async fn run(orchestrator: &Orchestrator, command: ServiceCommands) -> Result<()> {
    match command {
        ServiceCommands::Start { name, chain } => {
            let ctx = ChainContext::new(chain);
            let report = orchestrator
                .start_service(&name, &ctx)
                .await
                .with_context(|| format!("Failed to start service '{}'", name))?;

            for service in &report.started {
                println!("Started {}", service);
            }
            for service in &report.already_running {
                println!("Already running {}", service);
            }
            for link in &report.links {
                println!("  link {}", link);
            }
            Ok(())
        }
        ServiceCommands::Stop { name, force } => {
            orchestrator
                .services()
                .stop(&name, force)
                .await
                .with_context(|| format!("Failed to stop service '{}'", name))?;
            println!("Service '{}' stopped", name);
            Ok(())
        }
        ServiceCommands::Kill { name, rm, data } => {
            orchestrator
                .services()
                .kill(&name, rm, data)
                .await
                .with_context(|| format!("Failed to kill service '{}'", name))?;
            println!("Service '{}' killed", name);
            Ok(())
        }
        ServiceCommands::Exec { name, args } => {
            super::exec(orchestrator, ContainerKind::Service, &name, &args).await
        }
        ServiceCommands::Logs { name, log } => {
            super::logs(orchestrator, ContainerKind::Service, &name, &log).await
        }
        ServiceCommands::Inspect { name, fields } => {
            super::inspect(orchestrator, ContainerKind::Service, &name, &fields).await
        }
        ServiceCommands::Ls => list(orchestrator).await,
    }
}

async fn list(orchestrator: &Orchestrator) -> Result<()> {
    let definitions = orchestrator.definitions();
    let mut table = Table::new();
    table.set_header(vec!["Service", "Image", "Chain", "Depends on", "Running"]);

    for name in definitions.service_names()? {
        let definition = definitions.service(&name)?;
        let running = orchestrator
            .handle(ContainerKind::Service, &definition.name)
            .running()
            .await?;
        table.add_row(vec![
            definition.name.clone(),
            definition.image.clone(),
            definition.chain.to_string(),
            definition.dependencies.join(", "),
            if running { "yes" } else { "no" }.to_string(),
        ]);
    }

    println!("{table}");
    Ok(())
}
