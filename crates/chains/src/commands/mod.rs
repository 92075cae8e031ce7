pub mod chain;
pub mod service;

use anyhow::Result;
use chain_orchestration::{ContainerKind, InspectField, Orchestrator};
use clap::Args;
use container_engine::{LogOptions, Tail};
use std::io;

/// Options shared by the `logs` subcommands
#[derive(Args)]
pub struct LogArgs {
    /// Keep streaming new lines
    #[arg(short, long)]
    pub follow: bool,

    /// Number of lines to show from the end, or `all`
    #[arg(short, long, default_value = "all")]
    pub tail: Tail,
}

impl From<&LogArgs> for LogOptions {
    fn from(args: &LogArgs) -> Self {
        LogOptions {
            follow: args.follow,
            tail: args.tail,
        }
    }
}

pub async fn exec(
    orchestrator: &Orchestrator,
    kind: ContainerKind,
    name: &str,
    args: &[String],
) -> Result<()> {
    let output = orchestrator.exec().exec(kind, name, args).await?;
    print!("{}", output);
    Ok(())
}

pub async fn logs(
    orchestrator: &Orchestrator,
    kind: ContainerKind,
    name: &str,
    args: &LogArgs,
) -> Result<()> {
    let mut stdout = io::stdout().lock();
    orchestrator
        .exec()
        .logs(kind, name, &args.into(), &mut stdout)
        .await?;
    Ok(())
}

pub async fn inspect(
    orchestrator: &Orchestrator,
    kind: ContainerKind,
    name: &str,
    fields: &[String],
) -> Result<()> {
    let fields = if fields.is_empty() {
        vec![InspectField::All]
    } else {
        InspectField::parse_list(fields)?
    };
    let report = orchestrator.exec().inspect(kind, name, &fields).await?;
    print!("{}", report);
    Ok(())
}
