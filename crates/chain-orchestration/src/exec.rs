//! Commands, logs and metadata for chain and service containers

use crate::config::OrchestratorConfig;
use crate::materializer::{CONFIG_FILE, GENESIS_FILE, PRIV_VALIDATOR_FILE};
use crate::naming::{ContainerKind, Naming};
use crate::{Error, Resource, Result};
use container_engine::{ContainerEngine, ContainerHandle, ContainerInfo, LogOptions};
use futures::StreamExt;
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// A chain artifact that can be read back from a running chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainArtifact {
    /// `config.toml`
    Config,
    /// `genesis.json`
    Genesis,
    /// `priv_validator.json`
    Validator,
}

impl ChainArtifact {
    /// File name inside the chain directory
    pub fn file_name(&self) -> &'static str {
        match self {
            ChainArtifact::Config => CONFIG_FILE,
            ChainArtifact::Genesis => GENESIS_FILE,
            ChainArtifact::Validator => PRIV_VALIDATOR_FILE,
        }
    }
}

impl FromStr for ChainArtifact {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "config" => Ok(ChainArtifact::Config),
            "genesis" => Ok(ChainArtifact::Genesis),
            "validator" => Ok(ChainArtifact::Validator),
            other => Err(format!(
                "unknown artifact '{}', expected config, genesis or validator",
                other
            )),
        }
    }
}

/// Field selectable in an inspect report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectField {
    /// Container name
    Name,
    /// Engine id
    Id,
    /// Image
    Image,
    /// Engine state
    State,
    /// Whether it is running
    Running,
    /// Mounted volumes
    Mounts,
    /// Links
    Links,
    /// Every field above
    All,
}

impl InspectField {
    const EACH: [InspectField; 7] = [
        InspectField::Name,
        InspectField::Id,
        InspectField::Image,
        InspectField::State,
        InspectField::Running,
        InspectField::Mounts,
        InspectField::Links,
    ];

    fn as_str(&self) -> &'static str {
        match self {
            InspectField::Name => "name",
            InspectField::Id => "id",
            InspectField::Image => "image",
            InspectField::State => "state",
            InspectField::Running => "running",
            InspectField::Mounts => "mounts",
            InspectField::Links => "links",
            InspectField::All => "all",
        }
    }

    /// Parse a list of field names, rejecting unknown ones
    pub fn parse_list<S: AsRef<str>>(fields: &[S]) -> Result<Vec<Self>> {
        fields.iter().map(|f| f.as_ref().parse()).collect()
    }

    fn value(&self, info: &ContainerInfo) -> String {
        match self {
            InspectField::Name => info.name.clone(),
            InspectField::Id => info.id.clone(),
            InspectField::Image => info.image.clone(),
            InspectField::State => info.status.to_string(),
            InspectField::Running => info.status.is_running().to_string(),
            InspectField::Mounts => info
                .mounts
                .iter()
                .map(|m| format!("{}:{}", m.source, m.destination))
                .collect::<Vec<_>>()
                .join(", "),
            InspectField::Links => info
                .links
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            InspectField::All => String::new(),
        }
    }
}

impl FromStr for InspectField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let field = s.trim().to_ascii_lowercase();
        InspectField::EACH
            .into_iter()
            .chain([InspectField::All])
            .find(|f| f.as_str() == field)
            .ok_or_else(|| Error::InvalidField(s.to_string()))
    }
}

impl fmt::Display for InspectField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selected container fields, rendered as `field: value` lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InspectReport {
    /// Field and value pairs in request order
    pub entries: Vec<(InspectField, String)>,
}

impl InspectReport {
    /// Value of a field, if selected
    pub fn get(&self, field: InspectField) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for InspectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, value) in &self.entries {
            writeln!(f, "{}: {}", field, value)?;
        }
        Ok(())
    }
}

/// Runs commands in and reads diagnostics from chain and service containers
pub struct ExecAdapter {
    engine: Arc<dyn ContainerEngine>,
    naming: Naming,
    config: OrchestratorConfig,
}

impl ExecAdapter {
    /// Create an adapter
    pub fn new(engine: Arc<dyn ContainerEngine>, config: OrchestratorConfig) -> Self {
        Self {
            engine,
            naming: Naming::new(config.container_prefix.clone()),
            config,
        }
    }

    fn handle(&self, kind: ContainerKind, name: &str) -> ContainerHandle {
        ContainerHandle::new(self.engine.clone(), self.naming.container(kind, name))
    }

    fn engine_error(kind: ContainerKind, name: &str, e: container_engine::Error) -> Error {
        if !e.is_not_found() {
            return e.into();
        }
        let resource = match kind {
            ContainerKind::Chain => Resource::Chain,
            ContainerKind::Service => Resource::Service,
            ContainerKind::Data => Resource::DataContainer,
        };
        Error::not_found(resource, name)
    }

    /// Run `args` in a running container and return its combined output
    pub async fn exec(&self, kind: ContainerKind, name: &str, args: &[String]) -> Result<String> {
        let handle = self.handle(kind, name);
        debug!("exec in '{}': {:?}", handle.name(), args);

        let output = handle.exec(args).await.map_err(|e| Error::ExecFailed {
            container: handle.name().to_string(),
            code: None,
            output: e.to_string(),
        })?;

        if output.success() {
            Ok(output.output)
        } else {
            Err(Error::ExecFailed {
                container: handle.name().to_string(),
                code: output.code,
                output: output.output,
            })
        }
    }

    /// Write container logs to `out`, returning the number of lines
    ///
    /// Without `follow` this returns once the requested history is written.
    pub async fn logs<W: Write>(
        &self,
        kind: ContainerKind,
        name: &str,
        options: &LogOptions,
        out: &mut W,
    ) -> Result<usize> {
        let handle = self.handle(kind, name);
        let mut lines = handle
            .logs(options)
            .await
            .map_err(|e| Self::engine_error(kind, name, e))?;

        let mut count = 0;
        while let Some(line) = lines.next().await {
            writeln!(out, "{}", line?)?;
            count += 1;
        }
        out.flush()?;
        Ok(count)
    }

    /// Report the requested fields of a container
    pub async fn inspect(
        &self,
        kind: ContainerKind,
        name: &str,
        fields: &[InspectField],
    ) -> Result<InspectReport> {
        let info = self
            .handle(kind, name)
            .inspect()
            .await
            .map_err(|e| Self::engine_error(kind, name, e))?;

        let mut report = InspectReport::default();
        for field in fields {
            if *field == InspectField::All {
                for each in InspectField::EACH {
                    report.entries.push((each, each.value(&info)));
                }
            } else {
                report.entries.push((*field, field.value(&info)));
            }
        }
        Ok(report)
    }

    /// Read a chain artifact from inside the running chain container
    pub async fn cat_chain(&self, name: &str, artifact: ChainArtifact) -> Result<String> {
        let path = format!(
            "{}/{}",
            self.config.container_chain_dir(name),
            artifact.file_name()
        );
        self.exec(ContainerKind::Chain, name, &["cat".to_string(), path])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use container_engine::{ContainerLink, ContainerSpec, MemoryEngine, Tail};

    async fn running_chain() -> (Arc<MemoryEngine>, ExecAdapter) {
        let engine = Arc::new(MemoryEngine::new());
        engine
            .create(
                &ContainerSpec::new("harness-chain-alpha", "harness/simplechain")
                    .with_link(ContainerLink::new("harness-service-keys", "keys")),
            )
            .await
            .unwrap();
        engine.start("harness-chain-alpha").await.unwrap();
        let adapter = ExecAdapter::new(engine.clone(), OrchestratorConfig::with_home("/unused"));
        (engine, adapter)
    }

    fn args(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[smol_potat::test]
    async fn test_exec_success_and_failure() {
        let (_, adapter) = running_chain().await;
        let out = adapter
            .exec(ContainerKind::Chain, "alpha", &args(&["echo", "hi"]))
            .await
            .unwrap();
        assert_eq!(out, "hi\n");

        let err = adapter
            .exec(ContainerKind::Chain, "alpha", &args(&["bad", "command"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecFailed { code: Some(127), .. }));
    }

    #[smol_potat::test]
    async fn test_exec_on_stopped_container_fails() {
        let (engine, adapter) = running_chain().await;
        engine
            .stop("harness-chain-alpha", std::time::Duration::ZERO)
            .await
            .unwrap();
        let err = adapter
            .exec(ContainerKind::Chain, "alpha", &args(&["true"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecFailed { code: None, .. }));
    }

    #[smol_potat::test]
    async fn test_cat_chain() {
        let (engine, adapter) = running_chain().await;
        engine
            .write_file(
                "harness-chain-alpha",
                "/home/harness/.harness/chains/alpha/config.toml",
                "moniker = \"alpha_validator_000\"\n",
            )
            .unwrap();
        let config = adapter.cat_chain("alpha", ChainArtifact::Config).await.unwrap();
        assert!(config.contains("moniker"));
        assert!(adapter.cat_chain("alpha", ChainArtifact::Genesis).await.is_err());
    }

    #[smol_potat::test]
    async fn test_logs_full_history() {
        let (engine, adapter) = running_chain().await;
        engine.push_log("harness-chain-alpha", "block 1").unwrap();

        let mut out = Vec::new();
        let options = LogOptions {
            follow: false,
            tail: Tail::All,
        };
        let count = adapter
            .logs(ContainerKind::Chain, "alpha", &options, &mut out)
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(String::from_utf8(out).unwrap().ends_with("block 1\n"));

        let err = adapter
            .logs(ContainerKind::Service, "ghost", &options, &mut Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: Resource::Service, .. }));
    }

    #[smol_potat::test]
    async fn test_inspect_fields() {
        let (_, adapter) = running_chain().await;
        let report = adapter
            .inspect(
                ContainerKind::Chain,
                "alpha",
                &[InspectField::Name, InspectField::Links],
            )
            .await
            .unwrap();
        assert_eq!(report.get(InspectField::Name), Some("harness-chain-alpha"));
        assert_eq!(
            report.get(InspectField::Links),
            Some("harness-service-keys:keys")
        );
        assert_eq!(
            report.to_string(),
            "name: harness-chain-alpha\nlinks: harness-service-keys:keys\n"
        );

        let all = adapter
            .inspect(ContainerKind::Chain, "alpha", &[InspectField::All])
            .await
            .unwrap();
        assert_eq!(all.entries.len(), 7);
        assert_eq!(all.get(InspectField::Running), Some("true"));
    }

    #[test]
    fn test_parse_fields() {
        assert_eq!(
            InspectField::parse_list(&["name", "STATE", "all"]).unwrap(),
            vec![InspectField::Name, InspectField::State, InspectField::All]
        );
        assert!(matches!(
            InspectField::parse_list(&["name", "colour"]).unwrap_err(),
            Error::InvalidField(f) if f == "colour"
        ));
        assert_eq!("genesis".parse::<ChainArtifact>(), Ok(ChainArtifact::Genesis));
    }
}
