//! Docker backend driving the `docker` CLI

use crate::command::{Command, CommandOutput};
use crate::engine::{ContainerEngine, LogStream};
use crate::error::{Error, Result};
use crate::types::{
    ContainerInfo, ContainerLink, ContainerSpec, ContainerStatus, ExecOutput, LogOptions, Mount,
    RemoveOptions,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Container engine backed by the `docker` command line client
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
}

impl DockerCli {
    /// Create a backend using `docker` from `PATH`
    pub fn new() -> Self {
        Self::with_binary("docker")
    }

    /// Create a backend using a specific client binary
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Run a docker subcommand, mapping well-known failures for `name`
    async fn run<I, S>(&self, name: &str, args: I) -> Result<CommandOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let cmd = self.command(args);
        let output = cmd.output().await?;
        if output.success() {
            Ok(output)
        } else {
            Err(classify_failure(name, &cmd, output))
        }
    }

    /// Build the `docker create` argument list for a spec
    pub fn create_args(spec: &ContainerSpec) -> Vec<String> {
        let mut args = vec!["create".to_string(), "--name".to_string(), spec.name.clone()];

        if spec.publish_all_ports {
            args.push("--publish-all".to_string());
        }
        for port in &spec.ports {
            args.extend(["-p".to_string(), format!("{}:{}", port, port)]);
        }
        if let Some(source) = &spec.volumes_from {
            args.extend(["--volumes-from".to_string(), source.clone()]);
        }
        for volume in &spec.volumes {
            args.extend(["-v".to_string(), volume.clone()]);
        }
        for link in &spec.links {
            args.extend(["--link".to_string(), link.to_string()]);
        }
        for (key, value) in &spec.env {
            args.extend(["-e".to_string(), format!("{}={}", key, value)]);
        }
        for (key, value) in &spec.labels {
            args.extend(["--label".to_string(), format!("{}={}", key, value)]);
        }

        args.push(spec.image.clone());
        args.extend(spec.command.iter().cloned());
        args
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn a failed docker invocation into the most specific error
///
/// A missing container is reported under the name docker gives, which for
/// `create` is the link or `--volumes-from` target rather than `name`.
fn classify_failure(name: &str, cmd: &Command, output: CommandOutput) -> Error {
    let text = output.output.trim();
    if let Some(missing) = missing_container(text) {
        Error::NoSuchContainer {
            name: missing.unwrap_or(name).to_string(),
        }
    } else if text.contains("is already in use") {
        Error::NameConflict {
            name: name.to_string(),
        }
    } else if text.contains("is not running") {
        Error::NotRunning {
            name: name.to_string(),
        }
    } else {
        Error::CommandFailed {
            command: cmd.display(),
            code: output.code,
            output: text.to_string(),
        }
    }
}

/// `Some` if `text` reports a missing container, with its name when given
fn missing_container(text: &str) -> Option<Option<&str>> {
    ["No such container", "No such object"].iter().find_map(|marker| {
        let (_, rest) = text.split_once(marker)?;
        let named = rest
            .strip_prefix(':')
            .and_then(|rest| rest.split_whitespace().next())
            .filter(|name| !name.is_empty());
        Some(named)
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDocument {
    id: String,
    name: String,
    config: InspectConfig,
    state: InspectState,
    #[serde(default)]
    mounts: Vec<InspectMount>,
    host_config: InspectHostConfig,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    image: String,
    #[serde(default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectMount {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    source: String,
    destination: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectHostConfig {
    #[serde(default)]
    links: Option<Vec<String>>,
    #[serde(default)]
    volumes_from: Option<Vec<String>>,
}

impl From<InspectDocument> for ContainerInfo {
    fn from(doc: InspectDocument) -> Self {
        ContainerInfo {
            id: doc.id,
            name: doc.name.trim_start_matches('/').to_string(),
            image: doc.config.image,
            status: ContainerStatus::from_engine_state(&doc.state.status),
            mounts: doc
                .mounts
                .into_iter()
                .map(|m| Mount {
                    source: m.name.unwrap_or(m.source),
                    destination: m.destination,
                })
                .collect(),
            links: doc
                .host_config
                .links
                .unwrap_or_default()
                .iter()
                .filter_map(|raw| ContainerLink::from_engine(raw))
                .collect(),
            volumes_from: doc.host_config.volumes_from.unwrap_or_default(),
            labels: doc.config.labels.unwrap_or_default(),
        }
    }
}

/// Parse `docker inspect` output for a single container
pub fn parse_inspect(name: &str, json: &str) -> Result<ContainerInfo> {
    let mut docs: Vec<InspectDocument> = serde_json::from_str(json)?;
    if docs.is_empty() {
        return Err(Error::NoSuchContainer {
            name: name.to_string(),
        });
    }
    Ok(docs.swap_remove(0).into())
}

#[async_trait]
impl ContainerEngine for DockerCli {
    async fn status(&self, name: &str) -> Result<ContainerStatus> {
        match self
            .run(name, ["inspect", "--type", "container", "--format", "{{.State.Status}}", name])
            .await
        {
            Ok(output) => Ok(ContainerStatus::from_engine_state(&output.output)),
            Err(Error::NoSuchContainer { .. }) => Ok(ContainerStatus::Absent),
            Err(e) => Err(e),
        }
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<()> {
        info!("Creating container '{}' from {}", spec.name, spec.image);
        self.run(&spec.name, Self::create_args(spec)).await?;
        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        info!("Starting container '{}'", name);
        self.run(name, ["start", name]).await?;
        Ok(())
    }

    async fn stop(&self, name: &str, timeout: Duration) -> Result<()> {
        info!("Stopping container '{}' (timeout {}s)", name, timeout.as_secs());
        let secs = timeout.as_secs().to_string();
        self.run(name, ["stop", "-t", secs.as_str(), name]).await?;
        Ok(())
    }

    async fn kill(&self, name: &str) -> Result<()> {
        info!("Killing container '{}'", name);
        self.run(name, ["kill", name]).await?;
        Ok(())
    }

    async fn remove(&self, name: &str, options: RemoveOptions) -> Result<()> {
        info!("Removing container '{}'", name);
        let mut args = vec!["rm"];
        if options.force {
            args.push("-f");
        }
        if options.volumes {
            args.push("-v");
        }
        args.push(name);
        self.run(name, args).await?;
        Ok(())
    }

    async fn exec(&self, name: &str, args: &[String]) -> Result<ExecOutput> {
        let mut cmd = self.command(["exec", name]);
        cmd.args(args);
        let output = cmd.output().await?;

        // docker itself exits 1 when it cannot reach the container at all
        if !output.success() {
            let text = output.output.as_str();
            if text.contains("No such container") || text.contains("is not running") {
                return Err(classify_failure(name, &cmd, output));
            }
        }

        debug!("exec in '{}' exited with {:?}", name, output.code);
        Ok(ExecOutput {
            code: output.code,
            output: output.output,
        })
    }

    async fn logs(&self, name: &str, options: &LogOptions) -> Result<LogStream> {
        // Probe first so a missing container is an error rather than a one-line stream
        if !self.status(name).await?.exists() {
            return Err(Error::NoSuchContainer {
                name: name.to_string(),
            });
        }

        let tail = options.tail.to_string();
        let mut cmd = self.command(["logs", "--tail", tail.as_str()]);
        if options.follow {
            cmd.arg("--follow");
        }
        cmd.arg(name);
        cmd.spawn_lines()
    }

    async fn inspect(&self, name: &str) -> Result<ContainerInfo> {
        let output = self.run(name, ["inspect", "--type", "container", name]).await?;
        parse_inspect(name, &output.output)
    }

    async fn copy_into(&self, name: &str, source: &Path, destination: &str) -> Result<()> {
        // `src/.` copies the directory contents rather than the directory itself
        let source = format!("{}/.", source.display());
        let target = format!("{}:{}", name, destination);
        debug!("Copying {} into {}", source, target);
        self.run(name, ["cp", source.as_str(), target.as_str()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_args() {
        let spec = ContainerSpec::new("harness-service-ipfs", "harness/ipfs")
            .with_link(ContainerLink::new("harness-chain-alpha", "chain"))
            .with_volumes_from("harness-data-ipfs")
            .with_env("LOG", "debug")
            .with_port(5001)
            .with_publish_all_ports(true)
            .with_command(vec!["daemon".to_string()]);

        let args = DockerCli::create_args(&spec);
        assert_eq!(args[0], "create");
        assert!(args.contains(&"--publish-all".to_string()));
        assert!(args.windows(2).any(|w| w == ["--link", "harness-chain-alpha:chain"]));
        assert!(args.windows(2).any(|w| w == ["--volumes-from", "harness-data-ipfs"]));
        assert!(args.windows(2).any(|w| w == ["-e", "LOG=debug"]));
        assert!(args.windows(2).any(|w| w == ["-p", "5001:5001"]));
        // image comes before the command
        assert_eq!(&args[args.len() - 2..], ["harness/ipfs", "daemon"]);
    }

    #[test]
    fn test_parse_inspect() {
        let json = r#"[{
            "Id": "4f1c2a",
            "Name": "/harness-service-fake",
            "Config": {"Image": "harness/keys", "Labels": {"harness.kind": "service"}},
            "State": {"Status": "running", "Running": true},
            "Mounts": [{"Name": "abc123", "Source": "/var/lib/docker/volumes/abc123/_data", "Destination": "/home/harness/.harness"}],
            "HostConfig": {"Links": ["/harness-chain-alpha:/harness-service-fake/fake"], "VolumesFrom": null}
        }]"#;

        let info = parse_inspect("harness-service-fake", json).unwrap();
        assert_eq!(info.name, "harness-service-fake");
        assert_eq!(info.status, ContainerStatus::Running);
        assert_eq!(info.links, vec![ContainerLink::new("harness-chain-alpha", "fake")]);
        assert_eq!(info.mounts[0].source, "abc123");
        assert!(info.volumes_from.is_empty());
        assert_eq!(info.labels.get("harness.kind").map(String::as_str), Some("service"));
    }

    #[test]
    fn test_classify_failure() {
        let cmd = Command::new("docker");
        let missing = CommandOutput {
            code: Some(1),
            output: "Error: No such container: ghost".to_string(),
        };
        assert!(classify_failure("ghost", &cmd, missing).is_not_found());

        let conflict = CommandOutput {
            code: Some(125),
            output: "Conflict. The container name \"/web\" is already in use".to_string(),
        };
        assert!(matches!(
            classify_failure("web", &cmd, conflict),
            Error::NameConflict { .. }
        ));
    }

    #[test]
    fn test_missing_link_target_is_named() {
        let cmd = Command::new("docker");
        let output = CommandOutput {
            code: Some(1),
            output: "Error response from daemon: could not get container for ghost: \
                     No such container: harness-chain-ghost\n"
                .to_string(),
        };
        match classify_failure("harness-service-fake", &cmd, output) {
            Error::NoSuchContainer { name } => assert_eq!(name, "harness-chain-ghost"),
            other => panic!("expected NoSuchContainer, got {:?}", other),
        }

        let output = CommandOutput {
            code: Some(1),
            output: "Error: No such object: harness-chain-alpha\n".to_string(),
        };
        assert!(matches!(
            classify_failure("harness-chain-alpha", &cmd, output),
            Error::NoSuchContainer { name } if name == "harness-chain-alpha"
        ));
    }
}
