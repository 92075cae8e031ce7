//! Value types shared by every engine backend

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a named container as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// No container with this name
    Absent,
    /// Created but never started
    Created,
    /// Running
    Running,
    /// Paused by the engine
    Paused,
    /// Stopped, exited or dead
    Exited,
}

impl ContainerStatus {
    /// Returns true unless the container is absent
    pub fn exists(&self) -> bool {
        !matches!(self, ContainerStatus::Absent)
    }

    /// Returns true if the container is running
    pub fn is_running(&self) -> bool {
        matches!(self, ContainerStatus::Running)
    }

    /// Map an engine state string (`running`, `exited`, ...) to a status
    pub fn from_engine_state(state: &str) -> Self {
        match state.trim() {
            "created" => ContainerStatus::Created,
            "running" | "restarting" => ContainerStatus::Running,
            "paused" => ContainerStatus::Paused,
            _ => ContainerStatus::Exited,
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerStatus::Absent => "absent",
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Exited => "exited",
        };
        f.write_str(s)
    }
}

/// An engine-level link making `container` visible as `alias`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContainerLink {
    /// Name of the linked container
    pub container: String,
    /// Name the linked container is reachable under
    pub alias: String,
}

impl ContainerLink {
    /// Create a new link
    pub fn new(container: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            alias: alias.into(),
        }
    }

    /// Parse the engine's inspect form `/target:/owner/alias`
    pub fn from_engine(raw: &str) -> Option<Self> {
        let (target, visible) = raw.split_once(':')?;
        let alias = visible.rsplit('/').next()?;
        let container = target.trim_start_matches('/');
        if container.is_empty() || alias.is_empty() {
            return None;
        }
        Some(Self::new(container, alias))
    }

    /// Render as the engine's inspect form for a link owned by `owner`
    pub fn to_engine(&self, owner: &str) -> String {
        format!("/{}:/{}/{}", self.container, owner, self.alias)
    }
}

impl fmt::Display for ContainerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.container, self.alias)
    }
}

/// Everything needed to create a container
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Command overriding the image default
    pub command: Vec<String>,
    /// Environment variables
    pub env: BTreeMap<String, String>,
    /// Links to other containers
    pub links: Vec<ContainerLink>,
    /// Anonymous volume mount points
    pub volumes: Vec<String>,
    /// Container whose volumes are mounted into this one
    pub volumes_from: Option<String>,
    /// Container ports published 1:1 on the host
    pub ports: Vec<u16>,
    /// Publish every exposed port on a random host port
    pub publish_all_ports: bool,
    /// Labels attached to the container
    pub labels: BTreeMap<String, String>,
}

impl ContainerSpec {
    /// Create a spec for `name` running `image`
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            ..Default::default()
        }
    }

    /// Set the command
    pub fn with_command(mut self, command: Vec<String>) -> Self {
        self.command = command;
        self
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add a link
    pub fn with_link(mut self, link: ContainerLink) -> Self {
        self.links.push(link);
        self
    }

    /// Add an anonymous volume
    pub fn with_volume(mut self, mount_point: impl Into<String>) -> Self {
        self.volumes.push(mount_point.into());
        self
    }

    /// Mount the volumes of another container
    pub fn with_volumes_from(mut self, container: impl Into<String>) -> Self {
        self.volumes_from = Some(container.into());
        self
    }

    /// Publish a port 1:1
    pub fn with_port(mut self, port: u16) -> Self {
        self.ports.push(port);
        self
    }

    /// Publish all exposed ports
    pub fn with_publish_all_ports(mut self, publish: bool) -> Self {
        self.publish_all_ports = publish;
        self
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Options for removing a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Remove even if running
    pub force: bool,
    /// Also remove anonymous volumes
    pub volumes: bool,
}

/// Result of running a command inside a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code of the command
    pub code: Option<i32>,
    /// Combined stdout and stderr
    pub output: String,
}

impl ExecOutput {
    /// Returns true if the command exited with code 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// How much history to return from the logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Tail {
    /// Everything
    #[default]
    All,
    /// The last N lines
    Lines(usize),
}

impl FromStr for Tail {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "all" | "" => Ok(Tail::All),
            n => n
                .parse()
                .map(Tail::Lines)
                .map_err(|_| format!("invalid tail '{}', expected 'all' or a line count", s)),
        }
    }
}

impl fmt::Display for Tail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tail::All => f.write_str("all"),
            Tail::Lines(n) => write!(f, "{}", n),
        }
    }
}

/// Options for reading container logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Keep streaming new lines
    pub follow: bool,
    /// History to include
    pub tail: Tail,
}

/// A mounted volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Host-side source or volume name
    pub source: String,
    /// Mount point inside the container
    pub destination: String,
}

/// Metadata about a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Engine-assigned id
    pub id: String,
    /// Container name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Current status
    pub status: ContainerStatus,
    /// Mounted volumes
    pub mounts: Vec<Mount>,
    /// Links applied at creation
    pub links: Vec<ContainerLink>,
    /// Containers whose volumes are mounted
    pub volumes_from: Vec<String>,
    /// Labels
    pub labels: BTreeMap<String, String>,
}
