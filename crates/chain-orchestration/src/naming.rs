//! Container naming

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// What a container is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    /// A blockchain node
    Chain,
    /// An auxiliary service
    Service,
    /// A volume-only data container
    Data,
}

impl ContainerKind {
    fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Chain => "chain",
            ContainerKind::Service => "service",
            ContainerKind::Data => "data",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "chain" => Ok(ContainerKind::Chain),
            "service" => Ok(ContainerKind::Service),
            "data" => Ok(ContainerKind::Data),
            other => Err(format!("unknown container kind '{}'", other)),
        }
    }
}

/// Maps chain and service names to container names: `<prefix>-<kind>-<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    prefix: String,
}

impl Naming {
    /// Create a naming scheme with the given prefix
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Container name for `name` of `kind`
    pub fn container(&self, kind: ContainerKind, name: &str) -> String {
        format!("{}-{}-{}", self.prefix, kind, name)
    }

    /// Chain container name
    pub fn chain(&self, name: &str) -> String {
        self.container(ContainerKind::Chain, name)
    }

    /// Service container name
    pub fn service(&self, name: &str) -> String {
        self.container(ContainerKind::Service, name)
    }

    /// Data container name
    pub fn data(&self, name: &str) -> String {
        self.container(ContainerKind::Data, name)
    }
}

/// Check that `name` has the shape `[A-Za-z0-9][A-Za-z0-9_.-]*`
///
/// Names also become host directory names, so `.` and `..` must never pass.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_alphanumeric())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidName(name.to_string()))
    }
}
