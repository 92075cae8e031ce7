//! Orchestrator settings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default home directory
pub const HOME_ENV: &str = "CHAIN_HARNESS_HOME";

/// Settings file looked up inside the home directory
pub const CONFIG_FILE: &str = "config.yaml";

/// Settings for the orchestrator, loaded from YAML
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Host directory holding chain artifacts and definition files
    pub home: PathBuf,
    /// Prefix for every container name
    pub container_prefix: String,
    /// Root directory inside containers where chain files live
    pub container_root: String,
    /// Grace period for a non-forced stop
    pub stop_timeout_secs: u64,
    /// Images used for containers not described by a definition
    pub images: ImagesConfig,
    /// Key-management service settings
    pub keys: KeysConfig,
}

/// Default images
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Image for chain types that do not name one
    pub chain: String,
    /// Image for data containers
    pub data: String,
    /// Image for the key-management service
    pub keys: String,
}

/// Key-management service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Name of the service definition holding keys
    pub service: String,
    /// Key root inside the keys container
    pub root: String,
    /// Start the keys service before creating a chain
    pub autostart: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            container_prefix: "harness".to_string(),
            container_root: "/home/harness/.harness".to_string(),
            stop_timeout_secs: 10,
            images: ImagesConfig::default(),
            keys: KeysConfig::default(),
        }
    }
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            chain: "harness/simplechain:latest".to_string(),
            data: "harness/data:latest".to_string(),
            keys: "harness/keys:latest".to_string(),
        }
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            service: "keys".to_string(),
            root: "/home/harness/.harness/keys".to_string(),
            autostart: true,
        }
    }
}

fn default_home() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV) {
        return PathBuf::from(home);
    }
    dirs::data_local_dir()
        .map(|dir| dir.join("chain-harness"))
        .unwrap_or_else(|| PathBuf::from(".chain-harness"))
}

impl OrchestratorConfig {
    /// Settings rooted at `home` with everything else defaulted
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            ..Default::default()
        }
    }

    /// Parse settings from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load settings from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Load `explicit` if given, else `<home>/config.yaml` if present, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let defaults = Self::default();
        let candidate = defaults.home.join(CONFIG_FILE);
        if candidate.exists() {
            Self::load(&candidate)
        } else {
            Ok(defaults)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.container_prefix.is_empty() {
            return Err(Error::Config("container_prefix must not be empty".to_string()));
        }
        if !self.container_root.starts_with('/') {
            return Err(Error::Config(format!(
                "container_root must be absolute, got '{}'",
                self.container_root
            )));
        }
        Ok(())
    }

    /// Grace period for a non-forced stop
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Host directory holding per-chain artifacts
    pub fn chains_dir(&self) -> PathBuf {
        self.home.join("chains")
    }

    /// Host directory holding chain type files
    pub fn chain_types_dir(&self) -> PathBuf {
        self.chains_dir().join("types")
    }

    /// Host directory holding service definition files
    pub fn services_dir(&self) -> PathBuf {
        self.home.join("services")
    }

    /// Directory inside containers holding a chain's files
    pub fn container_chain_dir(&self, chain: &str) -> String {
        format!("{}/chains/{}", self.container_root.trim_end_matches('/'), chain)
    }
}
