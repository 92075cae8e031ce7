//! # Chain orchestration
//!
//! Lifecycle management for blockchain node containers ("chains") and the
//! auxiliary service containers that attach to them.
//!
//! The crate is layered on top of [`container_engine`]:
//!
//! - [`ChainLifecycle`] drives a chain container and its companion data
//!   container through create, start, stop, kill and remove.
//! - [`ConfigMaterializer`] generates a chain's identity artifacts and
//!   [`KeyStore`] receives the validator key.
//! - [`LinkResolver`] turns a service's chain reference into a container link
//!   for an explicit [`ChainContext`].
//! - [`DependencyWalker`] starts prerequisite services before dependents.
//! - [`ExecAdapter`] runs commands and reads logs, metadata and artifacts.
//!
//! [`Orchestrator`] wires all of them together.
//!
//! ## Example
//!
//! ```rust,no_run
//! use chain_orchestration::{ChainContext, Orchestrator, OrchestratorConfig};
//!
//! # async fn example() -> chain_orchestration::Result<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default())?;
//! orchestrator.new_chain("alpha", "simplechain", None, false).await?;
//!
//! let ctx = ChainContext::chain("alpha");
//! let report = orchestrator.start_service("ipfs", &ctx).await?;
//! println!("started {:?}", report.started);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unsafe_code)]

mod chain;
mod config;
mod definitions;
mod exec;
mod keys;
mod link;
mod manager;
mod materializer;
mod naming;
mod service;
mod walker;

pub use chain::{Chain, ChainLifecycle, ChainState, ChainSummary, RemoveChainOptions};
pub use config::{ImagesConfig, KeysConfig, OrchestratorConfig};
pub use definitions::{ChainType, Definitions, ServiceDefinition};
pub use exec::{ChainArtifact, ExecAdapter, InspectField, InspectReport};
pub use keys::{KeyFile, KeyStore, KeysService, PublicKeyJson, ValidatorKey};
pub use link::{ChainContext, LinkResolver, LinkSpec};
pub use manager::Orchestrator;
pub use materializer::{
    ChainIdentity, ConfigMaterializer, GenesisAccount, GenesisDoc, GenesisParams, GenesisValidator,
    NodeConfig, PrivValidator,
};
pub use naming::{ContainerKind, Naming};
pub use service::{ServiceLifecycle, ServiceStart};
pub use walker::{DependencyGraph, DependencyWalker, WalkReport};

use std::fmt;

/// Kind of named resource an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A chain container
    Chain,
    /// A chain type template
    ChainType,
    /// A service definition or container
    Service,
    /// A data container
    DataContainer,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Resource::Chain => "chain",
            Resource::ChainType => "chain type",
            Resource::Service => "service",
            Resource::DataContainer => "data container",
        };
        f.write_str(s)
    }
}

/// Error types for orchestration operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The resource already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists {
        /// Kind of resource
        kind: Resource,
        /// Resource name
        name: String,
    },

    /// The resource does not exist
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Kind of resource
        kind: Resource,
        /// Resource name
        name: String,
    },

    /// A `$chain` link was resolved without a chain in context
    #[error("service '{service}' links to $chain but no chain is selected")]
    MissingChainContext {
        /// The service being resolved
        service: String,
    },

    /// A `$chain` link named a chain whose container does not exist
    #[error("service '{service}' links to chain '{chain}' which does not exist")]
    UnresolvedChainLink {
        /// The service being resolved
        service: String,
        /// The chain named by the context
        chain: String,
    },

    /// A command inside a container could not run or exited non-zero
    #[error("exec in '{container}' failed (exit code {code:?}): {output}")]
    ExecFailed {
        /// Container name
        container: String,
        /// Exit code, if the command ran
        code: Option<i32>,
        /// Combined output or the reason it could not run
        output: String,
    },

    /// The validator key could not be imported into the key store
    #[error("failed to import key {address}: {reason}")]
    KeyImportFailed {
        /// Validator address
        address: String,
        /// Why the import failed
        reason: String,
    },

    /// The service dependency graph contains a cycle or is too deep
    #[error("dependency cycle: {}", path.join(" -> "))]
    DependencyCycle {
        /// Services on the offending path, ending with the repeated one
        path: Vec<String>,
    },

    /// A chain link field could not be parsed
    #[error("invalid chain link '{field}': {reason}")]
    InvalidLink {
        /// The raw field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// An unknown inspect field was requested
    #[error("unknown inspect field '{0}'")]
    InvalidField(String),

    /// A chain or service name contains characters containers cannot carry
    #[error("invalid name '{0}': expected letters, digits, '_', '.' or '-'")]
    InvalidName(String),

    /// A service definition or chain type is malformed
    #[error("definition error: {0}")]
    Definition(String),

    /// Settings error
    #[error("configuration error: {0}")]
    Config(String),

    /// Container engine error
    #[error("container engine error: {0}")]
    Engine(#[from] container_engine::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    pub(crate) fn not_found(kind: Resource, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub(crate) fn already_exists(kind: Resource, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
