//! Error types for container engine operations

use thiserror::Error;

/// Unified error type for container engine calls
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn the engine client process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// The engine client ran but reported a failure
    #[error("`{command}` failed with exit code {code:?}: {output}")]
    CommandFailed {
        /// The command line that failed
        command: String,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Combined stdout and stderr of the command
        output: String,
    },

    /// The named container does not exist
    #[error("container not found: {name}")]
    NoSuchContainer {
        /// The container name
        name: String,
    },

    /// A container with this name already exists
    #[error("container name already in use: {name}")]
    NameConflict {
        /// The container name
        name: String,
    },

    /// The operation requires a running container
    #[error("container is not running: {name}")]
    NotRunning {
        /// The container name
        name: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Malformed engine output
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Returns true if the error means the container is absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NoSuchContainer { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
