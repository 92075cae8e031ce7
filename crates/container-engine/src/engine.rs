//! The container engine trait

use crate::error::Result;
use crate::types::{
    ContainerInfo, ContainerSpec, ContainerStatus, ExecOutput, LogOptions, RemoveOptions,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;
use std::time::Duration;

/// Stream of log lines from a container
pub type LogStream = BoxStream<'static, Result<String>>;

/// Primitive operations on named containers
///
/// Implementations never own the containers they operate on; ownership
/// belongs to whichever lifecycle created them. Every call completes or
/// fails on its own, nothing is retried.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Report the status of a container, `Absent` if it does not exist
    async fn status(&self, name: &str) -> Result<ContainerStatus>;

    /// Create (but do not start) a container
    async fn create(&self, spec: &ContainerSpec) -> Result<()>;

    /// Start an existing container
    async fn start(&self, name: &str) -> Result<()>;

    /// Stop a running container, waiting at most `timeout` before killing it
    async fn stop(&self, name: &str, timeout: Duration) -> Result<()>;

    /// Kill a running container immediately
    async fn kill(&self, name: &str) -> Result<()>;

    /// Remove a container
    async fn remove(&self, name: &str, options: RemoveOptions) -> Result<()>;

    /// Run a command inside a running container
    ///
    /// A non-zero exit is reported through [`ExecOutput::code`], not as an error.
    async fn exec(&self, name: &str, args: &[String]) -> Result<ExecOutput>;

    /// Read the container logs
    async fn logs(&self, name: &str, options: &LogOptions) -> Result<LogStream>;

    /// Inspect container metadata
    async fn inspect(&self, name: &str) -> Result<ContainerInfo>;

    /// Copy the contents of the host directory `source` into `destination`
    async fn copy_into(&self, name: &str, source: &Path, destination: &str) -> Result<()>;
}
