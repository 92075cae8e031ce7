//! Handle bound to a single named container

use crate::engine::{ContainerEngine, LogStream};
use crate::error::Result;
use crate::types::{ContainerInfo, ContainerStatus, ExecOutput, LogOptions};
use std::sync::Arc;

/// Observes and operates on one named container without owning it
#[derive(Clone)]
pub struct ContainerHandle {
    engine: Arc<dyn ContainerEngine>,
    name: String,
}

impl ContainerHandle {
    /// Create a handle for `name`
    pub fn new(engine: Arc<dyn ContainerEngine>, name: impl Into<String>) -> Self {
        Self {
            engine,
            name: name.into(),
        }
    }

    /// Container name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status
    pub async fn status(&self) -> Result<ContainerStatus> {
        self.engine.status(&self.name).await
    }

    /// Whether the container exists
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.status().await?.exists())
    }

    /// Whether the container is running
    pub async fn running(&self) -> Result<bool> {
        Ok(self.status().await?.is_running())
    }

    /// Run a command inside the container
    pub async fn exec(&self, args: &[String]) -> Result<ExecOutput> {
        self.engine.exec(&self.name, args).await
    }

    /// Read the container logs
    pub async fn logs(&self, options: &LogOptions) -> Result<LogStream> {
        self.engine.logs(&self.name, options).await
    }

    /// Inspect container metadata
    pub async fn inspect(&self) -> Result<ContainerInfo> {
        self.engine.inspect(&self.name).await
    }
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEngine;
    use crate::types::ContainerSpec;

    #[smol_potat::test]
    async fn test_handle_tracks_status() {
        let engine = Arc::new(MemoryEngine::new());
        let handle = ContainerHandle::new(engine.clone(), "web");

        assert!(!handle.exists().await.unwrap());

        engine
            .create(&ContainerSpec::new("web", "nginx"))
            .await
            .unwrap();
        assert!(handle.exists().await.unwrap());
        assert!(!handle.running().await.unwrap());

        engine.start("web").await.unwrap();
        assert!(handle.running().await.unwrap());
        assert_eq!(handle.inspect().await.unwrap().image, "nginx");
    }
}
