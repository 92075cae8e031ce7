//! Orchestrator facade

use crate::chain::{Chain, ChainLifecycle};
use crate::config::OrchestratorConfig;
use crate::definitions::Definitions;
use crate::exec::ExecAdapter;
use crate::keys::{KeyStore, KeysService};
use crate::link::ChainContext;
use crate::naming::{ContainerKind, Naming};
use crate::service::ServiceLifecycle;
use crate::walker::{DependencyWalker, WalkReport};
use crate::Result;
use container_engine::{ContainerEngine, ContainerHandle, DockerCli};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Wires the engine, settings, definitions and every lifecycle component
pub struct Orchestrator {
    config: OrchestratorConfig,
    engine: Arc<dyn ContainerEngine>,
    naming: Naming,
    definitions: Arc<Definitions>,
    keystore: Arc<dyn KeyStore>,
    chains: ChainLifecycle,
    services: Arc<ServiceLifecycle>,
    walker: DependencyWalker,
    exec: ExecAdapter,
}

impl Orchestrator {
    /// Create an orchestrator driving the local `docker` client
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.home)?;
        info!("Using home directory {}", config.home.display());
        Ok(Self::with_engine(config, Arc::new(DockerCli::new())))
    }

    /// Create an orchestrator over any engine, storing keys in the keys service
    pub fn with_engine(config: OrchestratorConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        let naming = Naming::new(config.container_prefix.clone());
        let keystore = Arc::new(KeysService::new(
            engine.clone(),
            naming.service(&config.keys.service),
            config.keys.root.clone(),
        ));
        Self::with_keystore(config, engine, keystore)
    }

    /// Create an orchestrator with a custom key store
    pub fn with_keystore(
        config: OrchestratorConfig,
        engine: Arc<dyn ContainerEngine>,
        keystore: Arc<dyn KeyStore>,
    ) -> Self {
        let naming = Naming::new(config.container_prefix.clone());
        let definitions = Arc::new(Definitions::new(&config));
        let chains = ChainLifecycle::new(
            engine.clone(),
            config.clone(),
            definitions.clone(),
            keystore.clone(),
        );
        let services = Arc::new(ServiceLifecycle::new(engine.clone(), config.clone()));
        let walker = DependencyWalker::new(definitions.clone(), services.clone());
        let exec = ExecAdapter::new(engine.clone(), config.clone());

        Self {
            config,
            engine,
            naming,
            definitions,
            keystore,
            chains,
            services,
            walker,
            exec,
        }
    }

    /// Settings
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Container naming scheme
    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    /// Service definitions and chain types
    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    /// Key store receiving validator keys
    pub fn keystore(&self) -> &dyn KeyStore {
        self.keystore.as_ref()
    }

    /// Chain lifecycle
    pub fn chains(&self) -> &ChainLifecycle {
        &self.chains
    }

    /// Service lifecycle
    pub fn services(&self) -> &ServiceLifecycle {
        &self.services
    }

    /// Dependency walker
    pub fn walker(&self) -> &DependencyWalker {
        &self.walker
    }

    /// Exec, logs and inspect
    pub fn exec(&self) -> &ExecAdapter {
        &self.exec
    }

    /// Handle for the container of `kind` named `name`
    pub fn handle(&self, kind: ContainerKind, name: &str) -> ContainerHandle {
        ContainerHandle::new(self.engine.clone(), self.naming.container(kind, name))
    }

    /// Create and start a chain, starting the keys service first if configured
    pub async fn new_chain(
        &self,
        name: &str,
        chain_type: &str,
        init_dir: Option<&Path>,
        publish_all_ports: bool,
    ) -> Result<Chain> {
        if self.config.keys.autostart {
            if let Err(e) = self
                .walker
                .start(&self.config.keys.service, &ChainContext::none())
                .await
            {
                warn!(
                    "Could not start keys service '{}': {}",
                    self.config.keys.service, e
                );
            }
        }
        self.chains
            .create(name, chain_type, init_dir, publish_all_ports)
            .await
    }

    /// Start a service and its prerequisites for the chain in `ctx`
    pub async fn start_service(&self, service: &str, ctx: &ChainContext) -> Result<WalkReport> {
        self.walker.start(service, ctx).await
    }
}
