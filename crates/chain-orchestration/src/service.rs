//! Service container lifecycle

use crate::chain::{CHAIN_LABEL, KIND_LABEL};
use crate::config::OrchestratorConfig;
use crate::definitions::ServiceDefinition;
use crate::link::{ChainContext, LinkResolver};
use crate::naming::{ContainerKind, Naming};
use crate::{Error, Resource, Result};
use container_engine::{ContainerEngine, ContainerLink, ContainerSpec, RemoveOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label recording the service a container belongs to
pub const SERVICE_LABEL: &str = "harness.service";

/// Outcome of starting one service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStart {
    /// Links the service container was created with
    pub links: Vec<ContainerLink>,
    /// The container was already running
    pub already_running: bool,
}

/// Starts, stops and kills single service containers
pub struct ServiceLifecycle {
    engine: Arc<dyn ContainerEngine>,
    config: OrchestratorConfig,
    naming: Naming,
    resolver: LinkResolver,
}

impl ServiceLifecycle {
    /// Create a service lifecycle manager
    pub fn new(engine: Arc<dyn ContainerEngine>, config: OrchestratorConfig) -> Self {
        let naming = Naming::new(config.container_prefix.clone());
        let resolver = LinkResolver::new(engine.clone(), naming.clone());
        Self {
            engine,
            config,
            naming,
            resolver,
        }
    }

    /// Start the service described by `definition`
    ///
    /// Dependencies are expected to be running already; their containers are
    /// linked under the dependency names.
    /// A stopped container is restarted only while its links still resolve
    /// to what it was created with; otherwise it is recreated.
    pub async fn start(
        &self,
        definition: &ServiceDefinition,
        ctx: &ChainContext,
    ) -> Result<ServiceStart> {
        let container = self.naming.service(&definition.name);
        let status = self.engine.status(&container).await?;

        if status.is_running() {
            debug!("Service '{}' is already running", definition.name);
            let links = self.engine.inspect(&container).await?.links;
            return Ok(ServiceStart {
                links,
                already_running: true,
            });
        }

        let links = self.links_for(definition, ctx).await?;

        if status.exists() {
            let current = self.engine.inspect(&container).await?.links;
            if same_links(&current, &links) {
                self.engine.start(&container).await?;
                info!("Restarted service '{}'", definition.name);
                return Ok(ServiceStart {
                    links,
                    already_running: false,
                });
            }
            info!(
                "Recreating service '{}': its links no longer match",
                definition.name
            );
            self.engine
                .remove(
                    &container,
                    RemoveOptions {
                        force: true,
                        volumes: false,
                    },
                )
                .await?;
        }

        let mut spec = ContainerSpec::new(container.clone(), definition.image.clone())
            .with_command(definition.command.clone())
            .with_label(KIND_LABEL, ContainerKind::Service.to_string())
            .with_label(SERVICE_LABEL, definition.name.clone());
        spec.links = links.clone();
        spec.env = definition.environment.clone();
        spec.ports = definition.ports.clone();
        if let Some(chain) = ctx.name() {
            spec = spec
                .with_env("CHAIN_ID", chain)
                .with_label(CHAIN_LABEL, chain);
        }

        let mut fresh_data = None;
        if definition.data_container {
            let data = self.naming.data(&definition.name);
            if !self.engine.status(&data).await?.exists() {
                self.create_data_container(&definition.name, &data).await?;
                fresh_data = Some(data.clone());
            }
            spec = spec.with_volumes_from(data);
        }

        if let Err(e) = self.engine.create(&spec).await {
            if let Some(data) = fresh_data {
                self.discard(&data).await;
            }
            return Err(e.into());
        }
        self.engine.start(&container).await?;
        info!(
            "Started service '{}' with {} link(s)",
            definition.name,
            links.len()
        );

        Ok(ServiceStart {
            links,
            already_running: false,
        })
    }

    /// Resolved chain link followed by a link to each direct dependency
    async fn links_for(
        &self,
        definition: &ServiceDefinition,
        ctx: &ChainContext,
    ) -> Result<Vec<ContainerLink>> {
        let mut links = Vec::new();
        if let Some(link) = self
            .resolver
            .resolve(&definition.name, &definition.chain, ctx)
            .await?
        {
            links.push(link);
        }
        links.extend(
            definition
                .dependencies
                .iter()
                .map(|dep| ContainerLink::new(self.naming.service(dep), dep.clone())),
        );
        Ok(links)
    }

    async fn create_data_container(&self, service: &str, data: &str) -> Result<()> {
        let spec = ContainerSpec::new(data, self.config.images.data.clone())
            .with_volume(self.config.container_root.clone())
            .with_label(KIND_LABEL, ContainerKind::Data.to_string())
            .with_label(SERVICE_LABEL, service);
        self.engine.create(&spec).await?;
        debug!("Created data container '{}'", data);
        Ok(())
    }

    async fn discard(&self, container: &str) {
        let options = RemoveOptions {
            force: true,
            volumes: true,
        };
        if let Err(e) = self.engine.remove(container, options).await {
            warn!("Failed to remove '{}': {}", container, e);
        }
    }

    /// Stop a running service
    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let container = self.naming.service(name);
        let status = self.engine.status(&container).await?;
        if !status.exists() {
            return Err(Error::not_found(Resource::Service, name));
        }
        if !status.is_running() {
            debug!("Service '{}' is not running", name);
            return Ok(());
        }

        let timeout = if force {
            Duration::ZERO
        } else {
            self.config.stop_timeout()
        };
        self.engine.stop(&container, timeout).await?;
        info!("Stopped service '{}'", name);
        Ok(())
    }

    /// Kill a service, optionally removing its container and data container
    pub async fn kill(&self, name: &str, remove: bool, remove_data: bool) -> Result<()> {
        let container = self.naming.service(name);
        let status = self.engine.status(&container).await?;
        if status.is_running() {
            self.engine.kill(&container).await?;
            info!("Killed service '{}'", name);
        } else if !status.exists() {
            warn!("Service container '{}' does not exist", container);
        }

        let options = RemoveOptions {
            force: true,
            volumes: true,
        };
        if remove && status.exists() {
            self.engine.remove(&container, options).await?;
        }
        if remove_data {
            let data = self.naming.data(name);
            match self.engine.remove(&data, options).await {
                Ok(()) => info!("Removed data container '{}'", data),
                Err(e) if e.is_not_found() => warn!("Data container '{}' does not exist", data),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn same_links(current: &[ContainerLink], wanted: &[ContainerLink]) -> bool {
    let mut current = current.to_vec();
    let mut wanted = wanted.to_vec();
    current.sort();
    wanted.sort();
    current == wanted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkSpec;
    use container_engine::MemoryEngine;

    fn lifecycle() -> (Arc<MemoryEngine>, ServiceLifecycle) {
        let engine = Arc::new(MemoryEngine::new());
        let services =
            ServiceLifecycle::new(engine.clone(), OrchestratorConfig::with_home("/unused"));
        (engine, services)
    }

    #[smol_potat::test]
    async fn test_start_without_chain_link() {
        let (engine, services) = lifecycle();
        let keys = ServiceDefinition::new("keys", "harness/keys");

        let started = services.start(&keys, &ChainContext::none()).await.unwrap();
        assert!(started.links.is_empty());
        assert!(!started.already_running);
        assert!(engine.status("harness-service-keys").await.unwrap().is_running());

        let again = services.start(&keys, &ChainContext::none()).await.unwrap();
        assert!(again.already_running);
    }

    #[smol_potat::test]
    async fn test_start_with_data_container_and_link() {
        let (engine, services) = lifecycle();
        engine
            .create(&ContainerSpec::new("harness-chain-alpha", "chain"))
            .await
            .unwrap();

        let mut fake = ServiceDefinition::new("fake", "harness/keys");
        fake.chain = LinkSpec::parse("$chain:fake").unwrap();
        fake.data_container = true;

        let started = services
            .start(&fake, &ChainContext::chain("alpha"))
            .await
            .unwrap();
        assert_eq!(
            started.links,
            vec![ContainerLink::new("harness-chain-alpha", "fake")]
        );
        assert!(engine.status("harness-data-fake").await.unwrap().exists());

        let info = engine.inspect("harness-service-fake").await.unwrap();
        assert_eq!(info.volumes_from, vec!["harness-data-fake".to_string()]);
        assert_eq!(info.links, started.links);
    }

    #[smol_potat::test]
    async fn test_failed_create_discards_fresh_data() {
        let (engine, services) = lifecycle();
        engine.fail_create("harness-service-fake");

        let mut fake = ServiceDefinition::new("fake", "harness/keys");
        fake.data_container = true;
        assert!(services.start(&fake, &ChainContext::none()).await.is_err());
        assert!(engine.container_names().is_empty());
    }

    #[smol_potat::test]
    async fn test_stop_and_kill() {
        let (engine, services) = lifecycle();
        let mut keys = ServiceDefinition::new("keys", "harness/keys");
        keys.data_container = true;
        services.start(&keys, &ChainContext::none()).await.unwrap();

        services.stop("keys", false).await.unwrap();
        assert!(!engine.status("harness-service-keys").await.unwrap().is_running());

        // restart of an exited container keeps it
        let restarted = services.start(&keys, &ChainContext::none()).await.unwrap();
        assert!(!restarted.already_running);

        services.kill("keys", true, true).await.unwrap();
        assert!(engine.container_names().is_empty());

        let err = services.stop("keys", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: Resource::Service, .. }));
        // killing again only warns
        services.kill("keys", true, true).await.unwrap();
    }

    #[smol_potat::test]
    async fn test_stopped_service_link_is_resolved_again() {
        let (engine, services) = lifecycle();
        engine
            .create(&ContainerSpec::new("harness-chain-alpha", "chain"))
            .await
            .unwrap();
        let mut fake = ServiceDefinition::new("fake", "harness/keys");
        fake.chain = LinkSpec::parse("$chain:fake").unwrap();
        let alpha = ChainContext::chain("alpha");

        services.start(&fake, &alpha).await.unwrap();
        services.stop("fake", true).await.unwrap();

        let err = services.start(&fake, &ChainContext::none()).await.unwrap_err();
        assert!(matches!(err, Error::MissingChainContext { .. }));

        engine
            .remove("harness-chain-alpha", RemoveOptions::default())
            .await
            .unwrap();
        let err = services.start(&fake, &alpha).await.unwrap_err();
        assert!(matches!(err, Error::UnresolvedChainLink { .. }));
        assert!(!engine.status("harness-service-fake").await.unwrap().is_running());
    }
}
