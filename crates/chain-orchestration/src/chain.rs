//! Chain lifecycle
//!
//! A chain is a node container plus a data container whose volume the node
//! mounts with `volumes_from`. Whenever the chain container exists its data
//! container exists too; the pair is only split when a removal asks for it.

use crate::config::OrchestratorConfig;
use crate::definitions::{ChainType, Definitions};
use crate::keys::KeyStore;
use crate::materializer::{
    CONFIG_FILE, ChainIdentity, ConfigMaterializer, GENESIS_FILE, PRIV_VALIDATOR_FILE,
};
use crate::naming::{ContainerKind, Naming, validate_name};
use crate::{Error, Resource, Result};
use container_engine::{ContainerEngine, ContainerSpec, ContainerStatus, RemoveOptions};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Label recording what a container is for
pub const KIND_LABEL: &str = "harness.kind";
/// Label recording the chain a container belongs to
pub const CHAIN_LABEL: &str = "harness.chain";
/// Label recording the chain type
pub const TYPE_LABEL: &str = "harness.type";
/// Label recording the chain's host directory
pub const HOME_LABEL: &str = "harness.home";

/// Observed state of a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainState {
    /// No chain container
    Absent,
    /// Created but never started
    Created,
    /// Running
    Running,
    /// Stopped or paused
    Stopped,
}

impl From<ContainerStatus> for ChainState {
    fn from(status: ContainerStatus) -> Self {
        match status {
            ContainerStatus::Absent => ChainState::Absent,
            ContainerStatus::Created => ChainState::Created,
            ContainerStatus::Running => ChainState::Running,
            ContainerStatus::Paused | ContainerStatus::Exited => ChainState::Stopped,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChainState::Absent => "absent",
            ChainState::Created => "created",
            ChainState::Running => "running",
            ChainState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// A chain as returned by [`ChainLifecycle::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    /// Chain name
    pub name: String,
    /// Chain type the chain was created from
    pub chain_type: String,
    /// State after the operation
    pub state: ChainState,
    /// Chain container name
    pub container: String,
    /// Data container name
    pub data_container: String,
    /// Host directory holding the artifacts
    pub host_dir: PathBuf,
    /// Generated identity; `None` when an existing data container was reused
    pub identity: Option<ChainIdentity>,
    /// Whether the validator key reached the key store
    pub keys_imported: bool,
}

/// One row of [`ChainLifecycle::list`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainSummary {
    /// Chain name
    pub name: String,
    /// Chain container state
    pub state: ChainState,
    /// Whether the data container exists
    pub data: bool,
    /// Host directory
    pub host_dir: PathBuf,
}

/// What [`ChainLifecycle::remove`] removes besides the chain container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveChainOptions {
    /// Also remove the data container and its volume
    pub remove_data_volume: bool,
    /// Also remove the host directory
    pub remove_home_dir: bool,
    /// Remove a running chain without stopping it first
    pub force: bool,
}

/// Drives chain containers through their lifecycle
pub struct ChainLifecycle {
    engine: Arc<dyn ContainerEngine>,
    config: OrchestratorConfig,
    naming: Naming,
    definitions: Arc<Definitions>,
    materializer: ConfigMaterializer,
    keystore: Arc<dyn KeyStore>,
}

impl ChainLifecycle {
    /// Create a lifecycle manager
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        config: OrchestratorConfig,
        definitions: Arc<Definitions>,
        keystore: Arc<dyn KeyStore>,
    ) -> Self {
        let naming = Naming::new(config.container_prefix.clone());
        let materializer = ConfigMaterializer::new(engine.clone(), config.container_root.clone());
        Self {
            engine,
            config,
            naming,
            definitions,
            materializer,
            keystore,
        }
    }

    async fn status(&self, container: &str) -> Result<ContainerStatus> {
        Ok(self.engine.status(container).await?)
    }

    fn default_host_dir(&self, name: &str) -> PathBuf {
        self.config.chains_dir().join(name)
    }

    /// Create a chain from `chain_type` and start it
    ///
    /// Artifacts are written to `init_dir` when given, otherwise to
    /// `<home>/chains/<name>`. An existing data container is reused as is.
    pub async fn create(
        &self,
        name: &str,
        chain_type: &str,
        init_dir: Option<&Path>,
        publish_all_ports: bool,
    ) -> Result<Chain> {
        validate_name(name)?;
        let container = self.naming.chain(name);
        let data = self.naming.data(name);

        if self.status(&container).await?.exists() {
            return Err(Error::already_exists(Resource::Chain, name));
        }
        let template = self.definitions.chain_type(chain_type)?;
        let host_dir = init_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.default_host_dir(name));

        info!("Creating chain '{}' of type '{}'", name, template.name);

        let fresh_data = !self.status(&data).await?.exists();
        let fresh_dir = !host_dir.exists();
        let (identity, keys_imported) = if fresh_data {
            self.create_data_container(name, &data).await?;
            match self.prepare(name, &template, &host_dir, &data).await {
                Ok(prepared) => prepared,
                Err(e) => {
                    self.discard_data(&data).await;
                    discard_artifacts(&host_dir, fresh_dir);
                    return Err(e);
                }
            }
        } else {
            info!("Reusing data container '{}' for chain '{}'", data, name);
            (None, false)
        };

        let spec = self.chain_spec(name, &template, &host_dir, &data, publish_all_ports);
        if let Err(e) = self.engine.create(&spec).await {
            if fresh_data {
                self.discard_data(&data).await;
                discard_artifacts(&host_dir, fresh_dir);
            }
            return Err(e.into());
        }
        self.engine.start(&container).await?;
        info!("Chain '{}' is running", name);

        Ok(Chain {
            name: name.to_string(),
            chain_type: template.name,
            state: ChainState::Running,
            container,
            data_container: data,
            host_dir,
            identity,
            keys_imported,
        })
    }

    async fn create_data_container(&self, chain: &str, data: &str) -> Result<()> {
        let spec = ContainerSpec::new(data, self.config.images.data.clone())
            .with_volume(self.config.container_root.clone())
            .with_label(KIND_LABEL, ContainerKind::Data.to_string())
            .with_label(CHAIN_LABEL, chain);
        self.engine.create(&spec).await?;
        debug!("Created data container '{}'", data);
        Ok(())
    }

    async fn prepare(
        &self,
        name: &str,
        template: &ChainType,
        host_dir: &Path,
        data: &str,
    ) -> Result<(Option<ChainIdentity>, bool)> {
        let (identity, key) = self
            .materializer
            .materialize(name, template, host_dir, data)
            .await?;

        let keys_imported = match self.keystore.import(&key).await {
            Ok(address) => {
                debug!("Validator key {} imported for chain '{}'", address, name);
                true
            }
            Err(e) => {
                let e = match e {
                    e @ Error::KeyImportFailed { .. } => e,
                    other => Error::KeyImportFailed {
                        address: identity.validator_address.clone(),
                        reason: other.to_string(),
                    },
                };
                warn!("Continuing without key import: {}", e);
                false
            }
        };

        Ok((Some(identity), keys_imported))
    }

    fn chain_spec(
        &self,
        name: &str,
        template: &ChainType,
        host_dir: &Path,
        data: &str,
        publish_all_ports: bool,
    ) -> ContainerSpec {
        let image = if template.image.is_empty() {
            self.config.images.chain.clone()
        } else {
            template.image.clone()
        };
        ContainerSpec::new(self.naming.chain(name), image)
            .with_command(template.command.clone())
            .with_volumes_from(data)
            .with_publish_all_ports(publish_all_ports)
            .with_env("CHAIN_ID", name)
            .with_env("CHAIN_HOME", self.config.container_chain_dir(name))
            .with_label(KIND_LABEL, ContainerKind::Chain.to_string())
            .with_label(CHAIN_LABEL, name)
            .with_label(TYPE_LABEL, template.name.clone())
            .with_label(HOME_LABEL, host_dir.display().to_string())
    }

    async fn discard_data(&self, data: &str) {
        let options = RemoveOptions {
            force: true,
            volumes: true,
        };
        match self.engine.remove(data, options).await {
            Ok(()) => debug!("Removed data container '{}' after failed create", data),
            Err(e) => warn!("Failed to remove data container '{}': {}", data, e),
        }
    }

    /// Start an existing chain
    pub async fn start(&self, name: &str, publish_all_ports: bool) -> Result<()> {
        let container = self.naming.chain(name);
        let status = self.status(&container).await?;
        if !status.exists() {
            return Err(Error::not_found(Resource::Chain, name));
        }
        if !self.status(&self.naming.data(name)).await?.exists() {
            return Err(Error::not_found(Resource::DataContainer, name));
        }
        if status.is_running() {
            debug!("Chain '{}' is already running", name);
            return Ok(());
        }
        if publish_all_ports {
            info!(
                "Chain '{}' already exists; port publication is fixed at creation",
                name
            );
        }

        self.engine.start(&container).await?;
        info!("Started chain '{}'", name);
        Ok(())
    }

    /// Stop a chain, keeping its data
    pub async fn stop(&self, name: &str, force: bool) -> Result<()> {
        let container = self.naming.chain(name);
        let status = self.status(&container).await?;
        if !status.exists() {
            return Err(Error::not_found(Resource::Chain, name));
        }
        if !status.is_running() {
            debug!("Chain '{}' is not running", name);
            return Ok(());
        }

        let timeout = if force {
            Duration::ZERO
        } else {
            self.config.stop_timeout()
        };
        self.engine.stop(&container, timeout).await?;
        info!("Stopped chain '{}'", name);
        Ok(())
    }

    /// Kill a chain and remove it together with its data container
    ///
    /// The host directory is kept.
    pub async fn kill(&self, name: &str) -> Result<()> {
        let container = self.naming.chain(name);
        let status = self.status(&container).await?;
        if !status.exists() {
            return Err(Error::not_found(Resource::Chain, name));
        }
        if status.is_running() {
            self.engine.kill(&container).await?;
        }

        let options = RemoveOptions {
            force: true,
            volumes: true,
        };
        self.engine.remove(&container, options).await?;
        self.remove_data(name).await?;
        info!("Killed chain '{}'", name);
        Ok(())
    }

    /// Remove a chain and, on request, its data container and host directory
    pub async fn remove(&self, name: &str, options: RemoveChainOptions) -> Result<()> {
        validate_name(name)?;
        let container = self.naming.chain(name);
        let status = self.status(&container).await?;
        if !status.exists() {
            return Err(Error::not_found(Resource::Chain, name));
        }
        let host_dir = self.chain_dir(name).await?;

        if status.is_running() && !options.force {
            self.engine
                .stop(&container, self.config.stop_timeout())
                .await?;
        }
        self.engine
            .remove(
                &container,
                RemoveOptions {
                    force: options.force,
                    volumes: true,
                },
            )
            .await?;
        info!("Removed chain container '{}'", container);

        if options.remove_data_volume {
            self.remove_data(name).await?;
        }
        if options.remove_home_dir {
            if host_dir.exists() {
                std::fs::remove_dir_all(&host_dir)?;
                info!("Removed chain directory {}", host_dir.display());
            } else {
                warn!("Chain directory {} does not exist", host_dir.display());
            }
        }
        Ok(())
    }

    async fn remove_data(&self, name: &str) -> Result<()> {
        let data = self.naming.data(name);
        let options = RemoveOptions {
            force: true,
            volumes: true,
        };
        match self.engine.remove(&data, options).await {
            Ok(()) => {
                info!("Removed data container '{}'", data);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Data container '{}' does not exist", data);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Current state of a chain
    pub async fn state(&self, name: &str) -> Result<ChainState> {
        Ok(self.status(&self.naming.chain(name)).await?.into())
    }

    /// Whether the container of `kind` named `name` exists
    pub async fn exists(&self, kind: ContainerKind, name: &str) -> Result<bool> {
        Ok(self
            .status(&self.naming.container(kind, name))
            .await?
            .exists())
    }

    /// Whether the container of `kind` named `name` is running
    pub async fn running(&self, kind: ContainerKind, name: &str) -> Result<bool> {
        Ok(self
            .status(&self.naming.container(kind, name))
            .await?
            .is_running())
    }

    /// Host directory of a chain
    ///
    /// Taken from the chain container's label when the container exists,
    /// otherwise the default location under the home directory.
    pub async fn chain_dir(&self, name: &str) -> Result<PathBuf> {
        let container = self.naming.chain(name);
        match self.engine.inspect(&container).await {
            Ok(info) => Ok(info
                .labels
                .get(HOME_LABEL)
                .map(PathBuf::from)
                .unwrap_or_else(|| self.default_host_dir(name))),
            Err(e) if e.is_not_found() => Ok(self.default_host_dir(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Chains with a directory under `<home>/chains`, with their state
    pub async fn list(&self) -> Result<Vec<ChainSummary>> {
        let chains_dir = self.config.chains_dir();
        if !chains_dir.is_dir() {
            return Ok(Vec::new());
        }

        let types_dir = self.config.chain_types_dir();
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&chains_dir)? {
            let path = entry?.path();
            if !path.is_dir() || path == types_dir {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.push(name.to_string());
            }
        }
        names.sort();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            summaries.push(ChainSummary {
                state: self.state(&name).await?,
                data: self.exists(ContainerKind::Data, &name).await?,
                host_dir: self.default_host_dir(&name),
                name,
            });
        }
        Ok(summaries)
    }
}

/// Undo the artifacts a failed create wrote to `host_dir`
///
/// A directory the create made is removed whole; in a directory that was
/// already there only the artifact files go.
fn discard_artifacts(host_dir: &Path, created: bool) {
    let result = if created {
        std::fs::remove_dir_all(host_dir)
    } else {
        [GENESIS_FILE, CONFIG_FILE, PRIV_VALIDATOR_FILE]
            .iter()
            .map(|file| host_dir.join(file))
            .filter(|path| path.exists())
            .try_for_each(std::fs::remove_file)
    };
    match result {
        Ok(()) => debug!("Removed chain artifacts from {}", host_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to clean up {}: {}", host_dir.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ValidatorKey;
    use async_trait::async_trait;
    use container_engine::MemoryEngine;
    use std::sync::Mutex;

    /// Records imported addresses
    #[derive(Default)]
    struct RecordingStore {
        imported: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl KeyStore for RecordingStore {
        async fn import(&self, key: &ValidatorKey) -> Result<String> {
            if self.fail {
                return Err(Error::Config("keys offline".to_string()));
            }
            let address = key.address();
            self.imported.lock().unwrap().push(address.clone());
            Ok(address)
        }

        async fn list(&self) -> Result<Vec<String>> {
            Ok(self.imported.lock().unwrap().clone())
        }
    }

    struct Fixture {
        home: tempfile::TempDir,
        engine: Arc<MemoryEngine>,
        store: Arc<RecordingStore>,
        chains: ChainLifecycle,
    }

    fn fixture(fail_keys: bool) -> Fixture {
        let home = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::with_home(home.path());
        let engine = Arc::new(MemoryEngine::new());
        let store = Arc::new(RecordingStore {
            fail: fail_keys,
            ..Default::default()
        });
        let definitions = Arc::new(Definitions::new(&config));
        let chains = ChainLifecycle::new(engine.clone(), config, definitions, store.clone());
        Fixture {
            home,
            engine,
            store,
            chains,
        }
    }

    #[smol_potat::test]
    async fn test_create_runs_chain_with_data() {
        let f = fixture(false);
        let chain = f.chains.create("alpha", "simplechain", None, false).await.unwrap();

        assert_eq!(chain.state, ChainState::Running);
        assert!(chain.keys_imported);
        assert!(f.chains.running(ContainerKind::Chain, "alpha").await.unwrap());
        assert!(f.chains.exists(ContainerKind::Data, "alpha").await.unwrap());

        let identity = chain.identity.unwrap();
        assert_eq!(
            f.store.list().await.unwrap(),
            vec![identity.validator_address.clone()]
        );
        assert!(chain.host_dir.join("genesis.json").exists());
    }

    #[smol_potat::test]
    async fn test_create_twice_is_rejected() {
        let f = fixture(false);
        f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        let err = f
            .chains
            .create("alpha", "simplechain", None, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Resource::Chain, .. }));
    }

    #[smol_potat::test]
    async fn test_unknown_chain_type() {
        let f = fixture(false);
        let err = f.chains.create("alpha", "nope", None, false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: Resource::ChainType, .. }));
        assert!(f.engine.container_names().is_empty());
    }

    #[smol_potat::test]
    async fn test_dot_names_never_touch_the_home() {
        let f = fixture(false);
        for name in [".", ".."] {
            let err = f
                .chains
                .create(name, "simplechain", None, false)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidName(_)));

            let options = RemoveChainOptions {
                remove_data_volume: true,
                remove_home_dir: true,
                force: true,
            };
            let err = f.chains.remove(name, options).await.unwrap_err();
            assert!(matches!(err, Error::InvalidName(_)));
        }
        assert!(f.engine.container_names().is_empty());
        assert!(f.home.path().exists());
    }

    #[smol_potat::test]
    async fn test_key_import_failure_is_not_fatal() {
        let f = fixture(true);
        let chain = f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        assert!(!chain.keys_imported);
        assert_eq!(chain.state, ChainState::Running);
    }

    #[smol_potat::test]
    async fn test_failed_chain_create_removes_fresh_data() {
        let f = fixture(false);
        f.engine.fail_create("harness-chain-alpha");
        assert!(f.chains.create("alpha", "simplechain", None, false).await.is_err());
        assert!(!f.chains.exists(ContainerKind::Data, "alpha").await.unwrap());
    }

    #[smol_potat::test]
    async fn test_failed_create_removes_its_artifacts() {
        let f = fixture(false);
        f.engine.fail_create("harness-chain-alpha");
        let init = tempfile::tempdir().unwrap();

        let fresh = init.path().join("fresh");
        assert!(
            f.chains
                .create("alpha", "simplechain", Some(&fresh), false)
                .await
                .is_err()
        );
        assert!(!fresh.exists());

        // a directory the user already had is kept, minus the artifacts
        let existing = init.path().join("existing");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("notes.txt"), "mine").unwrap();
        assert!(
            f.chains
                .create("alpha", "simplechain", Some(&existing), false)
                .await
                .is_err()
        );
        assert!(existing.join("notes.txt").exists());
        assert!(!existing.join("genesis.json").exists());
        assert!(!existing.join("priv_validator.json").exists());
    }

    #[smol_potat::test]
    async fn test_existing_data_container_is_reused() {
        let f = fixture(false);
        f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        f.chains
            .remove("alpha", RemoveChainOptions::default())
            .await
            .unwrap();
        assert!(f.chains.exists(ContainerKind::Data, "alpha").await.unwrap());

        let chain = f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        assert!(chain.identity.is_none());
        assert_eq!(f.store.list().await.unwrap().len(), 1);
    }

    #[smol_potat::test]
    async fn test_stop_start_kill() {
        let f = fixture(false);
        f.chains.create("alpha", "simplechain", None, false).await.unwrap();

        f.chains.stop("alpha", false).await.unwrap();
        assert_eq!(f.chains.state("alpha").await.unwrap(), ChainState::Stopped);
        // stopping again is a no-op
        f.chains.stop("alpha", true).await.unwrap();

        f.chains.start("alpha", true).await.unwrap();
        assert_eq!(f.chains.state("alpha").await.unwrap(), ChainState::Running);
        f.chains.start("alpha", false).await.unwrap();

        let host_dir = f.chains.chain_dir("alpha").await.unwrap();
        f.chains.kill("alpha").await.unwrap();
        assert_eq!(f.chains.state("alpha").await.unwrap(), ChainState::Absent);
        assert!(!f.chains.exists(ContainerKind::Data, "alpha").await.unwrap());
        assert!(host_dir.exists());
    }

    #[smol_potat::test]
    async fn test_missing_chain_operations() {
        let f = fixture(false);
        for err in [
            f.chains.start("ghost", false).await.unwrap_err(),
            f.chains.stop("ghost", false).await.unwrap_err(),
            f.chains.kill("ghost").await.unwrap_err(),
            f.chains
                .remove("ghost", RemoveChainOptions::default())
                .await
                .unwrap_err(),
        ] {
            assert!(matches!(err, Error::NotFound { kind: Resource::Chain, .. }));
        }
    }

    #[smol_potat::test]
    async fn test_start_without_data_container() {
        let f = fixture(false);
        f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        f.chains.stop("alpha", true).await.unwrap();
        f.engine
            .remove("harness-data-alpha", RemoveOptions::default())
            .await
            .unwrap();

        let err = f.chains.start("alpha", false).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: Resource::DataContainer, .. }));
    }

    #[smol_potat::test]
    async fn test_remove_everything() {
        let f = fixture(false);
        let init = tempfile::tempdir().unwrap();
        let init_dir = init.path().join("alpha");
        f.chains
            .create("alpha", "simplechain", Some(&init_dir), false)
            .await
            .unwrap();
        assert_eq!(f.chains.chain_dir("alpha").await.unwrap(), init_dir);

        let options = RemoveChainOptions {
            remove_data_volume: true,
            remove_home_dir: true,
            force: false,
        };
        f.chains.remove("alpha", options).await.unwrap();
        assert!(f.engine.container_names().is_empty());
        assert!(!init_dir.exists());
    }

    #[smol_potat::test]
    async fn test_list() {
        let f = fixture(false);
        f.chains.create("beta", "simplechain", None, false).await.unwrap();
        f.chains.create("alpha", "simplechain", None, false).await.unwrap();
        f.chains.stop("beta", true).await.unwrap();

        let summaries = f.chains.list().await.unwrap();
        let rows: Vec<(&str, ChainState)> = summaries
            .iter()
            .map(|s| (s.name.as_str(), s.state))
            .collect();
        assert_eq!(
            rows,
            vec![("alpha", ChainState::Running), ("beta", ChainState::Stopped)]
        );
    }
}
