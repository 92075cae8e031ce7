//! Chain identity artifacts
//!
//! Every chain gets a single validator whose key, genesis document and node
//! config are generated at creation, written to the host directory and then
//! copied into the chain's data volume under `<container_root>/chains/<name>`.

use crate::definitions::ChainType;
use crate::keys::{PublicKeyJson, ValidatorKey};
use crate::Result;
use chrono::{SecondsFormat, Utc};
use container_engine::ContainerEngine;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Genesis document file name
pub const GENESIS_FILE: &str = "genesis.json";
/// Node config file name
pub const CONFIG_FILE: &str = "config.toml";
/// Validator key file name
pub const PRIV_VALIDATOR_FILE: &str = "priv_validator.json";

/// Default peer-to-peer port when the chain type lists none
const DEFAULT_P2P_PORT: u16 = 46656;
/// Default RPC port when the chain type lists fewer than two
const DEFAULT_RPC_PORT: u16 = 46657;

/// Genesis document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisDoc {
    /// RFC 3339 creation time
    pub genesis_time: String,
    /// Chain identifier, equal to the chain name
    pub chain_id: String,
    /// Consensus parameters
    pub params: GenesisParams,
    /// Funded accounts
    pub accounts: Vec<GenesisAccount>,
    /// Initial validator set
    pub validators: Vec<GenesisValidator>,
}

/// Consensus parameters carried in the genesis document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisParams {
    /// Maximum transactions per block
    pub block_max_txs: u64,
    /// Maximum block size in bytes
    pub block_max_bytes: u64,
}

impl Default for GenesisParams {
    fn default() -> Self {
        Self {
            block_max_txs: 10_000,
            block_max_bytes: 22_020_096,
        }
    }
}

/// A funded account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Account address
    pub address: String,
    /// Balance
    pub amount: u64,
}

/// A genesis validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisValidator {
    /// Validator public key
    pub pub_key: PublicKeyJson,
    /// Bonded amount
    pub amount: u64,
    /// Validator name
    pub name: String,
    /// Accounts receiving the bond on unbonding
    pub unbond_to: Vec<GenesisAccount>,
}

/// Node configuration written as `config.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node name
    pub moniker: String,
    /// Chain identifier
    pub chain_id: String,
    /// Peer-to-peer listen address
    pub p2p_laddr: String,
    /// RPC listen address
    pub rpc_laddr: String,
    /// Database backend
    pub db_backend: String,
    /// Log level
    pub log_level: String,
}

/// Validator key file written as `priv_validator.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivValidator {
    /// Validator address
    pub address: String,
    /// Public key
    pub pub_key: PublicKeyJson,
    /// Upper-case hex of the keypair
    pub priv_key: String,
    /// Last signed height
    pub last_height: u64,
    /// Last signed round
    pub last_round: u64,
    /// Last signed step
    pub last_step: u8,
}

/// Identity generated for a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainIdentity {
    /// Chain identifier
    pub chain_id: String,
    /// Node moniker
    pub moniker: String,
    /// Validator address
    pub validator_address: String,
    /// Genesis document
    pub genesis: GenesisDoc,
}

/// Generates identity artifacts and installs them into data volumes
pub struct ConfigMaterializer {
    engine: Arc<dyn ContainerEngine>,
    container_root: String,
}

impl ConfigMaterializer {
    /// Create a materializer copying into `<container_root>/chains/<name>`
    pub fn new(engine: Arc<dyn ContainerEngine>, container_root: impl Into<String>) -> Self {
        Self {
            engine,
            container_root: container_root.into(),
        }
    }

    /// Moniker of the single validator of `chain`
    pub fn moniker(chain: &str) -> String {
        format!("{}_validator_000", chain)
    }

    /// Build the genesis document, node config and key file for `chain`
    pub fn generate(
        chain: &str,
        chain_type: &ChainType,
        key: &ValidatorKey,
    ) -> (GenesisDoc, NodeConfig, PrivValidator) {
        let address = key.address();
        let moniker = Self::moniker(chain);
        let account = GenesisAccount {
            address: address.clone(),
            amount: chain_type.account_amount,
        };

        let genesis = GenesisDoc {
            genesis_time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            chain_id: chain.to_string(),
            params: GenesisParams::default(),
            accounts: vec![account.clone()],
            validators: vec![GenesisValidator {
                pub_key: key.public_key_json(),
                amount: chain_type.validator_amount,
                name: moniker.clone(),
                unbond_to: vec![GenesisAccount {
                    amount: chain_type.validator_amount,
                    ..account
                }],
            }],
        };

        let p2p = chain_type.ports.first().copied().unwrap_or(DEFAULT_P2P_PORT);
        let rpc = chain_type.ports.get(1).copied().unwrap_or(DEFAULT_RPC_PORT);
        let node = NodeConfig {
            moniker,
            chain_id: chain.to_string(),
            p2p_laddr: format!("0.0.0.0:{}", p2p),
            rpc_laddr: format!("0.0.0.0:{}", rpc),
            db_backend: "leveldb".to_string(),
            log_level: "info".to_string(),
        };

        let priv_validator = PrivValidator {
            address,
            pub_key: key.public_key_json(),
            priv_key: key.private_key_hex(),
            last_height: 0,
            last_round: 0,
            last_step: 0,
        };

        (genesis, node, priv_validator)
    }

    /// Generate a fresh validator and write all artifacts into `dir`
    pub fn write_artifacts(
        chain: &str,
        chain_type: &ChainType,
        dir: &Path,
    ) -> Result<(ChainIdentity, ValidatorKey)> {
        let key = ValidatorKey::generate();
        let (genesis, node, priv_validator) = Self::generate(chain, chain_type, &key);

        std::fs::create_dir_all(dir)?;
        std::fs::write(dir.join(GENESIS_FILE), serde_json::to_vec_pretty(&genesis)?)?;
        std::fs::write(dir.join(CONFIG_FILE), toml::to_string(&node)?)?;
        std::fs::write(
            dir.join(PRIV_VALIDATOR_FILE),
            serde_json::to_vec_pretty(&priv_validator)?,
        )?;
        debug!("Wrote chain artifacts for '{}' to {}", chain, dir.display());

        let identity = ChainIdentity {
            chain_id: genesis.chain_id.clone(),
            moniker: node.moniker,
            validator_address: priv_validator.address,
            genesis,
        };
        Ok((identity, key))
    }

    /// Generate artifacts into `host_dir` and copy them into `data_container`
    pub async fn materialize(
        &self,
        chain: &str,
        chain_type: &ChainType,
        host_dir: &Path,
        data_container: &str,
    ) -> Result<(ChainIdentity, ValidatorKey)> {
        let (identity, key) = Self::write_artifacts(chain, chain_type, host_dir)?;

        // Stage as chains/<name>/... so a single copy lands under the root
        let staging = tempfile::tempdir()?;
        let staged = staging.path().join("chains").join(chain);
        std::fs::create_dir_all(&staged)?;
        for file in [GENESIS_FILE, CONFIG_FILE, PRIV_VALIDATOR_FILE] {
            std::fs::copy(host_dir.join(file), staged.join(file))?;
        }
        self.engine
            .copy_into(data_container, staging.path(), &self.container_root)
            .await?;

        info!(
            "Materialized chain '{}' (validator {}) into {}",
            chain, identity.validator_address, data_container
        );
        Ok((identity, key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OrchestratorConfig;
    use container_engine::{ContainerSpec, MemoryEngine};

    fn simplechain() -> ChainType {
        ChainType::simplechain(&OrchestratorConfig::with_home("/unused"))
    }

    #[test]
    fn test_generate_identity() {
        let key = ValidatorKey::from_seed([9u8; 32]);
        let (genesis, node, priv_validator) =
            ConfigMaterializer::generate("alpha", &simplechain(), &key);

        assert_eq!(genesis.chain_id, "alpha");
        assert_eq!(genesis.accounts[0].address, key.address());
        assert_eq!(genesis.validators[0].name, "alpha_validator_000");
        assert_eq!(genesis.validators[0].unbond_to[0].address, key.address());
        assert_eq!(node.moniker, "alpha_validator_000");
        assert_eq!(node.rpc_laddr, "0.0.0.0:46657");
        assert_eq!(priv_validator.address, key.address());
        assert!(chrono::DateTime::parse_from_rfc3339(&genesis.genesis_time).is_ok());
    }

    #[test]
    fn test_write_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (identity, key) =
            ConfigMaterializer::write_artifacts("alpha", &simplechain(), dir.path()).unwrap();

        let genesis = std::fs::read_to_string(dir.path().join(GENESIS_FILE)).unwrap();
        assert!(genesis.contains("\"chain_id\": \"alpha\""));
        assert!(genesis.contains("accounts"));
        assert!(genesis.contains("validators"));

        let config = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.contains("moniker = \"alpha_validator_000\""));

        let priv_validator: PrivValidator = serde_json::from_slice(
            &std::fs::read(dir.path().join(PRIV_VALIDATOR_FILE)).unwrap(),
        )
        .unwrap();
        assert_eq!(priv_validator.address, key.address());
        assert_eq!(identity.validator_address, key.address());
    }

    #[smol_potat::test]
    async fn test_materialize_into_data_container() {
        let engine = Arc::new(MemoryEngine::new());
        engine
            .create(&ContainerSpec::new("harness-data-alpha", "data").with_volume("/root"))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let materializer = ConfigMaterializer::new(engine.clone(), "/root");
        let (identity, _) = materializer
            .materialize("alpha", &simplechain(), dir.path(), "harness-data-alpha")
            .await
            .unwrap();

        let genesis = engine
            .read_file("harness-data-alpha", "/root/chains/alpha/genesis.json")
            .unwrap();
        assert!(genesis.contains(&identity.validator_address));
        assert!(engine
            .read_file("harness-data-alpha", "/root/chains/alpha/priv_validator.json")
            .is_some());
    }
}
