//! Validator keys and the key-management service

use crate::{Error, Result};
use async_trait::async_trait;
use container_engine::{ContainerEngine, ContainerHandle};
use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

/// Length in bytes of a validator address
const ADDRESS_LEN: usize = 20;

/// An ed25519 validator key
#[derive(Clone)]
pub struct ValidatorKey {
    signing_key: SigningKey,
}

/// Public key as written to key and genesis files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyJson {
    /// Key algorithm
    #[serde(rename = "type")]
    pub kind: String,
    /// Upper-case hex key bytes
    pub data: String,
}

/// Key file stored in the key-management service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyFile {
    /// Validator address
    pub address: String,
    /// Public key
    pub pub_key: PublicKeyJson,
    /// Upper-case hex of the 64-byte keypair
    pub priv_key: String,
}

impl ValidatorKey {
    /// Generate a new key from OS entropy
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Derive a key from a fixed seed
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// The verifying half of the key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Upper-hex of the first 20 bytes of SHA-256 over the public key
    pub fn address(&self) -> String {
        let digest = Sha256::digest(self.verifying_key().as_bytes());
        hex::encode_upper(&digest[..ADDRESS_LEN])
    }

    /// Public key in file form
    pub fn public_key_json(&self) -> PublicKeyJson {
        PublicKeyJson {
            kind: "ed25519".to_string(),
            data: hex::encode_upper(self.verifying_key().as_bytes()),
        }
    }

    /// Upper-hex of the 64-byte keypair
    pub fn private_key_hex(&self) -> String {
        hex::encode_upper(self.signing_key.to_keypair_bytes())
    }

    /// Key file as stored by the key-management service
    pub fn key_file(&self) -> KeyFile {
        KeyFile {
            address: self.address(),
            pub_key: self.public_key_json(),
            priv_key: self.private_key_hex(),
        }
    }
}

impl std::fmt::Debug for ValidatorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorKey")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Key-management collaborator
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Store a key, returning its address
    async fn import(&self, key: &ValidatorKey) -> Result<String>;

    /// Addresses of every stored key
    async fn list(&self) -> Result<Vec<String>>;
}

/// Key store backed by the keys service container
///
/// Keys are stored as `<root>/data/<ADDR>/<ADDR>` inside the container.
pub struct KeysService {
    engine: Arc<dyn ContainerEngine>,
    handle: ContainerHandle,
    root: String,
}

impl KeysService {
    /// Create a key store for the keys service `container`, keeping keys under `root`
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        container: impl Into<String>,
        root: impl Into<String>,
    ) -> Self {
        let handle = ContainerHandle::new(engine.clone(), container);
        Self {
            engine,
            handle,
            root: root.into(),
        }
    }

    /// Directory holding the key directories
    pub fn data_dir(&self) -> String {
        format!("{}/data", self.root.trim_end_matches('/'))
    }
}

#[async_trait]
impl KeyStore for KeysService {
    async fn import(&self, key: &ValidatorKey) -> Result<String> {
        let address = key.address();
        let failed = |reason: String| Error::KeyImportFailed {
            address: address.clone(),
            reason,
        };

        if !self.handle.running().await? {
            return Err(failed(format!(
                "keys service container '{}' is not running",
                self.handle.name()
            )));
        }

        let staging = tempfile::tempdir()?;
        let key_dir = staging.path().join("data").join(&address);
        std::fs::create_dir_all(&key_dir)?;
        std::fs::write(
            key_dir.join(&address),
            serde_json::to_vec_pretty(&key.key_file())?,
        )?;

        self.engine
            .copy_into(self.handle.name(), staging.path(), &self.root)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!("Imported validator key {} into {}", address, self.handle.name());
        Ok(address)
    }

    async fn list(&self) -> Result<Vec<String>> {
        let dir = self.data_dir();
        let output = self
            .handle
            .exec(&["ls".to_string(), dir.clone()])
            .await
            .map_err(|e| Error::ExecFailed {
                container: self.handle.name().to_string(),
                code: None,
                output: e.to_string(),
            })?;

        if !output.success() {
            if output.output.contains("No such file or directory") {
                debug!("No keys stored yet under {}", dir);
                return Ok(Vec::new());
            }
            return Err(Error::ExecFailed {
                container: self.handle.name().to_string(),
                code: output.code,
                output: output.output,
            });
        }

        Ok(output
            .output
            .split_whitespace()
            .map(str::to_string)
            .collect())
    }
}
