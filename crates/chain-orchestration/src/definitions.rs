//! Service definitions and chain type templates
//!
//! Both are TOML files under the home directory and are loaded on first use.
//! A `keys` service and a `simplechain` chain type are always available.

use crate::config::OrchestratorConfig;
use crate::link::LinkSpec;
use crate::naming::validate_name;
use crate::{Error, Resource, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Name of the built-in chain type
pub const SIMPLECHAIN: &str = "simplechain";

/// An auxiliary service that can be started next to a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    /// Service name
    pub name: String,
    /// Image reference
    pub image: String,
    /// Human readable description
    pub description: Option<String>,
    /// Chain this service links to
    pub chain: LinkSpec,
    /// Whether the service gets its own data container
    pub data_container: bool,
    /// Environment variables
    pub environment: BTreeMap<String, String>,
    /// Ports published 1:1
    pub ports: Vec<u16>,
    /// Command overriding the image default
    pub command: Vec<String>,
    /// Services that must be running first, in start order
    pub dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceFile {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    chain: Option<String>,
    service: ServiceSection,
    #[serde(default)]
    dependencies: DependenciesSection,
}

#[derive(Debug, Deserialize)]
struct ServiceSection {
    #[serde(default)]
    name: String,
    image: String,
    #[serde(default)]
    data_container: bool,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    #[serde(default)]
    ports: Vec<u16>,
    #[serde(default)]
    command: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DependenciesSection {
    #[serde(default)]
    services: Vec<String>,
}

impl ServiceDefinition {
    /// A definition with no link, data container or dependencies
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            description: None,
            chain: LinkSpec::None,
            data_container: false,
            environment: BTreeMap::new(),
            ports: Vec::new(),
            command: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Parse a definition; `fallback_name` is used when the file names none
    pub fn from_toml_str(fallback_name: &str, contents: &str) -> Result<Self> {
        let file: ServiceFile = toml::from_str(contents)?;
        let name = if file.service.name.is_empty() {
            fallback_name.to_string()
        } else {
            file.service.name
        };
        validate_name(&name)?;
        if file.service.image.is_empty() {
            return Err(Error::Definition(format!("service '{}' has no image", name)));
        }
        for dep in &file.dependencies.services {
            validate_name(dep)?;
        }

        Ok(Self {
            chain: LinkSpec::parse_opt(file.chain.as_deref())?,
            name,
            image: file.service.image,
            description: file.description,
            data_container: file.service.data_container,
            environment: file.service.environment,
            ports: file.service.ports,
            command: file.service.command,
            dependencies: file.dependencies.services,
        })
    }

    /// The built-in key-management service
    pub fn keys(config: &OrchestratorConfig) -> Self {
        let mut keys = Self::new(config.keys.service.clone(), config.images.keys.clone());
        keys.description = Some("Validator key store".to_string());
        keys.data_container = true;
        keys
    }
}

/// Template for creating chains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainType {
    /// Type name
    #[serde(default)]
    pub name: String,
    /// Image reference; the configured chain image when empty
    #[serde(default)]
    pub image: String,
    /// Command overriding the image default
    #[serde(default)]
    pub command: Vec<String>,
    /// Ports the node listens on
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Genesis balance of the validator account
    #[serde(default = "default_account_amount")]
    pub account_amount: u64,
    /// Bonded amount of the validator
    #[serde(default = "default_validator_amount")]
    pub validator_amount: u64,
}

fn default_account_amount() -> u64 {
    9_999_999_999
}

fn default_validator_amount() -> u64 {
    9_999_999_998
}

impl ChainType {
    /// The built-in `simplechain` type
    pub fn simplechain(config: &OrchestratorConfig) -> Self {
        Self {
            name: SIMPLECHAIN.to_string(),
            image: config.images.chain.clone(),
            command: Vec::new(),
            ports: vec![46656, 46657],
            account_amount: default_account_amount(),
            validator_amount: default_validator_amount(),
        }
    }

    /// Parse a chain type; `fallback_name` is used when the file names none
    pub fn from_toml_str(fallback_name: &str, contents: &str) -> Result<Self> {
        let mut chain_type: ChainType = toml::from_str(contents)?;
        if chain_type.name.is_empty() {
            chain_type.name = fallback_name.to_string();
        }
        validate_name(&chain_type.name)?;
        Ok(chain_type)
    }
}

/// Registry of service definitions and chain types
///
/// Definitions are looked up in memory first and then in
/// `<home>/services/<name>.toml` or `<home>/chains/types/<name>.toml`.
pub struct Definitions {
    services_dir: PathBuf,
    chain_types_dir: PathBuf,
    default_chain_image: String,
    services: RwLock<HashMap<String, ServiceDefinition>>,
    chain_types: RwLock<HashMap<String, ChainType>>,
}

impl Definitions {
    /// Create a registry holding the built-in definitions
    pub fn new(config: &OrchestratorConfig) -> Self {
        let keys = ServiceDefinition::keys(config);
        let simplechain = ChainType::simplechain(config);
        Self {
            services_dir: config.services_dir(),
            chain_types_dir: config.chain_types_dir(),
            default_chain_image: config.images.chain.clone(),
            services: RwLock::new(HashMap::from([(keys.name.clone(), keys)])),
            chain_types: RwLock::new(HashMap::from([(simplechain.name.clone(), simplechain)])),
        }
    }

    /// Register or replace a service definition in memory
    pub fn insert_service(&self, definition: ServiceDefinition) {
        self.services
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(definition.name.clone(), definition);
    }

    /// Register or replace a chain type in memory
    pub fn insert_chain_type(&self, chain_type: ChainType) {
        self.chain_types
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chain_type.name.clone(), chain_type);
    }

    /// Look up a service definition
    pub fn service(&self, name: &str) -> Result<ServiceDefinition> {
        validate_name(name)?;
        if let Some(definition) = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(definition.clone());
        }

        let path = self.services_dir.join(format!("{}.toml", name));
        let Some(contents) = read_if_exists(&path)? else {
            return Err(Error::not_found(Resource::Service, name));
        };
        debug!("Loading service definition from {}", path.display());
        let definition = ServiceDefinition::from_toml_str(name, &contents)
            .map_err(|e| Error::Definition(format!("{}: {}", path.display(), e)))?;
        self.insert_service(definition.clone());
        Ok(definition)
    }

    /// Look up a chain type
    pub fn chain_type(&self, name: &str) -> Result<ChainType> {
        validate_name(name)?;
        if let Some(chain_type) = self
            .chain_types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(chain_type.clone());
        }

        let path = self.chain_types_dir.join(format!("{}.toml", name));
        let Some(contents) = read_if_exists(&path)? else {
            return Err(Error::not_found(Resource::ChainType, name));
        };
        debug!("Loading chain type from {}", path.display());
        let mut chain_type = ChainType::from_toml_str(name, &contents)
            .map_err(|e| Error::Definition(format!("{}: {}", path.display(), e)))?;
        if chain_type.image.is_empty() {
            chain_type.image = self.default_chain_image.clone();
        }
        self.insert_chain_type(chain_type.clone());
        Ok(chain_type)
    }

    /// Names of every known service, in memory or on disk
    pub fn service_names(&self) -> Result<Vec<String>> {
        let mut names: BTreeSet<String> = self
            .services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.extend(toml_stems(&self.services_dir)?);
        Ok(names.into_iter().collect())
    }
}

fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn toml_stems(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut stems = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(stem.to_string());
            }
        }
    }
    Ok(stems)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAKE: &str = r#"
description = "A fake service linked to the selected chain"
chain = "$chain:fake"

[service]
name = "fake"
image = "harness/keys"
data_container = true
ports = [4767]

[service.environment]
LOG_LEVEL = "debug"

[dependencies]
services = ["sham"]
"#;

    #[test]
    fn test_parse_service_definition() {
        let def = ServiceDefinition::from_toml_str("ignored", FAKE).unwrap();
        assert_eq!(def.name, "fake");
        assert_eq!(
            def.chain,
            LinkSpec::Placeholder {
                alias: "fake".to_string()
            }
        );
        assert!(def.data_container);
        assert_eq!(def.ports, vec![4767]);
        assert_eq!(def.environment["LOG_LEVEL"], "debug");
        assert_eq!(def.dependencies, vec!["sham".to_string()]);
    }

    #[test]
    fn test_minimal_definition_uses_fallback_name() {
        let def =
            ServiceDefinition::from_toml_str("bare", "[service]\nimage = \"busybox\"\n").unwrap();
        assert_eq!(def.name, "bare");
        assert_eq!(def.chain, LinkSpec::None);
        assert!(!def.data_container);
        assert!(def.dependencies.is_empty());
    }

    #[test]
    fn test_bad_link_is_rejected_at_load() {
        let contents = "chain = \"$chainz\"\n[service]\nimage = \"busybox\"\n";
        let err = ServiceDefinition::from_toml_str("x", contents).unwrap_err();
        assert!(matches!(err, Error::InvalidLink { .. }));
    }

    #[test]
    fn test_registry_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::with_home(dir.path());
        std::fs::create_dir_all(config.services_dir()).unwrap();
        std::fs::write(config.services_dir().join("fake.toml"), FAKE).unwrap();

        let defs = Definitions::new(&config);
        assert_eq!(defs.service("fake").unwrap().name, "fake");
        assert!(defs.service("keys").unwrap().data_container);
        assert!(matches!(
            defs.service("missing").unwrap_err(),
            Error::NotFound {
                kind: Resource::Service,
                ..
            }
        ));
        assert_eq!(defs.service_names().unwrap(), vec!["fake", "keys"]);
    }

    #[test]
    fn test_chain_types() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::with_home(dir.path());
        std::fs::create_dir_all(config.chain_types_dir()).unwrap();
        std::fs::write(
            config.chain_types_dir().join("bigchain.toml"),
            "ports = [26656]\naccount_amount = 5\n",
        )
        .unwrap();

        let defs = Definitions::new(&config);
        let simple = defs.chain_type(SIMPLECHAIN).unwrap();
        assert_eq!(simple.ports, vec![46656, 46657]);

        let big = defs.chain_type("bigchain").unwrap();
        assert_eq!(big.name, "bigchain");
        assert_eq!(big.image, config.images.chain);
        assert_eq!(big.account_amount, 5);
        assert_eq!(big.validator_amount, default_validator_amount());
    }
}
