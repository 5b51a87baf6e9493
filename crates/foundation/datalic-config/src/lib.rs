//! datalic configuration
//!
//! Layered the same way every time:
//!
//! 1. built-in defaults
//! 2. `~/.config/datalic/config.yaml` (or an explicit path)
//! 3. `DATALIC_*` environment variables
//!
//! A missing file is not an error; a malformed one is.

use datalic_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_STORE_BACKEND: &str = "DATALIC_STORE_BACKEND";
pub const ENV_STORE_PATH: &str = "DATALIC_STORE_PATH";
pub const ENV_CONTRACT_ADDRESS: &str = "DATALIC_CONTRACT_ADDRESS";
pub const ENV_CHAIN_ID: &str = "DATALIC_CHAIN_ID";
pub const ENV_VALIDITY_DAYS: &str = "DATALIC_VALIDITY_DAYS";

/// Which key-value medium backs the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Sqlite,
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(Error::Config(format!("unknown store backend '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: BackendKind,
    /// SQLite file; `None` means the platform data dir
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            path: None,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

/// Read-only network facts resolved at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub contract_address: String,
    /// Decimal or `0x` hex, as wallets report it
    pub chain_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            contract_address: "0x0000000000000000000000000000000000000000".into(),
            chain_id: "0xaa36a7".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    pub validity_days: u32,
    /// How long to wait for a signature before treating the request as abandoned
    pub sign_timeout_secs: u64,
}

impl Default for AttestationConfig {
    fn default() -> Self {
        Self {
            validity_days: 30,
            sign_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignerConfig {
    /// File holding the local HMAC signing key; generated on first use when absent
    pub key_path: Option<PathBuf>,
}

impl SignerConfig {
    pub fn resolved_key_path(&self) -> PathBuf {
        self.key_path
            .clone()
            .unwrap_or_else(|| default_config_dir().join("signer.key"))
    }
}

/// Effective configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatalicConfig {
    pub store: StoreConfig,
    pub network: NetworkConfig,
    pub attestation: AttestationConfig,
    pub signer: SignerConfig,
}

impl DatalicConfig {
    /// Load from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&default_config_path())
    }

    /// Load from `path` (defaults if it does not exist), then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_from_with(path, |name| std::env::var(name).ok())
    }

    /// `load_from` with the override lookup supplied by the caller
    pub fn load_from_with<F>(path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Loaded config from {}", path.display());
            Self::from_yaml(&text)?
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_env(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("invalid YAML: {}", e)))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply `DATALIC_*` overrides. `lookup` is injectable for tests.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(ENV_STORE_BACKEND) {
            self.store.backend = backend.parse()?;
        }
        if let Some(path) = lookup(ENV_STORE_PATH) {
            self.store.path = Some(PathBuf::from(path));
        }
        if let Some(address) = lookup(ENV_CONTRACT_ADDRESS) {
            self.network.contract_address = address;
        }
        if let Some(chain) = lookup(ENV_CHAIN_ID) {
            self.network.chain_id = chain;
        }
        if let Some(days) = lookup(ENV_VALIDITY_DAYS) {
            self.attestation.validity_days = days
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be a number, got '{}'", ENV_VALIDITY_DAYS, days)))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.attestation.validity_days == 0 {
            return Err(Error::Config("attestation.validity_days must be positive".into()));
        }
        if self.attestation.sign_timeout_secs == 0 {
            return Err(Error::Config("attestation.sign_timeout_secs must be positive".into()));
        }
        parse_chain_id(&self.network.chain_id)?;
        Ok(())
    }

    pub fn chain_id(&self) -> Result<u64> {
        parse_chain_id(&self.network.chain_id)
    }
}

/// Parse a chain id given as decimal (`11155111`) or hex (`0xaa36a7`)
pub fn parse_chain_id(raw: &str) -> Result<u64> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.map_err(|_| Error::Config(format!("invalid chain id '{}'", raw)))
}

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalic")
}

pub fn default_config_path() -> PathBuf {
    default_config_dir().join("config.yaml")
}

pub fn default_store_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("datalic")
        .join("store.db")
}
