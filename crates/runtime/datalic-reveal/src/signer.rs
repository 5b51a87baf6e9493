//! Signing boundary
//!
//! The reveal flow never signs anything itself. It asks a [`MessageSigner`]
//! (a wallet, a hardware device, a prompt in front of a local key) and
//! only proceeds on success. A signer that is declined must answer
//! [`Error::UserRejected`], not a generic failure.

use async_trait::async_trait;
use datalic_core::{Error, Result};
use hmac::{digest::KeyInit, Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

const LOCAL_KEY_BYTES: usize = 32;

/// Hex signature as returned by the signer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(String);

impl Signature {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
pub trait MessageSigner: Send + Sync {
    /// Sign `message`. May suspend for as long as the user takes to decide.
    async fn sign_message(&self, message: &str) -> Result<Signature>;
}

/// Local HMAC-SHA256 signer for development and the CLI
pub struct HmacSigner {
    key: Vec<u8>,
}

impl HmacSigner {
    pub fn new(key: impl Into<Vec<u8>>) -> Self {
        Self { key: key.into() }
    }

    /// Signer with a fresh random key
    pub fn random() -> Self {
        let mut key = vec![0u8; LOCAL_KEY_BYTES];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Read a hex key from `path`, creating one there if it does not exist yet
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
            let key = hex::decode(text.trim())
                .map_err(|e| Error::Config(format!("{}: invalid signer key: {}", path.display(), e)))?;
            if key.is_empty() {
                return Err(Error::Config(format!("{}: signer key is empty", path.display())));
            }
            return Ok(Self { key });
        }

        let signer = Self::random();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("{}: {}", parent.display(), e)))?;
        }
        std::fs::write(path, hex::encode(&signer.key))
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        tracing::info!("Created local signer key at {}", path.display());
        Ok(signer)
    }

    fn mac(&self) -> Result<HmacSha256> {
        <HmacSha256 as KeyInit>::new_from_slice(&self.key)
            .map_err(|e| Error::Unknown(format!("HMAC key rejected: {}", e)))
    }

    pub fn sign(&self, message: &str) -> Result<Signature> {
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        Ok(Signature(format!("0x{}", hex::encode(mac.finalize().into_bytes()))))
    }

    /// Constant-time check of a signature produced by this key
    pub fn verify(&self, message: &str, signature: &Signature) -> bool {
        let Some(hex_part) = signature.as_str().strip_prefix("0x") else {
            return false;
        };
        let Ok(bytes) = hex::decode(hex_part) else {
            return false;
        };
        match self.mac() {
            Ok(mut mac) => {
                mac.update(message.as_bytes());
                mac.verify_slice(&bytes).is_ok()
            }
            Err(_) => false,
        }
    }
}

#[async_trait]
impl MessageSigner for HmacSigner {
    async fn sign_message(&self, message: &str) -> Result<Signature> {
        self.sign(message)
    }
}
