//! Session attestation parameters
//!
//! Built once when a session starts, handed to the reveal flow, never
//! persisted. The message they render is what the wallet signs, and the
//! exact text is a compatibility surface: relying parties re-build it to
//! verify signatures, so labels, order and separators must not drift.

use async_trait::async_trait;
use datalic_core::Result;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Bytes of random public key material (rendered as twice as many hex digits)
const PUBLIC_KEY_BYTES: usize = 1000;

const SECONDS_PER_DAY: i64 = 86_400;

/// Read-only network facts resolved at startup
#[async_trait]
pub trait NetworkSession: Send + Sync {
    /// Address of the registry contract/service
    async fn contract_address(&self) -> Result<String>;

    async fn chain_id(&self) -> Result<u64>;
}

/// Network facts known ahead of time (configuration, tests)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticNetwork {
    pub contract_address: String,
    pub chain_id: u64,
}

impl StaticNetwork {
    pub fn new(contract_address: impl Into<String>, chain_id: u64) -> Self {
        Self {
            contract_address: contract_address.into(),
            chain_id,
        }
    }
}

#[async_trait]
impl NetworkSession for StaticNetwork {
    async fn contract_address(&self) -> Result<String> {
        Ok(self.contract_address.clone())
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.chain_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationParams {
    pub public_key: String,
    pub contract_address: String,
    pub chain_id: u64,
    /// Unix seconds
    pub start_timestamp: i64,
    pub duration_days: u32,
}

impl AttestationParams {
    /// Resolve network facts and start a session now with fresh key material
    pub async fn establish(network: &dyn NetworkSession, duration_days: u32) -> Result<Self> {
        let contract_address = network.contract_address().await?;
        let chain_id = network.chain_id().await?;

        let params = Self {
            public_key: generate_public_key(),
            contract_address,
            chain_id,
            start_timestamp: chrono::Utc::now().timestamp(),
            duration_days,
        };
        tracing::debug!(
            "Attestation session on chain {} for {} days",
            params.chain_id,
            params.duration_days
        );
        Ok(params)
    }

    /// The text handed to the signer
    pub fn message(&self) -> String {
        format!(
            "publickey:{}\ncontractAddresses:{}\ncontractsChainId:{}\nstartTimestamp:{}\ndurationDays:{}",
            self.public_key,
            self.contract_address,
            self.chain_id,
            self.start_timestamp,
            self.duration_days
        )
    }

    /// Unix seconds at which the validity window closes
    pub fn expires_at(&self) -> i64 {
        self.start_timestamp + i64::from(self.duration_days) * SECONDS_PER_DAY
    }
}

/// `0x` followed by 2000 random lowercase hex digits
pub fn generate_public_key() -> String {
    let mut bytes = vec![0u8; PUBLIC_KEY_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}
