//! Reveal Authorization Flow
//!
//! ```text
//! AttestationParams ──message()──▶ MessageSigner ──ok──▶ FieldCodec::reveal ──▶ f64
//!                                        │
//!                                        └─declined / abandoned──▶ Error::UserRejected
//! ```
//!
//! Every reveal re-signs. Neither the signature nor the plaintext is kept,
//! so a declined or abandoned request can simply be retried from the top.

pub mod attestation;
pub mod signer;

pub use attestation::{generate_public_key, AttestationParams, NetworkSession, StaticNetwork};
pub use signer::{HmacSigner, MessageSigner, Signature};

use datalic_core::{Error, FieldCodec, License, ProtectedValue, Result};
use std::sync::Arc;
use std::time::Duration;

/// Reveal flow bound to one session
pub struct RevealFlow {
    params: AttestationParams,
    codec: Arc<dyn FieldCodec>,
    sign_timeout: Option<Duration>,
}

impl RevealFlow {
    pub fn new(params: AttestationParams, codec: Arc<dyn FieldCodec>) -> Self {
        Self {
            params,
            codec,
            sign_timeout: None,
        }
    }

    /// Give up on a signature request after `timeout` and report it as rejected
    pub fn with_sign_timeout(mut self, timeout: Duration) -> Self {
        self.sign_timeout = Some(timeout);
        self
    }

    pub fn params(&self) -> &AttestationParams {
        &self.params
    }

    pub fn message(&self) -> String {
        self.params.message()
    }

    /// Steps 1 and 2: build the message and get it signed
    pub async fn authorize(&self, signer: &dyn MessageSigner) -> Result<Signature> {
        let message = self.params.message();
        let signing = signer.sign_message(&message);

        let outcome = match self.sign_timeout {
            Some(limit) => match tokio::time::timeout(limit, signing).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!("Signature request abandoned after {:?}", limit);
                    return Err(Error::UserRejected);
                }
            },
            None => signing.await,
        };

        match outcome {
            Ok(signature) => Ok(signature),
            Err(Error::UserRejected) => {
                tracing::info!("Signature request declined");
                Err(Error::UserRejected)
            }
            Err(e) => {
                tracing::warn!("Signing failed: {}", e);
                Err(e)
            }
        }
    }

    /// Sign, then reveal. Nothing is cached between calls.
    pub async fn reveal(&self, value: &ProtectedValue, signer: &dyn MessageSigner) -> Result<f64> {
        self.authorize(signer).await?;
        self.codec.reveal(value)
    }

    /// Reveal a license's price
    pub async fn reveal_license(&self, license: &License, signer: &dyn MessageSigner) -> Result<f64> {
        self.reveal(&license.protected_price, signer).await
    }
}
