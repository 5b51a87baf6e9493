//! # datalic core
//!
//! Shared vocabulary for the dataset-licensing registry.
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                   datalic-core                   │
//! ├──────────────────────────────────────────────────┤
//! │  license.rs  │ License, LicenseId, Category      │
//! │  codec.rs    │ FieldCodec + placeholder scheme   │
//! │  lib.rs      │ Error taxonomy, Result alias      │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! The price of a license never sits in the store as plain text. It goes
//! through a [`FieldCodec`] on the way in and only comes back out through
//! the reveal flow, after the caller has signed an attestation message.

pub mod codec;
pub mod license;

pub use codec::{FieldCodec, PlaceholderCodec, ProtectedValue, PROTECTED_PREFIX};
pub use license::{
    Category, License, LicenseDocument, LicenseDraft, LicenseId, LicenseStatus,
    RECORD_KEY_PREFIX,
};

/// Result type for datalic operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the registry stack
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Backing store is not available")]
    StoreUnavailable,

    #[error("Malformed data under '{key}': {reason}")]
    Decode { key: String, reason: String },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("License not found: {0}")]
    NotFound(String),

    #[error("License already licensed: {0}")]
    AlreadyLicensed(String),

    #[error("Signature request was rejected")]
    UserRejected,

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unknown(String),
}

impl Error {
    pub fn decode(key: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Decode {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the user declined to sign. UIs should not treat this as a failure.
    pub fn is_user_rejected(&self) -> bool {
        matches!(self, Error::UserRejected)
    }

    /// Per-record errors that a listing skips instead of surfacing.
    pub fn is_record_local(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::NotFound(_))
    }
}
