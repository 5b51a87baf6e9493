//! License records
//!
//! A license flows through two states:
//!
//! ```text
//! Available ──purchase──▶ Licensed
//! ```
//!
//! There is no way back, and records are never deleted.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::ProtectedValue;
use crate::{Error, Result};

const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

/// Store key prefix for per-license documents
pub const RECORD_KEY_PREFIX: &str = "license_";

/// Opaque, never-reused license identifier: `<unix-millis>-<base36 suffix>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LicenseId(String);

impl LicenseId {
    /// Generate a fresh identifier from the current time plus a random suffix
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
            .collect();
        Self(format!("{}-{}", chrono::Utc::now().timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of this license's document in the backing store
    pub fn record_key(&self) -> String {
        format!("{}{}", RECORD_KEY_PREFIX, self.0)
    }
}

impl From<&str> for LicenseId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LicenseId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for LicenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Dataset category. Closed set; adding one means shipping a new build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Genomics,
    Clinical,
    Imaging,
    Environmental,
    Behavioral,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Genomics,
        Category::Clinical,
        Category::Imaging,
        Category::Environmental,
        Category::Behavioral,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Genomics => "Genomics",
            Category::Clinical => "Clinical",
            Category::Imaging => "Imaging",
            Category::Environmental => "Environmental",
            Category::Behavioral => "Behavioral",
        }
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::Genomics
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                Error::Validation(format!(
                    "unknown category '{}' (expected one of: {})",
                    s,
                    Category::ALL.map(|c| c.name()).join(", ")
                ))
            })
    }
}

/// Availability as shown to buyers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseStatus {
    Available,
    Licensed,
}

impl fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LicenseStatus::Available => f.write_str("Available"),
            LicenseStatus::Licensed => f.write_str("Licensed"),
        }
    }
}

/// Stored JSON shape of a license.
///
/// Field names are a wire contract shared with other clients of the same
/// store. Fields this build does not know about are carried in `extra` so
/// a read-modify-write never drops them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseDocument {
    pub dataset_name: String,
    pub price: ProtectedValue,
    pub duration: u32,
    pub owner: String,
    pub category: Category,
    pub is_available: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A license as listed by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    pub dataset_name: String,
    /// Codec output; reveal goes through the signature flow
    pub protected_price: ProtectedValue,
    pub duration_days: u32,
    pub owner: String,
    pub category: Category,
    pub is_available: bool,
}

impl License {
    pub fn from_document(id: LicenseId, doc: LicenseDocument) -> Self {
        Self {
            id,
            dataset_name: doc.dataset_name,
            protected_price: doc.price,
            duration_days: doc.duration,
            owner: doc.owner,
            category: doc.category,
            is_available: doc.is_available,
        }
    }

    pub fn to_document(&self) -> LicenseDocument {
        LicenseDocument {
            dataset_name: self.dataset_name.clone(),
            price: self.protected_price.clone(),
            duration: self.duration_days,
            owner: self.owner.clone(),
            category: self.category,
            is_available: self.is_available,
            extra: serde_json::Map::new(),
        }
    }

    pub fn status(&self) -> LicenseStatus {
        if self.is_available {
            LicenseStatus::Available
        } else {
            LicenseStatus::Licensed
        }
    }
}

/// Creation request. The price is plain here and protected by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseDraft {
    pub dataset_name: String,
    pub price: f64,
    pub duration_days: u32,
    pub category: Category,
    pub owner: String,
}

impl LicenseDraft {
    /// Reject drafts that must not reach the store.
    ///
    /// A price of zero counts as missing.
    pub fn validate(&self) -> Result<()> {
        if self.dataset_name.trim().is_empty() {
            return Err(Error::Validation("dataset name is required".into()));
        }
        if self.price == 0.0 {
            return Err(Error::Validation("price is required".into()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(Error::Validation(format!(
                "price must be a finite non-negative number, got {}",
                self.price
            )));
        }
        if self.duration_days == 0 {
            return Err(Error::Validation("duration must be at least one day".into()));
        }
        if self.owner.trim().is_empty() {
            return Err(Error::Validation("owner account is required".into()));
        }
        Ok(())
    }
}
