//! Protected Field Codec
//!
//! A reversible transform for numeric fields that must not sit in the store
//! as plain text.
//!
//! ```text
//! protect(12.5)  ->  "FHE-MTIuNQ=="
//! reveal("FHE-MTIuNQ==")  ->  12.5
//! reveal("12.5")          ->  12.5   (legacy, untagged)
//! ```
//!
//! [`PlaceholderCodec`] is NOT encryption. It only fixes the shape of the
//! protocol: what gets protected, when, and where reveal happens. A real
//! homomorphic or threshold scheme plugs in behind [`FieldCodec`] without
//! touching the registry or the reveal flow.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Marks codec output so it can be told apart from a plain numeric string
pub const PROTECTED_PREFIX: &str = "FHE-";

/// Opaque codec output as stored in a record's `price` field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectedValue(String);

impl ProtectedValue {
    /// Wrap a stored string without checking it. Reveal decides whether it is readable.
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this value carries the codec tag
    pub fn is_tagged(&self) -> bool {
        self.0.starts_with(PROTECTED_PREFIX)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for ProtectedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reversible transform applied before storage and after authorized reveal.
///
/// Implementations must satisfy `reveal(protect(x)) == x` for every finite,
/// non-negative `x`.
pub trait FieldCodec: Send + Sync {
    fn protect(&self, value: f64) -> Result<ProtectedValue>;

    fn reveal(&self, value: &ProtectedValue) -> Result<f64>;
}

/// `"FHE-" + base64(decimal)`
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderCodec;

impl PlaceholderCodec {
    pub fn new() -> Self {
        Self
    }
}

impl FieldCodec for PlaceholderCodec {
    fn protect(&self, value: f64) -> Result<ProtectedValue> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::Validation(format!(
                "protected value must be finite and non-negative, got {}",
                value
            )));
        }
        // -0.0 would otherwise encode as "-0"
        let value = if value == 0.0 { 0.0 } else { value };

        // f64 Display is the shortest string that parses back to the same bits
        let encoded = STANDARD.encode(value.to_string());
        Ok(ProtectedValue(format!("{}{}", PROTECTED_PREFIX, encoded)))
    }

    fn reveal(&self, value: &ProtectedValue) -> Result<f64> {
        match value.as_str().strip_prefix(PROTECTED_PREFIX) {
            Some(payload) => {
                let bytes = STANDARD
                    .decode(payload)
                    .map_err(|e| Error::decode("price", format!("bad base64 payload: {}", e)))?;
                let text = String::from_utf8(bytes)
                    .map_err(|_| Error::decode("price", "payload is not UTF-8"))?;
                parse_number(&text)
            }
            None => parse_number(value.as_str()),
        }
    }
}

fn parse_number(text: &str) -> Result<f64> {
    let parsed: f64 = text
        .trim()
        .parse()
        .map_err(|_| Error::decode("price", format!("not a number: {:?}", text)))?;
    if !parsed.is_finite() {
        return Err(Error::decode("price", format!("not a finite number: {:?}", text)));
    }
    Ok(parsed)
}
