//! Typed JSON access over a [`KvBackend`].
//!
//! Values are UTF-8 JSON text. An empty value means "absent". A value that
//! does not parse is reported as [`Error::Decode`] naming the key, so the
//! caller can skip that one record and keep going.

use datalic_core::{Error, LicenseId, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

use crate::KvBackend;

/// Well-known key of the ordered license index
pub const INDEX_KEY: &str = "license_keys";

#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn KvBackend>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn KvBackend> {
        &self.backend
    }

    pub async fn is_ready(&self) -> bool {
        self.backend.is_available().await
    }

    /// `Ok(None)` when the key is absent
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let bytes = self.backend.get_data(key).await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        decode(key, &bytes).map(Some)
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = encode(key, value)?;
        self.backend.set_data(key, bytes).await
    }

    /// Write already-encoded entries in order, atomically if the backend can
    pub async fn put_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.backend.set_batch(entries).await
    }

    /// The ordered index. Absent or blank means empty.
    pub async fn read_index(&self) -> Result<Vec<LicenseId>> {
        let bytes = self.backend.get_data(INDEX_KEY).await?;
        let text = std::str::from_utf8(&bytes)
            .map_err(|_| Error::decode(INDEX_KEY, "value is not UTF-8"))?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(text).map_err(|e| Error::decode(INDEX_KEY, e))
    }

    pub async fn write_index(&self, ids: &[LicenseId]) -> Result<()> {
        self.put_json(INDEX_KEY, ids).await
    }
}

/// Serialize `value` as UTF-8 JSON bytes
pub fn encode<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Unknown(format!("Failed to encode '{}': {}", key, e)))
}

pub fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T> {
    let text = std::str::from_utf8(bytes).map_err(|_| Error::decode(key, "value is not UTF-8"))?;
    serde_json::from_str(text).map_err(|e| Error::decode(key, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Doc {
        name: String,
    }

    fn store() -> (RecordStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        (RecordStore::new(Arc::new(backend.clone())), backend)
    }

    #[tokio::test]
    async fn test_absent_is_none() {
        let (store, _) = store();
        let doc: Option<Doc> = store.get_json("license_x").await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn test_put_get_json() {
        let (store, backend) = store();
        store.put_json("license_x", &Doc { name: "a".into() }).await.unwrap();

        let raw = backend.get_data("license_x").await.unwrap();
        assert_eq!(raw, br#"{"name":"a"}"#);

        let doc: Option<Doc> = store.get_json("license_x").await.unwrap();
        assert_eq!(doc, Some(Doc { name: "a".into() }));
    }

    #[tokio::test]
    async fn test_malformed_json_names_key() {
        let (store, backend) = store();
        backend.insert_raw("license_bad", "{not json").await;

        let err = store.get_json::<Doc>("license_bad").await.unwrap_err();
        match err {
            Error::Decode { key, .. } => assert_eq!(key, "license_bad"),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_utf8_is_decode_error() {
        let (store, backend) = store();
        backend.insert_raw("license_bin", vec![0xff, 0xfe]).await;
        assert!(matches!(
            store.get_json::<Doc>("license_bin").await,
            Err(Error::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_index_roundtrip_and_blank() {
        let (store, backend) = store();
        assert!(store.read_index().await.unwrap().is_empty());

        backend.insert_raw(INDEX_KEY, "   ").await;
        assert!(store.read_index().await.unwrap().is_empty());

        let ids = vec![LicenseId::from("1-a"), LicenseId::from("2-b")];
        store.write_index(&ids).await.unwrap();
        assert_eq!(backend.get_data(INDEX_KEY).await.unwrap(), br#"["1-a","2-b"]"#);
        assert_eq!(store.read_index().await.unwrap(), ids);
    }

    #[tokio::test]
    async fn test_malformed_index() {
        let (store, backend) = store();
        backend.insert_raw(INDEX_KEY, r#"{"oops": true}"#).await;
        assert!(matches!(store.read_index().await, Err(Error::Decode { .. })));
    }

    #[tokio::test]
    async fn test_readiness_follows_backend() {
        let (store, backend) = store();
        assert!(store.is_ready().await);
        backend.set_available(false);
        assert!(!store.is_ready().await);
    }
}
