//! License Registry
//!
//! Keeps an ordered index of license ids plus one JSON document per id.
//!
//! ```text
//! "license_keys"        ["1718000000000-k3x9a1b", "1718000000450-p0q2zzc", ...]
//! "license_<id>"        {"datasetName": ..., "price": "FHE-...", ...}
//! ```
//!
//! The index is authoritative for enumeration. A document that is not in
//! the index is an orphan and is never listed. An index entry must never
//! point at a document that was not written, so `create` writes the
//! document before the index entry that references it.
//!
//! Read-modify-write of the index and of a document is serialized per
//! registry instance. Separate instances (or processes) sharing one store
//! are last-write-wins.

pub mod listing;

pub use listing::{Listing, ListingQuery, RegistryStats, SkippedRecord};

use datalic_core::{
    Error, FieldCodec, License, LicenseDocument, LicenseDraft, LicenseId, PlaceholderCodec, Result,
};
use datalic_store::record::encode;
use datalic_store::{KvBackend, RecordStore, INDEX_KEY};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Attempts at finding an id that is not already taken
const MAX_ID_ATTEMPTS: usize = 8;

pub struct LicenseRegistry {
    store: RecordStore,
    codec: Arc<dyn FieldCodec>,
    writer: Mutex<()>,
}

impl LicenseRegistry {
    /// Registry with the placeholder price codec
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self::with_codec(backend, Arc::new(PlaceholderCodec::new()))
    }

    pub fn with_codec(backend: Arc<dyn KvBackend>, codec: Arc<dyn FieldCodec>) -> Self {
        Self {
            store: RecordStore::new(backend),
            codec,
            writer: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn codec(&self) -> Arc<dyn FieldCodec> {
        Arc::clone(&self.codec)
    }

    /// Read every indexed license, collecting the ones that could not be read.
    ///
    /// An unavailable store yields an empty listing. A malformed index is
    /// treated as empty. Licenses come back longest duration first; equal
    /// durations keep index order.
    pub async fn scan(&self) -> Result<Listing> {
        if !self.store.is_ready().await {
            tracing::warn!("Store unavailable, listing nothing");
            return Ok(Listing::default());
        }

        let ids = match self.store.read_index().await {
            Ok(ids) => ids,
            Err(Error::StoreUnavailable) => {
                tracing::warn!("Store went away while reading the index");
                return Ok(Listing::default());
            }
            Err(e @ Error::Decode { .. }) => {
                tracing::warn!("Ignoring unreadable license index: {}", e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut listing = Listing::default();
        let mut seen = HashSet::with_capacity(ids.len());

        for id in ids {
            if !seen.insert(id.clone()) {
                tracing::debug!("Duplicate index entry {}", id);
                continue;
            }

            match self.store.get_json::<LicenseDocument>(&id.record_key()).await {
                Ok(Some(doc)) => listing.licenses.push(License::from_document(id, doc)),
                Ok(None) => {
                    tracing::warn!("Index references missing license {}", id);
                    let reason = Error::NotFound(id.to_string());
                    listing.skipped.push(SkippedRecord { id, reason });
                }
                Err(reason) => {
                    tracing::warn!("Skipping license {}: {}", id, reason);
                    listing.skipped.push(SkippedRecord { id, reason });
                }
            }
        }

        // stable: ties stay in index order
        listing
            .licenses
            .sort_by(|a, b| b.duration_days.cmp(&a.duration_days));

        tracing::debug!(
            "Listed {} licenses ({} skipped)",
            listing.licenses.len(),
            listing.skipped.len()
        );
        Ok(listing)
    }

    /// Readable licenses, longest duration first
    pub async fn list_all(&self) -> Result<Vec<License>> {
        Ok(self.scan().await?.licenses)
    }

    /// `list_all` narrowed by name search and category
    pub async fn search(&self, query: &ListingQuery) -> Result<Vec<License>> {
        Ok(query.apply(self.list_all().await?))
    }

    pub async fn stats(&self) -> Result<RegistryStats> {
        Ok(RegistryStats::from_licenses(&self.list_all().await?))
    }

    /// Fetch one license by id
    pub async fn get(&self, id: &LicenseId) -> Result<License> {
        let doc: LicenseDocument = self
            .store
            .get_json(&id.record_key())
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(License::from_document(id.clone(), doc))
    }

    /// List a new dataset license and return its id.
    ///
    /// Validation happens before anything is written. The price is stored
    /// only in protected form.
    pub async fn create(&self, draft: LicenseDraft) -> Result<LicenseId> {
        draft.validate()?;
        let price = self.codec.protect(draft.price)?;

        let _writer = self.writer.lock().await;

        if !self.store.is_ready().await {
            return Err(Error::StoreUnavailable);
        }

        // A malformed index aborts here rather than being overwritten with [id]
        let mut index = self.store.read_index().await?;
        let id = self.fresh_id(&index).await?;
        let key = id.record_key();

        let doc = LicenseDocument {
            dataset_name: draft.dataset_name,
            price,
            duration: draft.duration_days,
            owner: draft.owner,
            category: draft.category,
            is_available: true,
            extra: serde_json::Map::new(),
        };
        let record_bytes = encode(&key, &doc)?;

        if !index.contains(&id) {
            index.push(id.clone());
        }
        let index_bytes = encode(INDEX_KEY, &index)?;

        // Record first, then the index entry that points at it
        self.store
            .put_batch(vec![(key, record_bytes), (INDEX_KEY.to_string(), index_bytes)])
            .await?;

        tracing::info!("Created license {} ({} indexed)", id, index.len());
        Ok(id)
    }

    /// Mark a license as licensed.
    ///
    /// Fails with `NotFound` for an unknown id and `AlreadyLicensed` when it
    /// was purchased before; neither case writes anything. Every other field
    /// of the stored document is written back unchanged.
    pub async fn purchase(&self, id: &LicenseId) -> Result<()> {
        let _writer = self.writer.lock().await;

        let key = id.record_key();
        let mut doc: LicenseDocument = self
            .store
            .get_json(&key)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if !doc.is_available {
            return Err(Error::AlreadyLicensed(id.to_string()));
        }

        doc.is_available = false;
        self.store.put_json(&key, &doc).await?;

        tracing::info!("Licensed {}", id);
        Ok(())
    }

    async fn fresh_id(&self, index: &[LicenseId]) -> Result<LicenseId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = LicenseId::generate();
            if index.contains(&id) {
                continue;
            }
            if !self.store.backend().get_data(&id.record_key()).await?.is_empty() {
                tracing::debug!("Generated id {} already has a record, retrying", id);
                continue;
            }
            return Ok(id);
        }
        Err(Error::Unknown("could not allocate a fresh license id".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalic_core::Category;
    use datalic_store::{MemoryBackend, SqliteBackend};

    fn draft(name: &str, duration_days: u32) -> LicenseDraft {
        LicenseDraft {
            dataset_name: name.to_string(),
            price: 5.0,
            duration_days,
            category: Category::Genomics,
            owner: "0xowner".into(),
        }
    }

    fn registry() -> (LicenseRegistry, MemoryBackend) {
        let backend = MemoryBackend::new();
        (LicenseRegistry::new(Arc::new(backend.clone())), backend)
    }

    fn durations(licenses: &[License]) -> Vec<u32> {
        licenses.iter().map(|l| l.duration_days).collect()
    }

    #[tokio::test]
    async fn test_empty_store_lists_nothing() {
        let (registry, _) = registry();
        assert!(registry.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let (registry, backend) = registry();
        let id = registry.create(draft("Gut microbiome", 30)).await.unwrap();

        let licenses = registry.list_all().await.unwrap();
        assert_eq!(licenses.len(), 1);
        let license = &licenses[0];
        assert_eq!(license.id, id);
        assert_eq!(license.dataset_name, "Gut microbiome");
        assert_eq!(license.owner, "0xowner");
        assert!(license.is_available);
        assert!(license.protected_price.is_tagged());
        assert_eq!(registry.codec().reveal(&license.protected_price).unwrap(), 5.0);

        // the stored price is never plain text
        let raw = backend.get_data(&id.record_key()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_ne!(json["price"], "5");
        assert_eq!(json["isAvailable"], true);
    }

    #[tokio::test]
    async fn test_list_orders_by_duration_descending() {
        let (registry, _) = registry();
        for days in [5, 30, 10] {
            registry.create(draft("d", days)).await.unwrap();
        }
        assert_eq!(durations(&registry.list_all().await.unwrap()), vec![30, 10, 5]);
    }

    #[tokio::test]
    async fn test_equal_durations_keep_index_order() {
        let (registry, _) = registry();
        let first = registry.create(draft("first", 10)).await.unwrap();
        let second = registry.create(draft("second", 10)).await.unwrap();
        let longest = registry.create(draft("longest", 20)).await.unwrap();

        let ids: Vec<_> = registry
            .list_all()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec![longest, first, second]);
    }

    #[tokio::test]
    async fn test_index_tracks_every_create() {
        let (registry, _) = registry();
        let mut created = Vec::new();
        for i in 0..5 {
            created.push(registry.create(draft(&format!("set {i}"), 7)).await.unwrap());
        }

        assert_eq!(registry.store().read_index().await.unwrap(), created);

        let mut listed: Vec<_> = registry.list_all().await.unwrap().into_iter().map(|l| l.id).collect();
        let mut expected = created.clone();
        listed.sort();
        expected.sort();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_validation_rejects_without_writing() {
        let (registry, backend) = registry();

        let mut no_name = draft("", 30);
        no_name.price = 5.0;
        assert!(matches!(registry.create(no_name).await, Err(Error::Validation(_))));

        let mut zero_price = draft("X", 30);
        zero_price.price = 0.0;
        assert!(matches!(registry.create(zero_price).await, Err(Error::Validation(_))));

        assert_eq!(backend.write_count(), 0);
        assert!(backend.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_orphan_record_is_not_listed() {
        let (registry, backend) = registry();
        let id = registry.create(draft("indexed", 30)).await.unwrap();
        backend
            .insert_raw(
                "license_orphan",
                r#"{"datasetName":"orphan","price":"FHE-MQ==","duration":99,"owner":"0x1","category":"Clinical","isAvailable":true}"#,
            )
            .await;

        let licenses = registry.list_all().await.unwrap();
        assert_eq!(licenses.len(), 1);
        assert_eq!(licenses[0].id, id);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_skipped() {
        let (registry, backend) = registry();
        let a = registry.create(draft("a", 3)).await.unwrap();
        let b = registry.create(draft("b", 2)).await.unwrap();
        let c = registry.create(draft("c", 1)).await.unwrap();

        backend.insert_raw(&b.record_key(), "{\"datasetName\": ").await;

        let listing = registry.scan().await.unwrap();
        let ids: Vec<_> = listing.licenses.iter().map(|l| l.id.clone()).collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(listing.skipped.len(), 1);
        assert_eq!(listing.skipped[0].id, b);
        assert!(matches!(listing.skipped[0].reason, Error::Decode { .. }));
    }

    #[tokio::test]
    async fn test_missing_record_is_skipped() {
        let (registry, backend) = registry();
        let kept = registry.create(draft("kept", 3)).await.unwrap();
        let mut index = registry.store().read_index().await.unwrap();
        index.push(LicenseId::from("0-ghost00"));
        registry.store().write_index(&index).await.unwrap();

        let listing = registry.scan().await.unwrap();
        assert_eq!(listing.licenses.len(), 1);
        assert_eq!(listing.licenses[0].id, kept);
        assert_eq!(listing.skipped[0].reason, Error::NotFound("0-ghost00".into()));
        assert!(backend.contains(&kept.record_key()).await);
    }

    #[tokio::test]
    async fn test_unknown_category_is_skipped() {
        let (registry, backend) = registry();
        backend
            .insert_raw(
                "license_1-x",
                r#"{"datasetName":"stars","price":"1","duration":1,"owner":"0x1","category":"Astronomy","isAvailable":true}"#,
            )
            .await;
        backend.insert_raw(INDEX_KEY, r#"["1-x"]"#).await;

        let listing = registry.scan().await.unwrap();
        assert!(listing.licenses.is_empty());
        assert_eq!(listing.skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_index_entries_listed_once() {
        let (registry, backend) = registry();
        let id = registry.create(draft("once", 3)).await.unwrap();
        backend
            .insert_raw(INDEX_KEY, format!(r#"["{id}","{id}"]"#))
            .await;
        assert_eq!(registry.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_lists_empty() {
        let (registry, backend) = registry();
        registry.create(draft("hidden", 3)).await.unwrap();
        backend.set_available(false);

        assert!(registry.list_all().await.unwrap().is_empty());
        assert!(matches!(
            registry.create(draft("later", 3)).await,
            Err(Error::StoreUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_malformed_index_lists_empty_and_blocks_create() {
        let (registry, backend) = registry();
        backend.insert_raw(INDEX_KEY, "not json").await;

        assert!(registry.list_all().await.unwrap().is_empty());

        let before = backend.write_count();
        assert!(matches!(
            registry.create(draft("x", 3)).await,
            Err(Error::Decode { .. })
        ));
        assert_eq!(backend.write_count(), before);
    }

    #[tokio::test]
    async fn test_failed_index_write_leaves_orphan_not_dangling_entry() {
        let (registry, backend) = registry();
        let kept = registry.create(draft("kept", 3)).await.unwrap();

        backend.fail_writes_to(INDEX_KEY);
        let err = registry.create(draft("lost", 9)).await.unwrap_err();
        assert!(matches!(err, Error::Backend(_)));

        // one orphan document was written, the index still lists only `kept`
        let keys = backend.keys().await;
        assert_eq!(keys.iter().filter(|k| k.starts_with("license_") && *k != INDEX_KEY).count(), 2);
        assert_eq!(registry.store().read_index().await.unwrap(), vec![kept.clone()]);

        let listed: Vec<_> = registry.list_all().await.unwrap().into_iter().map(|l| l.id).collect();
        assert_eq!(listed, vec![kept]);
    }

    #[tokio::test]
    async fn test_purchase_transitions_once() {
        let (registry, _) = registry();
        let id = registry.create(draft("clinical trial", 60)).await.unwrap();

        registry.purchase(&id).await.unwrap();
        let license = registry.get(&id).await.unwrap();
        assert!(!license.is_available);
        assert_eq!(license.dataset_name, "clinical trial");
        assert_eq!(license.duration_days, 60);

        assert_eq!(
            registry.purchase(&id).await,
            Err(Error::AlreadyLicensed(id.to_string()))
        );
        assert!(!registry.get(&id).await.unwrap().is_available);
    }

    #[tokio::test]
    async fn test_second_purchase_writes_nothing() {
        let (registry, backend) = registry();
        let id = registry.create(draft("x", 1)).await.unwrap();
        registry.purchase(&id).await.unwrap();

        let before = backend.write_count();
        let _ = registry.purchase(&id).await;
        assert_eq!(backend.write_count(), before);
    }

    #[tokio::test]
    async fn test_purchase_unknown_id() {
        let (registry, _) = registry();
        let id = LicenseId::from("404-missing");
        assert_eq!(registry.purchase(&id).await, Err(Error::NotFound(id.to_string())));
        assert_eq!(registry.get(&id).await, Err(Error::NotFound(id.to_string())));
    }

    #[tokio::test]
    async fn test_purchase_preserves_other_fields() {
        let (registry, backend) = registry();
        backend
            .insert_raw(
                "license_7-legacy",
                r#"{"datasetName":"EEG","price":"12","duration":14,"owner":"0x9","category":"Behavioral","isAvailable":true,"tokenId":"nft-1"}"#,
            )
            .await;
        backend.insert_raw(INDEX_KEY, r#"["7-legacy"]"#).await;

        registry.purchase(&LicenseId::from("7-legacy")).await.unwrap();

        let raw = backend.get_data("license_7-legacy").await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        assert_eq!(json["isAvailable"], false);
        assert_eq!(json["tokenId"], "nft-1");
        assert_eq!(json["price"], "12");
        assert_eq!(json["owner"], "0x9");
    }

    #[tokio::test]
    async fn test_search_and_stats() {
        let (registry, _) = registry();
        let mut imaging = draft("Brain MRI", 30);
        imaging.category = Category::Imaging;
        let mri = registry.create(imaging).await.unwrap();
        registry.create(draft("Exome panel", 10)).await.unwrap();
        registry.purchase(&mri).await.unwrap();

        let hits = registry
            .search(&ListingQuery::new().search("mri"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, mri);

        let genomics = registry
            .search(&ListingQuery::new().category(Category::Genomics))
            .await
            .unwrap();
        assert_eq!(genomics.len(), 1);
        assert_eq!(genomics[0].dataset_name, "Exome panel");

        let stats = registry.stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.available, 1);
        assert_eq!(stats.licensed, 1);
        assert_eq!(stats.categories, Category::ALL.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creates_lose_no_index_entries() {
        let registry = Arc::new(registry().0);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.create(draft(&format!("set {i}"), i + 1)).await })
            })
            .collect();

        let mut created = HashSet::new();
        for handle in handles {
            created.insert(handle.await.unwrap().unwrap());
        }

        let index = registry.store().read_index().await.unwrap();
        assert_eq!(index.len(), 20);
        assert_eq!(index.into_iter().collect::<HashSet<_>>(), created);
        assert_eq!(registry.list_all().await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_sqlite_backed_registry() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let registry = LicenseRegistry::new(Arc::new(backend));

        let short = registry.create(draft("short", 5)).await.unwrap();
        let long = registry.create(draft("long", 50)).await.unwrap();
        registry.purchase(&short).await.unwrap();

        let licenses = registry.list_all().await.unwrap();
        assert_eq!(licenses.len(), 2);
        assert_eq!(licenses[0].id, long);
        assert!(!licenses[1].is_available);
    }
}
