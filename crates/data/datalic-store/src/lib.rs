//! datalic store
//!
//! The registry persists two kinds of JSON aggregates keyed by string: the
//! license index and one document per license. It does not care what medium
//! holds them.
//!
//! ```text
//! LicenseRegistry ──▶ RecordStore ──▶ dyn KvBackend
//!                     (typed JSON)     ├── MemoryBackend
//!                                      └── SqliteBackend
//! ```

pub mod memory;
pub mod record;
pub mod sqlite;

pub use memory::MemoryBackend;
pub use record::{RecordStore, INDEX_KEY};
pub use sqlite::SqliteBackend;

use async_trait::async_trait;
use datalic_core::Result;

/// Opaque asynchronous key-value service.
///
/// Reads of an absent key return empty bytes, not an error.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Readiness probe. Gates every registry read.
    async fn is_available(&self) -> bool;

    async fn get_data(&self, key: &str) -> Result<Vec<u8>>;

    async fn set_data(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Write several entries in order.
    ///
    /// The default writes one after another, so a failure part-way leaves
    /// the earlier entries in place. Backends with transactions override
    /// this to commit all or nothing.
    async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        for (key, value) in entries {
            self.set_data(&key, value).await?;
        }
        Ok(())
    }
}
