//! In-memory backend
//!
//! For tests and dry runs. Clones share the same map, so a test can keep a
//! handle to inspect or corrupt what the registry wrote.

use async_trait::async_trait;
use datalic_core::{Error, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;

use crate::KvBackend;

#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    /// Writes to this key fail, simulating a crash between two writes
    failing_key: Arc<Mutex<Option<String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the readiness probe
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Make every subsequent write to `key` fail
    pub fn fail_writes_to(&self, key: &str) {
        if let Ok(mut failing) = self.failing_key.lock() {
            *failing = Some(key.to_string());
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_key.lock() {
            *failing = None;
        }
    }

    /// Successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Store bytes directly, bypassing availability, failures and counters
    pub async fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.data.write().await.insert(key.to_string(), value.into());
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.data.read().await.contains_key(key)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    fn should_fail(&self, key: &str) -> bool {
        self.failing_key
            .lock()
            .map(|failing| failing.as_deref() == Some(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    async fn get_data(&self, key: &str) -> Result<Vec<u8>> {
        if !self.is_available().await {
            return Err(Error::StoreUnavailable);
        }
        Ok(self.data.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn set_data(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if !self.is_available().await {
            return Err(Error::StoreUnavailable);
        }
        if self.should_fail(key) {
            return Err(Error::Backend(format!("injected write failure for '{}'", key)));
        }
        self.data.write().await.insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
