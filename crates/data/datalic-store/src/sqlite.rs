//! SQLite backend
//!
//! One `kv` table. Batches run inside a single transaction, so the
//! record-then-index pair written by `create` lands together or not at all.

use async_trait::async_trait;
use datalic_core::{Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::KvBackend;

#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    /// Open (creating if needed) a store file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::Backend(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Backend(format!("Failed to open {}: {}", path.display(), e)))?;
        Self::init_db(&conn)?;

        tracing::info!("Opened SQLite store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Private, non-persistent store
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Backend(format!("Failed to open in-memory DB: {}", e)))?;
        Self::init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_db(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL
            );
        "#,
        )
        .map_err(|e| Error::Backend(format!("Failed to init DB: {}", e)))
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Backend("SQLite connection lock poisoned".into()))?;
            f(&mut guard).map_err(|e| Error::Backend(e.to_string()))
        })
        .await
        .map_err(|e| Error::Backend(format!("SQLite task failed: {}", e)))?
    }
}

#[async_trait]
impl KvBackend for SqliteBackend {
    async fn is_available(&self) -> bool {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .is_ok()
    }

    async fn get_data(&self, key: &str) -> Result<Vec<u8>> {
        let key = key.to_string();
        let value = self
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()
            })
            .await?;
        Ok(value.unwrap_or_default())
    }

    async fn set_data(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map(|_| ())
        })
        .await
    }

    async fn set_batch(&self, entries: Vec<(String, Vec<u8>)>) -> Result<()> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            for (key, value) in &entries {
                tx.execute(
                    "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                    params![key, value],
                )?;
            }
            tx.commit()
        })
        .await
    }
}
