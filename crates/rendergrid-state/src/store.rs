//! StateStore: redb-backed registry for RenderGrid.
//!
//! Typed CRUD over workers, sites and render records. Values are JSON
//! documents in `&[u8]` columns. The store runs on disk or, for tests,
//! fully in memory.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome<T> {
    /// The key was free and the record was written.
    Inserted,
    /// Another writer got there first; this is what it stored.
    Existing(T),
}

/// Thread-safe registry backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent registry at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(map_err!(Open))?;
        }
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "registry opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory registry.
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory registry opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKERS).map_err(map_err!(Table))?;
        txn.open_table(SITES).map_err(map_err!(Table))?;
        txn.open_table(RENDERS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic helpers ────────────────────────────────────────────

    fn put<T: Serialize>(&self, table: Table, key: &str, value: &T) -> StateResult<()> {
        let bytes = encode(key, value)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            t.insert(key, bytes.as_slice()).map_err(map_err!(Storage))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        match t.get(key).map_err(map_err!(Storage))? {
            Some(guard) => Ok(Some(decode(key, guard.value())?)),
            None => Ok(None),
        }
    }

    fn scan<T: DeserializeOwned>(&self, table: Table, prefix: &str) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let t = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in t.iter().map_err(map_err!(Storage))? {
            let (key, value) = entry.map_err(map_err!(Storage))?;
            if key.value().starts_with(prefix) {
                results.push(decode(key.value(), value.value())?);
            }
        }
        Ok(results)
    }

    fn remove(&self, table: Table, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut t = txn.open_table(table).map_err(map_err!(Table))?;
            existed = t.remove(key).map_err(map_err!(Storage))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }

    // ── Workers ────────────────────────────────────────────────────

    /// Insert a worker unless one already exists under the same key.
    ///
    /// The check and the insert share one write transaction; redb
    /// serialises writers, so exactly one concurrent caller sees
    /// `Inserted`.
    pub fn put_worker_if_absent(
        &self,
        worker: &DeployedWorker,
    ) -> StateResult<InsertOutcome<DeployedWorker>> {
        let key = worker.table_key();
        let bytes = encode(&key, worker)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existing = {
            let mut t = txn.open_table(WORKERS).map_err(map_err!(Table))?;
            let current = match t.get(key.as_str()).map_err(map_err!(Storage))? {
                Some(guard) => Some(decode::<DeployedWorker>(&key, guard.value())?),
                None => None,
            };
            if current.is_none() {
                t.insert(key.as_str(), bytes.as_slice())
                    .map_err(map_err!(Storage))?;
            }
            current
        };
        txn.commit().map_err(map_err!(Transaction))?;
        match existing {
            Some(found) => {
                debug!(%key, "worker already registered");
                Ok(InsertOutcome::Existing(found))
            }
            None => {
                debug!(%key, "worker registered");
                Ok(InsertOutcome::Inserted)
            }
        }
    }

    pub fn get_worker(&self, region: &str, name: &str) -> StateResult<Option<DeployedWorker>> {
        self.get(WORKERS, &worker_key(region, name))
    }

    /// List workers in a region.
    pub fn list_workers(&self, region: &str) -> StateResult<Vec<DeployedWorker>> {
        self.scan(WORKERS, &format!("{region}/"))
    }

    /// Delete a worker. Returns true if it existed.
    pub fn delete_worker(&self, region: &str, name: &str) -> StateResult<bool> {
        let key = worker_key(region, name);
        let existed = self.remove(WORKERS, &key)?;
        debug!(%key, existed, "worker deleted");
        Ok(existed)
    }

    // ── Sites ──────────────────────────────────────────────────────

    /// Insert or replace a site record.
    pub fn put_site(&self, site: &SiteRecord) -> StateResult<()> {
        let key = site.table_key();
        self.put(SITES, &key, site)?;
        debug!(%key, "site stored");
        Ok(())
    }

    pub fn get_site(&self, region: &str, site_name: &str) -> StateResult<Option<SiteRecord>> {
        self.get(SITES, &format!("{region}/{site_name}"))
    }

    pub fn list_sites(&self, region: &str) -> StateResult<Vec<SiteRecord>> {
        self.scan(SITES, &format!("{region}/"))
    }

    pub fn delete_site(&self, region: &str, site_name: &str) -> StateResult<bool> {
        self.remove(SITES, &format!("{region}/{site_name}"))
    }

    // ── Renders ────────────────────────────────────────────────────

    /// Insert or replace the snapshot for a render job.
    pub fn put_render(&self, record: &RenderRecord) -> StateResult<()> {
        self.put(RENDERS, &record.job_id, record)
    }

    pub fn get_render(&self, job_id: &str) -> StateResult<Option<RenderRecord>> {
        self.get(RENDERS, job_id)
    }

    /// All render records, ordered by job id.
    pub fn list_renders(&self) -> StateResult<Vec<RenderRecord>> {
        self.scan(RENDERS, "")
    }
}

fn encode<T: Serialize>(key: &str, value: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StateError::Encode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(|e| StateError::Decode {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
