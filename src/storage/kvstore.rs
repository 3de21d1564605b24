//! Ordered key-value capability backing disk-spilled property values.
//!
//! Any ordered KV store satisfies the capability; the default backend is a
//! redb table under `<durability_directory>/kvstore`. Builds that exclude
//! disk overflow use [`DummyKvStore`], whose operations all fail loudly.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use redb::{Database, ReadableDatabase, TableDefinition};
use tracing::debug;

use crate::error::{GraphError, Result};

const PROPERTIES: TableDefinition<&str, &[u8]> = TableDefinition::new("properties");

/// Capability exposed to the property value store.
pub trait KvBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, value: &[u8]) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn delete_prefix(&self, prefix: &str) -> Result<()>;
    /// Ordered scan of every pair whose key starts with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;
    /// Number of keys under `prefix`.
    fn size_prefix(&self, prefix: &str) -> Result<usize>;
}

/// redb-backed ordered KV store with a per-prefix count cache so
/// `size_prefix` stays constant time on the hot path.
pub struct RedbKvStore {
    db: Database,
    counts: RwLock<HashMap<String, usize>>,
}

impl RedbKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path.as_ref())
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        {
            let txn = db
                .begin_write()
                .map_err(|e| GraphError::KvStore(e.to_string()))?;
            txn.open_table(PROPERTIES)
                .map_err(|e| GraphError::KvStore(e.to_string()))?;
            txn.commit().map_err(|e| GraphError::KvStore(e.to_string()))?;
        }
        debug!(path = %path.as_ref().display(), "opened property kvstore");
        Ok(Self {
            db,
            counts: RwLock::new(HashMap::new()),
        })
    }

    fn adjust_counts(&self, key: &str, delta: i64) {
        let mut counts = self.counts.write();
        for (prefix, count) in counts.iter_mut() {
            if key.starts_with(prefix.as_str()) {
                if delta > 0 {
                    *count += delta as usize;
                } else {
                    *count = count.saturating_sub((-delta) as usize);
                }
            }
        }
    }
}

impl KvBackend for RedbKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let table = txn
            .open_table(PROPERTIES)
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let value = table
            .get(key)
            .map_err(|e| GraphError::KvStore(e.to_string()))?
            .map(|guard| guard.value().to_vec());
        Ok(value)
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let existed;
        {
            let mut table = txn
                .open_table(PROPERTIES)
                .map_err(|e| GraphError::KvStore(e.to_string()))?;
            existed = table
                .insert(key, value)
                .map_err(|e| GraphError::KvStore(e.to_string()))?
                .is_some();
        }
        txn.commit().map_err(|e| GraphError::KvStore(e.to_string()))?;
        if !existed {
            self.adjust_counts(key, 1);
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let existed;
        {
            let mut table = txn
                .open_table(PROPERTIES)
                .map_err(|e| GraphError::KvStore(e.to_string()))?;
            existed = table
                .remove(key)
                .map_err(|e| GraphError::KvStore(e.to_string()))?
                .is_some();
        }
        txn.commit().map_err(|e| GraphError::KvStore(e.to_string()))?;
        if existed {
            self.adjust_counts(key, -1);
        }
        Ok(())
    }

    fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let keys: Vec<String> = self
            .scan_prefix(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        let txn = self
            .db
            .begin_write()
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        {
            let mut table = txn
                .open_table(PROPERTIES)
                .map_err(|e| GraphError::KvStore(e.to_string()))?;
            for key in &keys {
                table
                    .remove(key.as_str())
                    .map_err(|e| GraphError::KvStore(e.to_string()))?;
            }
        }
        txn.commit().map_err(|e| GraphError::KvStore(e.to_string()))?;
        for key in &keys {
            self.adjust_counts(key, -1);
        }
        self.counts.write().insert(prefix.to_owned(), 0);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let table = txn
            .open_table(PROPERTIES)
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        let mut pairs = Vec::new();
        let range = table
            .range(prefix..)
            .map_err(|e| GraphError::KvStore(e.to_string()))?;
        for entry in range {
            let (key, value) = entry.map_err(|e| GraphError::KvStore(e.to_string()))?;
            let key = key.value().to_owned();
            if !key.starts_with(prefix) {
                break;
            }
            pairs.push((key, value.value().to_vec()));
        }
        Ok(pairs)
    }

    fn size_prefix(&self, prefix: &str) -> Result<usize> {
        if let Some(&count) = self.counts.read().get(prefix) {
            return Ok(count);
        }
        let count = self.scan_prefix(prefix)?.len();
        self.counts.write().insert(prefix.to_owned(), count);
        Ok(count)
    }
}

/// Backend for builds without disk overflow; every operation fails loudly.
#[derive(Debug, Default)]
pub struct DummyKvStore;

impl DummyKvStore {
    fn unavailable<T>() -> Result<T> {
        Err(GraphError::KvStore(
            "disk property storage is not available in this configuration".into(),
        ))
    }
}

impl KvBackend for DummyKvStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Self::unavailable()
    }

    fn put(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Self::unavailable()
    }

    fn delete(&self, _key: &str) -> Result<()> {
        Self::unavailable()
    }

    fn delete_prefix(&self, _prefix: &str) -> Result<()> {
        Self::unavailable()
    }

    fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        Self::unavailable()
    }

    fn size_prefix(&self, _prefix: &str) -> Result<usize> {
        Self::unavailable()
    }
}
