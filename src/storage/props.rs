//! Per-record property collection with hybrid in-memory and on-disk storage.
//!
//! Small properties live in an insertion-ordered vector; disk-hinted keys are
//! serialized into the ordered KV layer under `"<version_key>_<property_id>"`.
//! Every store draws its `version_key` from a process-wide counter, so no two
//! stores share a key space.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::error;

use crate::error::Result;
use crate::ids::{Location, PropertyId, PropertyKey};
use crate::storage::codec::{decode_value, encode_value};
use crate::storage::kvstore::KvBackend;
use crate::storage::property_value::PropertyValue;

pub const DISK_KEY_SEPARATOR: &str = "_";

static GLOBAL_KEY_COUNTER: AtomicU64 = AtomicU64::new(0);

fn disk_key(version_key: u64, property: PropertyId) -> String {
    format!("{version_key}{DISK_KEY_SEPARATOR}{property}")
}

fn disk_key_prefix(version_key: u64) -> String {
    format!("{version_key}{DISK_KEY_SEPARATOR}")
}

pub struct PropertyValueStore {
    version_key: u64,
    memory: SmallVec<[(PropertyId, PropertyValue); 4]>,
    disk: Arc<dyn KvBackend>,
    /// Whether anything was ever written under this store's disk prefix.
    /// Stores that never spilled skip the KV layer entirely.
    spilled: bool,
}

impl PropertyValueStore {
    pub fn new(disk: Arc<dyn KvBackend>) -> Self {
        Self {
            version_key: GLOBAL_KEY_COUNTER.fetch_add(1, Ordering::Relaxed),
            memory: SmallVec::new(),
            disk,
            spilled: false,
        }
    }

    /// Returns the value at `key`, or null when absent.
    pub fn at(&self, key: PropertyKey) -> Result<PropertyValue> {
        match key.location {
            Location::Memory => Ok(self
                .memory
                .iter()
                .find(|(id, _)| *id == key.id)
                .map(|(_, value)| value.clone())
                .unwrap_or(PropertyValue::Null)),
            Location::Disk => {
                if !self.spilled {
                    return Ok(PropertyValue::Null);
                }
                match self.disk.get(&disk_key(self.version_key, key.id))? {
                    Some(bytes) => decode_value(&bytes),
                    None => Ok(PropertyValue::Null),
                }
            }
        }
    }

    /// Stores `value` under `key`; setting null erases instead.
    pub fn set(&mut self, key: PropertyKey, value: PropertyValue) -> Result<()> {
        if value.is_null() {
            self.erase(key)?;
            return Ok(());
        }
        match key.location {
            Location::Memory => {
                if let Some(slot) = self.memory.iter_mut().find(|(id, _)| *id == key.id) {
                    slot.1 = value;
                } else {
                    self.memory.push((key.id, value));
                }
            }
            Location::Disk => {
                self.disk
                    .put(&disk_key(self.version_key, key.id), &encode_value(&value))?;
                self.spilled = true;
            }
        }
        Ok(())
    }

    /// Removes the value stored under `key`.
    pub fn erase(&mut self, key: PropertyKey) -> Result<()> {
        match key.location {
            Location::Memory => {
                self.memory.retain(|(id, _)| *id != key.id);
            }
            Location::Disk => {
                if self.spilled {
                    self.disk.delete(&disk_key(self.version_key, key.id))?;
                }
            }
        }
        Ok(())
    }

    /// Removes every property, in-memory and on-disk.
    pub fn clear(&mut self) -> Result<()> {
        self.memory.clear();
        if self.spilled {
            self.disk.delete_prefix(&disk_key_prefix(self.version_key))?;
        }
        Ok(())
    }

    pub fn size(&self) -> Result<usize> {
        let disk = if self.spilled {
            self.disk.size_prefix(&disk_key_prefix(self.version_key))?
        } else {
            0
        };
        Ok(self.memory.len() + disk)
    }

    /// All pairs as if they were one collection: in-memory entries in
    /// insertion order, then the ordered scan of the disk prefix.
    pub fn pairs(&self) -> Result<Vec<(PropertyKey, PropertyValue)>> {
        let mut pairs: Vec<(PropertyKey, PropertyValue)> = self
            .memory
            .iter()
            .map(|(id, value)| (PropertyKey::new(*id, Location::Memory), value.clone()))
            .collect();
        if !self.spilled {
            return Ok(pairs);
        }
        let prefix = disk_key_prefix(self.version_key);
        for (key, bytes) in self.disk.scan_prefix(&prefix)? {
            let raw_id = key
                .get(prefix.len()..)
                .and_then(|suffix| suffix.parse::<u32>().ok());
            if let Some(raw_id) = raw_id {
                let value = decode_value(&bytes)?;
                pairs.push((PropertyKey::new(PropertyId(raw_id), Location::Disk), value));
            }
        }
        Ok(pairs)
    }
}

impl Clone for PropertyValueStore {
    fn clone(&self) -> Self {
        let clone = Self {
            version_key: GLOBAL_KEY_COUNTER.fetch_add(1, Ordering::Relaxed),
            memory: self.memory.clone(),
            disk: Arc::clone(&self.disk),
            spilled: self.spilled,
        };
        if !self.spilled {
            return clone;
        }
        match self.disk.scan_prefix(&disk_key_prefix(self.version_key)) {
            Ok(pairs) => {
                let prefix_len = disk_key_prefix(self.version_key).len();
                for (key, bytes) in pairs {
                    let suffix = &key[prefix_len.min(key.len())..];
                    let target = format!(
                        "{}{DISK_KEY_SEPARATOR}{suffix}",
                        clone.version_key
                    );
                    if let Err(err) = self.disk.put(&target, &bytes) {
                        error!(%err, key = %target, "failed to copy disk property");
                    }
                }
            }
            Err(err) => {
                error!(%err, version_key = self.version_key, "failed to scan disk properties");
            }
        }
        clone
    }
}

impl Drop for PropertyValueStore {
    fn drop(&mut self) {
        if self.spilled {
            let _ = self.disk.delete_prefix(&disk_key_prefix(self.version_key));
        }
    }
}

impl std::fmt::Debug for PropertyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyValueStore")
            .field("version_key", &self.version_key)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}
