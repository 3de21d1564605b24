//! On-disk layout under the configured durability directory and the WAL
//! file-name convention:
//! `<ISO-timestamp>__max_transaction_<tx_id>` once finalized,
//! `<ISO-timestamp>__current` while being appended.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::warn;

use crate::error::{GraphError, Result};
use crate::ids::TxId;

pub const SNAPSHOT_DIR: &str = "snapshots";
pub const WAL_DIR: &str = "wal";
pub const KVSTORE_DIR: &str = "kvstore";

pub fn snapshot_dir(durability_dir: &Path, db_name: &str) -> PathBuf {
    durability_dir.join(SNAPSHOT_DIR).join(db_name)
}

pub fn wal_dir(durability_dir: &Path, db_name: &str) -> PathBuf {
    durability_dir.join(WAL_DIR).join(db_name)
}

pub fn kvstore_path(durability_dir: &Path) -> PathBuf {
    durability_dir.join(KVSTORE_DIR).join("properties.redb")
}

/// Ensures `dir` exists and is a directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        if !dir.is_dir() {
            return Err(GraphError::InvalidArgument(format!(
                "durability path '{}' is not a directory",
                dir.display()
            )));
        }
        return Ok(());
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

pub fn snapshot_filename() -> String {
    timestamp()
}

pub fn wal_filename(tx_id: Option<TxId>) -> String {
    match tx_id {
        Some(tx_id) => format!("{}__max_transaction_{}", timestamp(), tx_id),
        None => format!("{}__current", timestamp()),
    }
}

/// Extracts the max transaction id from a WAL file name. The "current"
/// file maps to the maximum id since its upper bound is still unknown;
/// unparseable names yield none.
pub fn tx_id_from_wal_filename(name: &str) -> Option<TxId> {
    let Some((_, suffix)) = name.rsplit_once("__") else {
        warn!(name, "unable to parse WAL file name");
        return None;
    };
    if suffix == "current" {
        return Some(TxId::MAX);
    }
    let Some((_, tx_id)) = suffix.rsplit_once('_') else {
        warn!(name, "unable to parse WAL file name");
        return None;
    };
    match tx_id.parse::<TxId>() {
        Ok(tx_id) => Some(tx_id),
        Err(_) => {
            warn!(name, tx_id, "unable to parse WAL file name tx id");
            None
        }
    }
}
