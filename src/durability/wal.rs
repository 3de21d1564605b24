//! Append-only log of per-transaction mutations and commit markers.
//!
//! Records are length-prefixed, crc32-checked frames. Commit markers force
//! `sync_data` before the commit is acknowledged; interleaved appends from
//! concurrent transactions are fine because recovery buffers per tx id.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{GraphError, Result};
use crate::ids::{Gid, TxId};
use crate::storage::codec::{
    read_string, read_value, read_var_u64, write_string, write_value, write_var_u64,
};
use crate::storage::property_value::PropertyValue;

use super::paths::{ensure_dir, wal_filename};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntityKind {
    Vertex,
    Edge,
}

/// One logged state change.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    TxBegin {
        tx: TxId,
    },
    TxCommit {
        tx: TxId,
    },
    TxAbort {
        tx: TxId,
    },
    VertexCreate {
        tx: TxId,
        gid: Gid,
    },
    VertexDelete {
        tx: TxId,
        gid: Gid,
    },
    EdgeCreate {
        tx: TxId,
        gid: Gid,
        from: Gid,
        to: Gid,
        edge_type: String,
    },
    EdgeDelete {
        tx: TxId,
        gid: Gid,
    },
    AddLabel {
        tx: TxId,
        gid: Gid,
        label: String,
    },
    RemoveLabel {
        tx: TxId,
        gid: Gid,
        label: String,
    },
    SetProperty {
        tx: TxId,
        entity: EntityKind,
        gid: Gid,
        property: String,
        value: PropertyValue,
    },
    EraseProperty {
        tx: TxId,
        entity: EntityKind,
        gid: Gid,
        property: String,
    },
    BuildIndex {
        tx: TxId,
        label: String,
        property: String,
    },
}

const TAG_TX_BEGIN: u8 = 1;
const TAG_TX_COMMIT: u8 = 2;
const TAG_TX_ABORT: u8 = 3;
const TAG_VERTEX_CREATE: u8 = 4;
const TAG_VERTEX_DELETE: u8 = 5;
const TAG_EDGE_CREATE: u8 = 6;
const TAG_EDGE_DELETE: u8 = 7;
const TAG_ADD_LABEL: u8 = 8;
const TAG_REMOVE_LABEL: u8 = 9;
const TAG_SET_PROPERTY: u8 = 10;
const TAG_ERASE_PROPERTY: u8 = 11;
const TAG_BUILD_INDEX: u8 = 12;

impl Delta {
    pub fn tx_id(&self) -> TxId {
        match self {
            Delta::TxBegin { tx }
            | Delta::TxCommit { tx }
            | Delta::TxAbort { tx }
            | Delta::VertexCreate { tx, .. }
            | Delta::VertexDelete { tx, .. }
            | Delta::EdgeCreate { tx, .. }
            | Delta::EdgeDelete { tx, .. }
            | Delta::AddLabel { tx, .. }
            | Delta::RemoveLabel { tx, .. }
            | Delta::SetProperty { tx, .. }
            | Delta::EraseProperty { tx, .. }
            | Delta::BuildIndex { tx, .. } => *tx,
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Delta::TxBegin { tx } => {
                out.push(TAG_TX_BEGIN);
                write_var_u64(*tx, out);
            }
            Delta::TxCommit { tx } => {
                out.push(TAG_TX_COMMIT);
                write_var_u64(*tx, out);
            }
            Delta::TxAbort { tx } => {
                out.push(TAG_TX_ABORT);
                write_var_u64(*tx, out);
            }
            Delta::VertexCreate { tx, gid } => {
                out.push(TAG_VERTEX_CREATE);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
            }
            Delta::VertexDelete { tx, gid } => {
                out.push(TAG_VERTEX_DELETE);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
            }
            Delta::EdgeCreate {
                tx,
                gid,
                from,
                to,
                edge_type,
            } => {
                out.push(TAG_EDGE_CREATE);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
                write_var_u64(from.0, out);
                write_var_u64(to.0, out);
                write_string(edge_type, out);
            }
            Delta::EdgeDelete { tx, gid } => {
                out.push(TAG_EDGE_DELETE);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
            }
            Delta::AddLabel { tx, gid, label } => {
                out.push(TAG_ADD_LABEL);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
                write_string(label, out);
            }
            Delta::RemoveLabel { tx, gid, label } => {
                out.push(TAG_REMOVE_LABEL);
                write_var_u64(*tx, out);
                write_var_u64(gid.0, out);
                write_string(label, out);
            }
            Delta::SetProperty {
                tx,
                entity,
                gid,
                property,
                value,
            } => {
                out.push(TAG_SET_PROPERTY);
                write_var_u64(*tx, out);
                out.push(entity_tag(*entity));
                write_var_u64(gid.0, out);
                write_string(property, out);
                write_value(value, out);
            }
            Delta::EraseProperty {
                tx,
                entity,
                gid,
                property,
            } => {
                out.push(TAG_ERASE_PROPERTY);
                write_var_u64(*tx, out);
                out.push(entity_tag(*entity));
                write_var_u64(gid.0, out);
                write_string(property, out);
            }
            Delta::BuildIndex {
                tx,
                label,
                property,
            } => {
                out.push(TAG_BUILD_INDEX);
                write_var_u64(*tx, out);
                write_string(label, out);
                write_string(property, out);
            }
        }
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = 0usize;
        if buf.is_empty() {
            return Err(GraphError::Corruption("empty WAL record".into()));
        }
        let tag = buf[cursor];
        cursor += 1;
        let tx = read_var_u64(buf, &mut cursor)?;
        let delta = match tag {
            TAG_TX_BEGIN => Delta::TxBegin { tx },
            TAG_TX_COMMIT => Delta::TxCommit { tx },
            TAG_TX_ABORT => Delta::TxAbort { tx },
            TAG_VERTEX_CREATE => Delta::VertexCreate {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
            },
            TAG_VERTEX_DELETE => Delta::VertexDelete {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
            },
            TAG_EDGE_CREATE => Delta::EdgeCreate {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
                from: Gid(read_var_u64(buf, &mut cursor)?),
                to: Gid(read_var_u64(buf, &mut cursor)?),
                edge_type: read_string(buf, &mut cursor)?,
            },
            TAG_EDGE_DELETE => Delta::EdgeDelete {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
            },
            TAG_ADD_LABEL => Delta::AddLabel {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
                label: read_string(buf, &mut cursor)?,
            },
            TAG_REMOVE_LABEL => Delta::RemoveLabel {
                tx,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
                label: read_string(buf, &mut cursor)?,
            },
            TAG_SET_PROPERTY => Delta::SetProperty {
                tx,
                entity: entity_from_tag(read_u8(buf, &mut cursor)?)?,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
                property: read_string(buf, &mut cursor)?,
                value: read_value(buf, &mut cursor)?,
            },
            TAG_ERASE_PROPERTY => Delta::EraseProperty {
                tx,
                entity: entity_from_tag(read_u8(buf, &mut cursor)?)?,
                gid: Gid(read_var_u64(buf, &mut cursor)?),
                property: read_string(buf, &mut cursor)?,
            },
            TAG_BUILD_INDEX => Delta::BuildIndex {
                tx,
                label: read_string(buf, &mut cursor)?,
                property: read_string(buf, &mut cursor)?,
            },
            _ => return Err(GraphError::Corruption("unknown WAL record tag".into())),
        };
        Ok(delta)
    }
}

fn entity_tag(entity: EntityKind) -> u8 {
    match entity {
        EntityKind::Vertex => 0,
        EntityKind::Edge => 1,
    }
}

fn entity_from_tag(tag: u8) -> Result<EntityKind> {
    match tag {
        0 => Ok(EntityKind::Vertex),
        1 => Ok(EntityKind::Edge),
        _ => Err(GraphError::Corruption("unknown WAL entity tag".into())),
    }
}

fn read_u8(buf: &[u8], cursor: &mut usize) -> Result<u8> {
    if *cursor >= buf.len() {
        return Err(GraphError::Corruption("WAL record truncated".into()));
    }
    let byte = buf[*cursor];
    *cursor += 1;
    Ok(byte)
}

struct WalState {
    dir: PathBuf,
    file: File,
    current_path: PathBuf,
    pending: Vec<u8>,
    records_in_file: usize,
    max_tx_in_file: TxId,
    rotate_records: usize,
}

/// Per-database WAL appender serialized by a single mutex.
pub struct Wal {
    state: Mutex<WalState>,
}

impl Wal {
    /// Opens a fresh `__current` segment in `dir`, finalizing any segment
    /// a previous process left behind.
    pub fn open(dir: &Path, rotate_records: usize) -> Result<Self> {
        ensure_dir(dir)?;
        finalize_leftover_current(dir)?;
        let current_path = dir.join(wal_filename(None));
        let file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&current_path)?;
        debug!(path = %current_path.display(), "opened WAL segment");
        Ok(Self {
            state: Mutex::new(WalState {
                dir: dir.to_owned(),
                file,
                current_path,
                pending: Vec::new(),
                records_in_file: 0,
                max_tx_in_file: 0,
                rotate_records,
            }),
        })
    }

    /// Appends a delta. Commit markers flush and `sync_data` before
    /// returning, so a committed transaction's records are durable when
    /// the commit is acknowledged.
    pub fn emplace(&self, delta: &Delta) -> Result<()> {
        let mut state = self.state.lock();
        let mut payload = Vec::new();
        delta.encode(&mut payload);
        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();
        state
            .pending
            .extend_from_slice(&(payload.len() as u32).to_le_bytes());
        state.pending.extend_from_slice(&crc.to_le_bytes());
        state.pending.extend_from_slice(&payload);
        state.records_in_file += 1;
        state.max_tx_in_file = state.max_tx_in_file.max(delta.tx_id());
        match delta {
            Delta::TxCommit { .. } => {
                Self::flush(&mut state)?;
                state.file.sync_data()?;
                if state.records_in_file >= state.rotate_records {
                    Self::rotate(&mut state)?;
                }
            }
            Delta::TxAbort { .. } => {
                Self::flush(&mut state)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn flush(state: &mut WalState) -> Result<()> {
        if state.pending.is_empty() {
            return Ok(());
        }
        state.file.write_all(&state.pending)?;
        state.pending.clear();
        Ok(())
    }

    fn rotate(state: &mut WalState) -> Result<()> {
        let finalized = state
            .dir
            .join(wal_filename(Some(state.max_tx_in_file)));
        fs::rename(&state.current_path, &finalized)?;
        info!(
            from = %state.current_path.display(),
            to = %finalized.display(),
            records = state.records_in_file,
            "finalized WAL segment"
        );
        state.current_path = state.dir.join(wal_filename(None));
        state.file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .open(&state.current_path)?;
        state.records_in_file = 0;
        state.max_tx_in_file = 0;
        Ok(())
    }

    /// Flushes buffered records without a commit marker, for shutdown.
    pub fn flush_pending(&self) -> Result<()> {
        let mut state = self.state.lock();
        Self::flush(&mut state)?;
        state.file.sync_data()?;
        Ok(())
    }
}

/// Renames an abandoned `__current` file using the max tx id found inside.
fn finalize_leftover_current(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with("__current") {
            continue;
        }
        let deltas = read_deltas(&entry.path())?;
        let max_tx = deltas.iter().map(Delta::tx_id).max().unwrap_or(0);
        let finalized = dir.join(wal_filename(Some(max_tx)));
        fs::rename(entry.path(), &finalized)?;
        info!(from = %name, to = %finalized.display(), "finalized leftover WAL segment");
    }
    Ok(())
}

/// Reads every well-formed record from a WAL file; a torn or corrupt tail
/// ends the scan with a warning rather than failing recovery.
pub fn read_deltas(path: &Path) -> Result<Vec<Delta>> {
    let mut file = File::open(path)?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let mut deltas = Vec::new();
    let mut cursor = 0usize;
    while cursor + 8 <= buf.len() {
        let len = u32::from_le_bytes([
            buf[cursor],
            buf[cursor + 1],
            buf[cursor + 2],
            buf[cursor + 3],
        ]) as usize;
        let crc = u32::from_le_bytes([
            buf[cursor + 4],
            buf[cursor + 5],
            buf[cursor + 6],
            buf[cursor + 7],
        ]);
        let start = cursor + 8;
        if start + len > buf.len() {
            warn!(path = %path.display(), "WAL ends with a partial record");
            break;
        }
        let payload = &buf[start..start + len];
        let mut hasher = Hasher::new();
        hasher.update(payload);
        if hasher.finalize() != crc {
            warn!(path = %path.display(), "WAL record checksum mismatch, stopping scan");
            break;
        }
        deltas.push(Delta::decode(payload)?);
        cursor = start + len;
    }
    if cursor < buf.len() && cursor + 8 > buf.len() {
        warn!(path = %path.display(), "WAL ends with a partial record header");
    }
    Ok(deltas)
}
