//! Startup recovery: load the newest usable snapshot, then replay the WAL
//! suffix, yielding the greatest prefix of tx-ordered effects whose commit
//! markers reached disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::db::accessor::GraphAccessor;
use crate::error::{GraphError, Result};
use crate::ids::TxId;
use crate::storage::mvcc::View;

use super::paths;
use super::snapshot::{self, SnapshotData};
use super::wal::{self, Delta, EntityKind};

#[derive(Clone, Debug, Default)]
pub struct RecoveredState {
    pub snapshot_tx: TxId,
    pub max_tx_id: TxId,
    pub vertices: u64,
    pub edges: u64,
}

/// Runs full recovery through `dba`, a transaction whose accessor does not
/// log to the WAL. The caller commits it afterwards.
pub(crate) fn recover(
    durability_dir: &Path,
    db_name: &str,
    dba: &GraphAccessor<'_>,
) -> Result<RecoveredState> {
    let snapshot_dir = paths::snapshot_dir(durability_dir, db_name);
    let wal_dir = paths::wal_dir(durability_dir, db_name);

    let mut state = RecoveredState::default();
    let mut active_txs: Vec<TxId> = Vec::new();
    let snapshots = snapshot::list_snapshots(&snapshot_dir)?;
    let mut loaded = false;
    for path in &snapshots {
        match snapshot::read_snapshot(path) {
            Ok((summary, data)) => {
                load_snapshot(dba, &data)?;
                state.snapshot_tx = summary.tx_id;
                state.vertices = summary.vertex_num;
                state.edges = summary.edge_num;
                active_txs = data.active_txs;
                loaded = true;
                info!(
                    path = %path.display(),
                    tx_id = summary.tx_id,
                    vertices = summary.vertex_num,
                    edges = summary.edge_num,
                    "recovered from snapshot"
                );
                break;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "snapshot unusable, trying an older one");
            }
        }
    }
    if !snapshots.is_empty() && !loaded {
        return Err(GraphError::Recovery(
            "no usable snapshot in the durability directory".into(),
        ));
    }

    state.max_tx_id = state.snapshot_tx;
    if wal_dir.exists() {
        let mut files: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(&wal_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(name_tx) = paths::tx_id_from_wal_filename(&name) else {
                continue;
            };
            if name_tx >= state.snapshot_tx {
                files.push(entry.path());
            }
        }
        files.sort();
        let mut pending: HashMap<TxId, Vec<Delta>> = HashMap::new();
        let mut applied = 0usize;
        for path in &files {
            for delta in wal::read_deltas(path)? {
                let tx = delta.tx_id();
                // Effects visible to the snapshot reader are already in
                // the snapshot.
                if tx <= state.snapshot_tx && !active_txs.contains(&tx) {
                    continue;
                }
                state.max_tx_id = state.max_tx_id.max(tx);
                match delta {
                    Delta::TxBegin { .. } => {
                        pending.entry(tx).or_default();
                    }
                    Delta::TxCommit { .. } => {
                        if let Some(deltas) = pending.remove(&tx) {
                            for delta in deltas {
                                apply_delta(dba, &delta)?;
                                applied += 1;
                            }
                        }
                    }
                    Delta::TxAbort { .. } => {
                        pending.remove(&tx);
                    }
                    other => pending.entry(tx).or_default().push(other),
                }
            }
        }
        if !pending.is_empty() {
            info!(
                transactions = pending.len(),
                "discarded unterminated transactions at WAL end"
            );
        }
        info!(
            segments = files.len(),
            deltas = applied,
            max_tx_id = state.max_tx_id,
            "replayed write-ahead log"
        );
    }
    Ok(state)
}

fn load_snapshot(dba: &GraphAccessor<'_>, data: &SnapshotData) -> Result<()> {
    for vertex in &data.vertices {
        let mut accessor = dba.insert_vertex_at(Some(vertex.gid))?;
        for label in &vertex.labels {
            accessor.add_label(dba.label(label))?;
        }
        for (name, _, value) in &vertex.props {
            accessor.props_set(dba.property(name), value.clone())?;
        }
    }
    for edge in &data.edges {
        let edge_type = dba.edge_type(&edge.edge_type);
        let mut accessor = dba.insert_edge_at(Some(edge.gid), edge.from, edge.to, edge_type)?;
        for (name, _, value) in &edge.props {
            accessor.props_set(dba.property(name), value.clone())?;
        }
    }
    for (label, property) in &data.index_keys {
        let label = dba.label(label);
        let property = dba.property(property);
        dba.build_index(label, property)?;
    }
    Ok(())
}

fn apply_delta(dba: &GraphAccessor<'_>, delta: &Delta) -> Result<()> {
    let outcome = try_apply_delta(dba, delta);
    outcome.map_err(|err| {
        GraphError::Recovery(format!("failed to apply WAL record {delta:?}: {err}"))
    })
}

fn try_apply_delta(dba: &GraphAccessor<'_>, delta: &Delta) -> Result<()> {
    match delta {
        Delta::TxBegin { .. } | Delta::TxCommit { .. } | Delta::TxAbort { .. } => Ok(()),
        Delta::VertexCreate { gid, .. } => {
            dba.insert_vertex_at(Some(*gid))?;
            Ok(())
        }
        Delta::VertexDelete { gid, .. } => {
            let vertex = dba
                .vertex(*gid, View::New)
                .ok_or(GraphError::NotFound("vertex"))?;
            dba.delete_vertex(&vertex)
        }
        Delta::EdgeCreate {
            gid,
            from,
            to,
            edge_type,
            ..
        } => {
            let edge_type = dba.edge_type(edge_type);
            dba.insert_edge_at(Some(*gid), *from, *to, edge_type)?;
            Ok(())
        }
        Delta::EdgeDelete { gid, .. } => {
            let edge = dba
                .edge(*gid, View::New)
                .ok_or(GraphError::NotFound("edge"))?;
            dba.delete_edge(&edge)
        }
        Delta::AddLabel { gid, label, .. } => {
            let mut vertex = dba
                .vertex(*gid, View::New)
                .ok_or(GraphError::NotFound("vertex"))?;
            vertex.add_label(dba.label(label))
        }
        Delta::RemoveLabel { gid, label, .. } => {
            let mut vertex = dba
                .vertex(*gid, View::New)
                .ok_or(GraphError::NotFound("vertex"))?;
            vertex.remove_label(dba.label(label))
        }
        Delta::SetProperty {
            entity,
            gid,
            property,
            value,
            ..
        } => {
            let key = dba.property(property);
            match entity {
                EntityKind::Vertex => {
                    let mut vertex = dba
                        .vertex(*gid, View::New)
                        .ok_or(GraphError::NotFound("vertex"))?;
                    vertex.props_set(key, value.clone())
                }
                EntityKind::Edge => {
                    let mut edge = dba
                        .edge(*gid, View::New)
                        .ok_or(GraphError::NotFound("edge"))?;
                    edge.props_set(key, value.clone())
                }
            }
        }
        Delta::EraseProperty {
            entity,
            gid,
            property,
            ..
        } => {
            let key = dba.property(property);
            match entity {
                EntityKind::Vertex => {
                    let mut vertex = dba
                        .vertex(*gid, View::New)
                        .ok_or(GraphError::NotFound("vertex"))?;
                    vertex.props_erase(key)
                }
                EntityKind::Edge => {
                    let mut edge = dba
                        .edge(*gid, View::New)
                        .ok_or(GraphError::NotFound("edge"))?;
                    edge.props_erase(key)
                }
            }
        }
        Delta::BuildIndex {
            label, property, ..
        } => {
            let label = dba.label(label);
            let property = dba.property(property);
            match dba.build_index(label, property) {
                // Already present from the snapshot.
                Err(GraphError::InvalidArgument(_)) => Ok(()),
                other => other,
            }
        }
    }
}
