//! Snapshot file codec.
//!
//! A snapshot begins with a `Summary { vertex_num, edge_num, tx_id, hash }`
//! header, followed by the encoded body (built index keys, vertices, then
//! edges) and a trailing hash. The hash is the running crc32 digest of the
//! body; the decoder verifies it against both the summary and the trailer.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crc32fast::Hasher;
use tracing::{info, warn};

use crate::error::{GraphError, Result};
use crate::ids::{Gid, Location, TxId};
use crate::storage::codec::{
    read_string, read_value, read_var_u64, write_string, write_value, write_var_u64,
};
use crate::storage::property_value::PropertyValue;

const SNAPSHOT_MAGIC: &[u8; 8] = b"DSKSNAP1";
const SUMMARY_LEN: usize = 28;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SnapshotSummary {
    pub vertex_num: u64,
    pub edge_num: u64,
    pub tx_id: TxId,
    pub hash: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotVertex {
    pub gid: Gid,
    pub labels: Vec<String>,
    pub props: Vec<(String, Location, PropertyValue)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotEdge {
    pub gid: Gid,
    pub from: Gid,
    pub to: Gid,
    pub edge_type: String,
    pub props: Vec<(String, Location, PropertyValue)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SnapshotData {
    pub tx_id: TxId,
    /// Transactions active when the snapshot reader began; their effects
    /// are not in the snapshot and must come from the WAL.
    pub active_txs: Vec<TxId>,
    pub index_keys: Vec<(String, String)>,
    pub vertices: Vec<SnapshotVertex>,
    pub edges: Vec<SnapshotEdge>,
}

fn write_props(props: &[(String, Location, PropertyValue)], out: &mut Vec<u8>) {
    write_var_u64(props.len() as u64, out);
    for (name, location, value) in props {
        write_string(name, out);
        out.push(match location {
            Location::Memory => 0,
            Location::Disk => 1,
        });
        write_value(value, out);
    }
}

fn read_props(buf: &[u8], cursor: &mut usize) -> Result<Vec<(String, Location, PropertyValue)>> {
    let count = read_var_u64(buf, cursor)? as usize;
    let mut props = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let name = read_string(buf, cursor)?;
        if *cursor >= buf.len() {
            return Err(GraphError::Corruption("snapshot property truncated".into()));
        }
        let location = match buf[*cursor] {
            0 => Location::Memory,
            1 => Location::Disk,
            _ => return Err(GraphError::Corruption("unknown location tag".into())),
        };
        *cursor += 1;
        let value = read_value(buf, cursor)?;
        props.push((name, location, value));
    }
    Ok(props)
}

fn encode_body(data: &SnapshotData) -> Vec<u8> {
    let mut body = Vec::new();
    write_var_u64(data.active_txs.len() as u64, &mut body);
    for tx in &data.active_txs {
        write_var_u64(*tx, &mut body);
    }
    write_var_u64(data.index_keys.len() as u64, &mut body);
    for (label, property) in &data.index_keys {
        write_string(label, &mut body);
        write_string(property, &mut body);
    }
    for vertex in &data.vertices {
        write_var_u64(vertex.gid.0, &mut body);
        write_var_u64(vertex.labels.len() as u64, &mut body);
        for label in &vertex.labels {
            write_string(label, &mut body);
        }
        write_props(&vertex.props, &mut body);
    }
    for edge in &data.edges {
        write_var_u64(edge.gid.0, &mut body);
        write_var_u64(edge.from.0, &mut body);
        write_var_u64(edge.to.0, &mut body);
        write_string(&edge.edge_type, &mut body);
        write_props(&edge.props, &mut body);
    }
    body
}

/// Writes a snapshot file. Returns the body digest.
pub fn write_snapshot(path: &Path, data: &SnapshotData) -> Result<SnapshotSummary> {
    let body = encode_body(data);
    let mut hasher = Hasher::new();
    hasher.update(&body);
    let hash = hasher.finalize();
    let summary = SnapshotSummary {
        vertex_num: data.vertices.len() as u64,
        edge_num: data.edges.len() as u64,
        tx_id: data.tx_id,
        hash,
    };
    let mut file = File::create(path)?;
    file.write_all(SNAPSHOT_MAGIC)?;
    let mut header = [0u8; SUMMARY_LEN];
    header[0..8].copy_from_slice(&summary.vertex_num.to_le_bytes());
    header[8..16].copy_from_slice(&summary.edge_num.to_le_bytes());
    header[16..24].copy_from_slice(&summary.tx_id.to_le_bytes());
    header[24..28].copy_from_slice(&summary.hash.to_le_bytes());
    file.write_all(&header)?;
    file.write_all(&body)?;
    file.write_all(&hash.to_le_bytes())?;
    file.sync_data()?;
    info!(
        path = %path.display(),
        vertices = summary.vertex_num,
        edges = summary.edge_num,
        tx_id = summary.tx_id,
        "snapshot written"
    );
    Ok(summary)
}

/// Reads only the summary header.
pub fn read_summary(path: &Path) -> Result<SnapshotSummary> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(GraphError::Corruption("snapshot magic mismatch".into()));
    }
    let mut header = [0u8; SUMMARY_LEN];
    file.read_exact(&mut header)?;
    Ok(SnapshotSummary {
        vertex_num: u64::from_le_bytes(header[0..8].try_into().unwrap()),
        edge_num: u64::from_le_bytes(header[8..16].try_into().unwrap()),
        tx_id: u64::from_le_bytes(header[16..24].try_into().unwrap()),
        hash: u32::from_le_bytes(header[24..28].try_into().unwrap()),
    })
}

/// Decodes and verifies a snapshot file.
pub fn read_snapshot(path: &Path) -> Result<(SnapshotSummary, SnapshotData)> {
    let summary = read_summary(path)?;
    let bytes = fs::read(path)?;
    let body_start = SNAPSHOT_MAGIC.len() + SUMMARY_LEN;
    if bytes.len() < body_start + 4 {
        return Err(GraphError::Corruption("snapshot truncated".into()));
    }
    let body = &bytes[body_start..bytes.len() - 4];
    let trailer = u32::from_le_bytes(
        bytes[bytes.len() - 4..]
            .try_into()
            .unwrap(),
    );
    let mut hasher = Hasher::new();
    hasher.update(body);
    let digest = hasher.finalize();
    if digest != summary.hash || digest != trailer {
        return Err(GraphError::Corruption(
            "snapshot body hash does not match summary".into(),
        ));
    }

    let mut cursor = 0usize;
    let mut data = SnapshotData {
        tx_id: summary.tx_id,
        ..SnapshotData::default()
    };
    let active_count = read_var_u64(body, &mut cursor)? as usize;
    for _ in 0..active_count {
        data.active_txs.push(read_var_u64(body, &mut cursor)?);
    }
    let index_count = read_var_u64(body, &mut cursor)? as usize;
    for _ in 0..index_count {
        let label = read_string(body, &mut cursor)?;
        let property = read_string(body, &mut cursor)?;
        data.index_keys.push((label, property));
    }
    for _ in 0..summary.vertex_num {
        let gid = Gid(read_var_u64(body, &mut cursor)?);
        let label_count = read_var_u64(body, &mut cursor)? as usize;
        let mut labels = Vec::with_capacity(label_count.min(64));
        for _ in 0..label_count {
            labels.push(read_string(body, &mut cursor)?);
        }
        let props = read_props(body, &mut cursor)?;
        data.vertices.push(SnapshotVertex { gid, labels, props });
    }
    for _ in 0..summary.edge_num {
        let gid = Gid(read_var_u64(body, &mut cursor)?);
        let from = Gid(read_var_u64(body, &mut cursor)?);
        let to = Gid(read_var_u64(body, &mut cursor)?);
        let edge_type = read_string(body, &mut cursor)?;
        let props = read_props(body, &mut cursor)?;
        data.edges.push(SnapshotEdge {
            gid,
            from,
            to,
            edge_type,
            props,
        });
    }
    if cursor != body.len() {
        return Err(GraphError::Corruption(
            "snapshot body has trailing bytes".into(),
        ));
    }
    Ok((summary, data))
}

/// Snapshot files in `dir`, newest first by file name (ISO timestamps sort
/// chronologically).
pub fn list_snapshots(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files.reverse();
    Ok(files)
}

/// Deletes snapshots beyond the retention count, oldest first.
pub fn prune_snapshots(dir: &Path, max_retained: usize) -> Result<()> {
    let files = list_snapshots(dir)?;
    for path in files.iter().skip(max_retained.max(1)) {
        match fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "pruned old snapshot"),
            Err(err) => warn!(path = %path.display(), %err, "failed to prune snapshot"),
        }
    }
    Ok(())
}
