//! Database façade: configuration, recovery on open, background snapshot
//! worker, and per-transaction accessors.

pub mod accessor;

pub use accessor::{EdgeAccessor, GraphAccessor, VertexAccessor};

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{error, info};

use crate::durability::paths;
use crate::durability::recovery;
use crate::durability::snapshot::{self, SnapshotData, SnapshotEdge, SnapshotVertex};
use crate::durability::wal::Wal;
use crate::error::{GraphError, Result};
use crate::ids::TxId;
use crate::storage::kvstore::{DummyKvStore, KvBackend, RedbKvStore};
use crate::storage::mvcc::View;
use crate::storage::GraphStorage;
use crate::tx::Engine;

#[derive(Clone, Debug)]
pub struct Config {
    pub db_name: String,
    /// Root of on-disk state; none disables durability entirely.
    pub durability_directory: Option<PathBuf>,
    /// Period of periodic snapshotting in seconds; negative disables
    /// periodic snapshots, leaving on-demand ones.
    pub snapshot_cycle_sec: i64,
    /// Snapshot rotation count; older snapshots and their obsolete WAL
    /// segments are deleted.
    pub max_retained_snapshots: usize,
    /// Raises the per-transaction abort flag on queries running longer;
    /// zero or negative disables the deadline.
    pub query_execution_timeout_sec: i64,
    /// Property names whose values are routed to the ordered KV layer.
    pub properties_on_disk: Vec<String>,
    /// Finalize the current WAL segment after this many records.
    pub wal_rotate_records: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_name: "default".into(),
            durability_directory: None,
            snapshot_cycle_sec: -1,
            max_retained_snapshots: 3,
            query_execution_timeout_sec: 180,
            properties_on_disk: Vec::new(),
            wal_rotate_records: 100_000,
        }
    }
}

impl Config {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn durable(dir: impl Into<PathBuf>) -> Self {
        Self {
            durability_directory: Some(dir.into()),
            ..Self::default()
        }
    }
}

pub(crate) struct DbCore {
    pub(crate) config: Config,
    pub(crate) storage: Arc<GraphStorage>,
    pub(crate) engine: Arc<Engine>,
    pub(crate) wal: RwLock<Option<Wal>>,
}

impl DbCore {
    /// Writes a snapshot of the last committed state, rotates old
    /// snapshots, and prunes WAL segments they made obsolete.
    fn make_snapshot(&self) -> Result<()> {
        let dir = self
            .config
            .durability_directory
            .as_ref()
            .ok_or_else(|| {
                GraphError::InvalidArgument("durability is disabled for this database".into())
            })?
            .clone();
        let snapshot_dir = paths::snapshot_dir(&dir, &self.config.db_name);
        paths::ensure_dir(&snapshot_dir)?;
        let tx = self.engine.begin();
        let dba = GraphAccessor::new(self, tx, false)?;
        let data = collect_snapshot_data(&dba)?;
        let path = snapshot_dir.join(paths::snapshot_filename());
        snapshot::write_snapshot(&path, &data)?;
        dba.commit()?;
        snapshot::prune_snapshots(&snapshot_dir, self.config.max_retained_snapshots)?;
        self.prune_wal_segments(&dir)?;
        Ok(())
    }

    /// Deletes finalized WAL segments older than every retained snapshot.
    fn prune_wal_segments(&self, dir: &std::path::Path) -> Result<()> {
        let snapshot_dir = paths::snapshot_dir(dir, &self.config.db_name);
        let snapshots = snapshot::list_snapshots(&snapshot_dir)?;
        let Some(oldest) = snapshots.last() else {
            return Ok(());
        };
        let min_tx = snapshot::read_summary(oldest)?.tx_id;
        let wal_dir = paths::wal_dir(dir, &self.config.db_name);
        if !wal_dir.exists() {
            return Ok(());
        }
        for entry in std::fs::read_dir(&wal_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(name_tx) = paths::tx_id_from_wal_filename(&name) else {
                continue;
            };
            if name_tx != TxId::MAX && name_tx < min_tx {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => info!(%name, "pruned obsolete WAL segment"),
                    Err(err) => error!(%name, %err, "failed to prune WAL segment"),
                }
            }
        }
        Ok(())
    }
}

fn collect_snapshot_data(dba: &GraphAccessor<'_>) -> Result<SnapshotData> {
    let mut data = SnapshotData {
        tx_id: dba.transaction().id(),
        active_txs: dba.transaction().snapshot().iter().copied().collect(),
        ..SnapshotData::default()
    };
    for (label, property) in dba.index_keys() {
        data.index_keys
            .push((dba.label_name(label), dba.property_name(property)));
    }
    for vertex in dba.vertices(View::Old) {
        let labels = vertex
            .labels()?
            .into_iter()
            .map(|label| dba.label_name(label))
            .collect();
        let props = vertex
            .properties()?
            .into_iter()
            .map(|(key, value)| (dba.property_name(key.id), key.location, value))
            .collect();
        data.vertices.push(SnapshotVertex {
            gid: vertex.gid(),
            labels,
            props,
        });
    }
    for edge in dba.edges(View::Old) {
        let props = edge
            .properties()?
            .into_iter()
            .map(|(key, value)| (dba.property_name(key.id), key.location, value))
            .collect();
        data.edges.push(SnapshotEdge {
            gid: edge.gid(),
            from: edge.from()?.gid(),
            to: edge.to()?.gid(),
            edge_type: dba.edge_type_name(edge.edge_type()?),
            props,
        });
    }
    Ok(data)
}

type StopSignal = (Mutex<bool>, Condvar);

pub struct GraphDB {
    core: Arc<DbCore>,
    stop: Arc<StopSignal>,
    snapshot_worker: Option<thread::JoinHandle<()>>,
}

impl GraphDB {
    /// Opens the database, running recovery when a durability directory is
    /// configured, then starts the periodic snapshot worker.
    pub fn new(config: Config) -> Result<Self> {
        let kv: Arc<dyn KvBackend> = match &config.durability_directory {
            Some(dir) => {
                paths::ensure_dir(dir)?;
                let store = RedbKvStore::open(paths::kvstore_path(dir))?;
                // Spilled values are derived state; recovery repopulates
                // them, and stale keys from a previous process would leak
                // into freshly assigned store key spaces.
                store.delete_prefix("")?;
                Arc::new(store)
            }
            None => Arc::new(DummyKvStore),
        };
        let storage = Arc::new(GraphStorage::new(kv, config.properties_on_disk.clone()));
        let engine = Arc::new(Engine::new());
        let core = Arc::new(DbCore {
            config,
            storage,
            engine,
            wal: RwLock::new(None),
        });

        if let Some(dir) = core.config.durability_directory.clone() {
            paths::ensure_dir(&paths::snapshot_dir(&dir, &core.config.db_name))?;
            let wal_dir = paths::wal_dir(&dir, &core.config.db_name);
            paths::ensure_dir(&wal_dir)?;
            let recovered = {
                let tx = core.engine.begin();
                let dba = GraphAccessor::new(&core, tx, false)?;
                match recovery::recover(&dir, &core.config.db_name, &dba) {
                    Ok(state) => {
                        dba.commit()?;
                        state
                    }
                    Err(err) => {
                        dba.abort();
                        return Err(err);
                    }
                }
            };
            core.engine.seed_next_id(recovered.max_tx_id);
            let wal = Wal::open(&wal_dir, core.config.wal_rotate_records)?;
            *core.wal.write() = Some(wal);
            info!(
                db_name = %core.config.db_name,
                snapshot_tx = recovered.snapshot_tx,
                max_tx_id = recovered.max_tx_id,
                "database recovered"
            );
        }

        let stop: Arc<StopSignal> = Arc::new((Mutex::new(false), Condvar::new()));
        let snapshot_worker = if core.config.snapshot_cycle_sec > 0
            && core.config.durability_directory.is_some()
        {
            let worker_core = Arc::clone(&core);
            let worker_stop = Arc::clone(&stop);
            let period = Duration::from_secs(core.config.snapshot_cycle_sec as u64);
            Some(
                thread::Builder::new()
                    .name("snapshot-worker".into())
                    .spawn(move || loop {
                        {
                            let (lock, cvar) = &*worker_stop;
                            let mut stopped = lock.lock();
                            if !*stopped {
                                let _ = cvar.wait_for(&mut stopped, period);
                            }
                            if *stopped {
                                break;
                            }
                        }
                        worker_core
                            .storage
                            .collect_garbage(&worker_core.engine);
                        if let Err(err) = worker_core.make_snapshot() {
                            error!(%err, "periodic snapshot failed");
                        }
                    })?,
            )
        } else {
            None
        };

        Ok(Self {
            core,
            stop,
            snapshot_worker,
        })
    }

    /// Begins a transaction and returns its accessor.
    pub fn access(&self) -> Result<GraphAccessor<'_>> {
        let tx = self.core.engine.begin();
        GraphAccessor::new(&self.core, tx, true)
    }

    /// Takes a snapshot on demand.
    pub fn snapshot(&self) -> Result<()> {
        self.core.make_snapshot()
    }

    /// Runs a version-chain garbage collection pass.
    pub fn collect_garbage(&self) {
        self.core.storage.collect_garbage(&self.core.engine);
    }

    pub fn config(&self) -> &Config {
        &self.core.config
    }

    /// Physical record counts (live version chains), including records
    /// whose deletion has not been garbage collected yet.
    pub fn record_counts(&self) -> (usize, usize) {
        (
            self.core.storage.vertex_count(),
            self.core.storage.edge_count(),
        )
    }
}

impl Drop for GraphDB {
    fn drop(&mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.snapshot_worker.take() {
            let _ = handle.join();
        }
        if let Some(wal) = &*self.core.wal.read() {
            let _ = wal.flush_pending();
        }
    }
}
