//! Indexed collections of vertex and edge records.
//!
//! Records live in per-type arenas keyed by stable [`Gid`]s; references
//! between records (edge endpoints, incident-edge lists) are ids resolved
//! through the arena, never pointers.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::ids::{EdgeTypeId, Gid, LabelId, Location, NameIdMapper, PropertyId, PropertyKey};
use crate::storage::edge::Edge;
use crate::storage::indexes::{LabelIndex, LabelPropertyIndex};
use crate::storage::kvstore::KvBackend;
use crate::storage::mvcc::VersionList;
use crate::storage::props::PropertyValueStore;
use crate::storage::vertex::Vertex;
use crate::tx::{Engine, Transaction};

pub struct GraphStorage {
    vertex_counter: AtomicU64,
    edge_counter: AtomicU64,
    vertices: RwLock<BTreeMap<Gid, Arc<VersionList<Vertex>>>>,
    edges: RwLock<BTreeMap<Gid, Arc<VersionList<Edge>>>>,
    labels: NameIdMapper,
    edge_types: NameIdMapper,
    properties: NameIdMapper,
    properties_on_disk: HashSet<String>,
    pub(crate) label_index: LabelIndex,
    pub(crate) label_property_index: LabelPropertyIndex,
    kv: Arc<dyn KvBackend>,
}

impl GraphStorage {
    pub fn new(kv: Arc<dyn KvBackend>, properties_on_disk: Vec<String>) -> Self {
        Self {
            vertex_counter: AtomicU64::new(0),
            edge_counter: AtomicU64::new(0),
            vertices: RwLock::new(BTreeMap::new()),
            edges: RwLock::new(BTreeMap::new()),
            labels: NameIdMapper::new(),
            edge_types: NameIdMapper::new(),
            properties: NameIdMapper::new(),
            properties_on_disk: properties_on_disk.into_iter().collect(),
            label_index: LabelIndex::default(),
            label_property_index: LabelPropertyIndex::default(),
            kv,
        }
    }

    pub fn kv(&self) -> Arc<dyn KvBackend> {
        Arc::clone(&self.kv)
    }

    pub fn new_property_store(&self) -> PropertyValueStore {
        PropertyValueStore::new(self.kv())
    }

    // Interners.

    pub fn label(&self, name: &str) -> LabelId {
        LabelId(self.labels.intern(name))
    }

    pub fn label_name(&self, id: LabelId) -> String {
        self.labels.name(id.0).unwrap_or_default()
    }

    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        EdgeTypeId(self.edge_types.intern(name))
    }

    pub fn edge_type_name(&self, id: EdgeTypeId) -> String {
        self.edge_types.name(id.0).unwrap_or_default()
    }

    /// Interns a property name; the location hint comes from the
    /// `properties_on_disk` configuration.
    pub fn property(&self, name: &str) -> PropertyKey {
        let location = if self.properties_on_disk.contains(name) {
            Location::Disk
        } else {
            Location::Memory
        };
        PropertyKey::new(PropertyId(self.properties.intern(name)), location)
    }

    pub fn property_name(&self, id: PropertyId) -> String {
        self.properties.name(id.0).unwrap_or_default()
    }

    /// Reconstructs the full key (id + location hint) for an interned
    /// property id.
    pub fn property_key(&self, id: PropertyId) -> PropertyKey {
        let location = match self.properties.name(id.0) {
            Some(name) if self.properties_on_disk.contains(&name) => Location::Disk,
            _ => Location::Memory,
        };
        PropertyKey::new(id, location)
    }

    // Record arenas.

    /// Creates a fresh vertex chain visible only to `tx`. An explicit gid
    /// is honoured during recovery replay.
    pub fn create_vertex(
        &self,
        tx: &Transaction,
        gid: Option<Gid>,
    ) -> (Gid, Arc<VersionList<Vertex>>) {
        let gid = match gid {
            Some(gid) => {
                self.vertex_counter.fetch_max(gid.0 + 1, Ordering::AcqRel);
                gid
            }
            None => Gid(self.vertex_counter.fetch_add(1, Ordering::AcqRel)),
        };
        let payload = Vertex::new(self.new_property_store());
        let vlist = Arc::new(VersionList::new(gid, payload, tx));
        self.vertices.write().insert(gid, Arc::clone(&vlist));
        (gid, vlist)
    }

    pub fn create_edge(
        &self,
        tx: &Transaction,
        gid: Option<Gid>,
        from: Gid,
        to: Gid,
        edge_type: EdgeTypeId,
    ) -> (Gid, Arc<VersionList<Edge>>) {
        let gid = match gid {
            Some(gid) => {
                self.edge_counter.fetch_max(gid.0 + 1, Ordering::AcqRel);
                gid
            }
            None => Gid(self.edge_counter.fetch_add(1, Ordering::AcqRel)),
        };
        let payload = Edge::new(from, to, edge_type, self.new_property_store());
        let elist = Arc::new(VersionList::new(gid, payload, tx));
        self.edges.write().insert(gid, Arc::clone(&elist));
        (gid, elist)
    }

    pub fn vertex(&self, gid: Gid) -> Option<Arc<VersionList<Vertex>>> {
        self.vertices.read().get(&gid).cloned()
    }

    pub fn edge(&self, gid: Gid) -> Option<Arc<VersionList<Edge>>> {
        self.edges.read().get(&gid).cloned()
    }

    pub fn vertices_snapshot(&self) -> Vec<(Gid, Arc<VersionList<Vertex>>)> {
        self.vertices
            .read()
            .iter()
            .map(|(gid, vlist)| (*gid, Arc::clone(vlist)))
            .collect()
    }

    pub fn edges_snapshot(&self) -> Vec<(Gid, Arc<VersionList<Edge>>)> {
        self.edges
            .read()
            .iter()
            .map(|(gid, elist)| (*gid, Arc::clone(elist)))
            .collect()
    }

    /// Physically removes versions invisible to every live reader and
    /// recycles dead records. Runs behind `engine.gc_floor()`.
    pub fn collect_garbage(&self, engine: &Engine) {
        let floor = engine.gc_floor();
        let mut dead_vertices = Vec::new();
        for (gid, vlist) in self.vertices_snapshot() {
            if vlist.prune(engine, floor) {
                dead_vertices.push(gid);
            }
        }
        let mut dead_edges = Vec::new();
        for (gid, elist) in self.edges_snapshot() {
            if elist.prune(engine, floor) {
                dead_edges.push(gid);
            }
        }
        if !dead_vertices.is_empty() {
            let mut vertices = self.vertices.write();
            for gid in &dead_vertices {
                vertices.remove(gid);
            }
        }
        if !dead_edges.is_empty() {
            let mut edges = self.edges.write();
            for gid in &dead_edges {
                edges.remove(gid);
            }
        }
        if !dead_vertices.is_empty() || !dead_edges.is_empty() {
            let vertices = self.vertices.read();
            self.label_index.cleanup(|gid| vertices.contains_key(&gid));
            self.label_property_index
                .cleanup(|gid| vertices.contains_key(&gid));
            info!(
                floor,
                vertices = dead_vertices.len(),
                edges = dead_edges.len(),
                "garbage collected dead records"
            );
        } else {
            debug!(floor, "garbage collection pass found nothing to reclaim");
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.read().len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }
}

impl std::fmt::Debug for GraphStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStorage")
            .field("vertices", &self.vertices.read().len())
            .field("edges", &self.edges.read().len())
            .finish_non_exhaustive()
    }
}
