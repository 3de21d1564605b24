//! Transaction-bound façade over the graph storage.
//!
//! A [`GraphAccessor`] is created per transaction; every read goes through
//! the MVCC visibility filter and every mutation appends a WAL delta.
//! [`VertexAccessor`] and [`EdgeAccessor`] resolve the record version seen
//! by the transaction and can be switched between the old (pre-command)
//! and new (current-command) views.

use std::cell::Cell;
use std::ops::Bound;
use std::sync::Arc;

use tracing::debug;

use crate::durability::wal::{Delta, EntityKind};
use crate::error::{GraphError, Result};
use crate::ids::{EdgeTypeId, Gid, LabelId, PropertyId, PropertyKey};
use crate::storage::edge::Edge;
use crate::storage::indexes::OrderedValue;
use crate::storage::mvcc::{Record, VersionList, View};
use crate::storage::property_value::PropertyValue;
use crate::storage::vertex::{EdgeRef, Vertex};
use crate::storage::GraphStorage;
use crate::tx::{Engine, Transaction};

use super::DbCore;

pub struct GraphAccessor<'db> {
    db: &'db DbCore,
    tx: Arc<Transaction>,
    log_to_wal: bool,
    finished: Cell<bool>,
}

impl<'db> GraphAccessor<'db> {
    pub(crate) fn new(db: &'db DbCore, tx: Arc<Transaction>, log_to_wal: bool) -> Result<Self> {
        let accessor = Self {
            db,
            tx,
            log_to_wal,
            finished: Cell::new(false),
        };
        accessor.emplace_wal(Delta::TxBegin {
            tx: accessor.tx.id(),
        })?;
        Ok(accessor)
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.db.engine
    }

    pub(crate) fn storage(&self) -> &GraphStorage {
        &self.db.storage
    }

    /// Ends the current command; reads through the old view now observe
    /// everything written so far in this transaction.
    pub fn advance_command(&self) {
        self.tx.advance_command();
    }

    /// Query deadline from the configured execution timeout.
    pub(crate) fn query_timeout(&self) -> Option<std::time::Duration> {
        let secs = self.db.config.query_execution_timeout_sec;
        (secs > 0).then(|| std::time::Duration::from_secs(secs as u64))
    }

    fn emplace_wal(&self, delta: Delta) -> Result<()> {
        if !self.log_to_wal {
            return Ok(());
        }
        if let Some(wal) = &*self.db.wal.read() {
            wal.emplace(&delta)?;
        }
        Ok(())
    }

    // Interner passthroughs.

    pub fn label(&self, name: &str) -> LabelId {
        self.storage().label(name)
    }

    pub fn label_name(&self, id: LabelId) -> String {
        self.storage().label_name(id)
    }

    pub fn edge_type(&self, name: &str) -> EdgeTypeId {
        self.storage().edge_type(name)
    }

    pub fn edge_type_name(&self, id: EdgeTypeId) -> String {
        self.storage().edge_type_name(id)
    }

    pub fn property(&self, name: &str) -> PropertyKey {
        self.storage().property(name)
    }

    pub fn property_name(&self, id: PropertyId) -> String {
        self.storage().property_name(id)
    }

    // Record creation and deletion.

    pub fn insert_vertex(&self) -> Result<VertexAccessor<'_>> {
        self.insert_vertex_at(None)
    }

    pub(crate) fn insert_vertex_at(&self, gid: Option<Gid>) -> Result<VertexAccessor<'_>> {
        let (gid, vlist) = self.storage().create_vertex(&self.tx, gid);
        self.emplace_wal(Delta::VertexCreate {
            tx: self.tx.id(),
            gid,
        })?;
        Ok(VertexAccessor::attach(self, vlist))
    }

    pub fn insert_edge(
        &self,
        from: &VertexAccessor<'_>,
        to: &VertexAccessor<'_>,
        edge_type: EdgeTypeId,
    ) -> Result<EdgeAccessor<'_>> {
        self.insert_edge_at(None, from.gid(), to.gid(), edge_type)
    }

    pub(crate) fn insert_edge_at(
        &self,
        gid: Option<Gid>,
        from: Gid,
        to: Gid,
        edge_type: EdgeTypeId,
    ) -> Result<EdgeAccessor<'_>> {
        let from_vlist = self
            .storage()
            .vertex(from)
            .ok_or(GraphError::NotFound("vertex"))?;
        let to_vlist = self
            .storage()
            .vertex(to)
            .ok_or(GraphError::NotFound("vertex"))?;
        // Fresh endpoint versions are created first so write conflicts
        // surface before the edge record exists.
        let from_record = from_vlist.update(&self.tx, self.engine())?;
        let to_record = if from == to {
            from_record.clone()
        } else {
            to_vlist.update(&self.tx, self.engine())?
        };
        let (gid, elist) = self
            .storage()
            .create_edge(&self.tx, gid, from, to, edge_type);
        from_record.data_mut().out_edges.push(EdgeRef {
            edge: gid,
            other_vertex: to,
            edge_type,
        });
        to_record.data_mut().in_edges.push(EdgeRef {
            edge: gid,
            other_vertex: from,
            edge_type,
        });
        self.emplace_wal(Delta::EdgeCreate {
            tx: self.tx.id(),
            gid,
            from,
            to,
            edge_type: self.edge_type_name(edge_type),
        })?;
        Ok(EdgeAccessor::attach(self, elist))
    }

    /// Expires the vertex; fails when it still has incident edges visible
    /// to this transaction.
    pub fn delete_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<()> {
        let mut vertex = vertex.clone();
        vertex.switch_new();
        let current = vertex.current()?;
        {
            let data = current.data();
            if !data.out_edges.is_empty() || !data.in_edges.is_empty() {
                return Err(GraphError::ConstraintViolation(
                    "vertex has incident edges, detach delete required".into(),
                ));
            }
        }
        match vertex.vlist.remove(&self.tx, self.engine()) {
            Ok(()) => {}
            Err(GraphError::RecordDeleted) => return Ok(()),
            Err(err) => return Err(err),
        }
        self.emplace_wal(Delta::VertexDelete {
            tx: self.tx.id(),
            gid: vertex.gid(),
        })?;
        debug!(tx_id = self.tx.id(), gid = %vertex.gid(), "vertex deleted");
        Ok(())
    }

    /// Deletes the vertex's incident edges first, then the vertex.
    pub fn detach_delete_vertex(&self, vertex: &VertexAccessor<'_>) -> Result<()> {
        let mut vertex = vertex.clone();
        vertex.switch_new();
        let current = vertex.current()?;
        let mut edge_gids: Vec<Gid> = Vec::new();
        {
            let data = current.data();
            for edge_ref in data.out_edges.iter().chain(data.in_edges.iter()) {
                if !edge_gids.contains(&edge_ref.edge) {
                    edge_gids.push(edge_ref.edge);
                }
            }
        }
        for gid in edge_gids {
            if let Some(edge) = self.edge(gid, View::New) {
                self.delete_edge(&edge)?;
            }
        }
        self.delete_vertex(&vertex)
    }

    /// Expires the edge and removes its refs from both endpoints' new
    /// versions.
    pub fn delete_edge(&self, edge: &EdgeAccessor<'_>) -> Result<()> {
        let mut edge = edge.clone();
        edge.switch_new();
        let (gid, from, to) = {
            let current = edge.current()?;
            let data = current.data();
            (edge.gid(), data.from, data.to)
        };
        match edge.elist.remove(&self.tx, self.engine()) {
            Ok(()) => {}
            Err(GraphError::RecordDeleted) => return Ok(()),
            Err(err) => return Err(err),
        }
        if let Some(from_vlist) = self.storage().vertex(from) {
            let record = from_vlist.update(&self.tx, self.engine())?;
            record.data_mut().out_edges.retain(|r| r.edge != gid);
        }
        if let Some(to_vlist) = self.storage().vertex(to) {
            let record = to_vlist.update(&self.tx, self.engine())?;
            record.data_mut().in_edges.retain(|r| r.edge != gid);
        }
        self.emplace_wal(Delta::EdgeDelete {
            tx: self.tx.id(),
            gid,
        })?;
        Ok(())
    }

    // Lookups and scans.

    /// The vertex under `gid` if it is visible in `view`.
    pub fn vertex(&self, gid: Gid, view: View) -> Option<VertexAccessor<'_>> {
        let vlist = self.storage().vertex(gid)?;
        vlist.visible_version(&self.tx, self.engine(), view)?;
        let mut vertex = VertexAccessor::attach(self, vlist);
        vertex.switch_view(view);
        Some(vertex)
    }

    /// The vertex under `gid` regardless of visibility, for resolving edge
    /// endpoints.
    pub(crate) fn vertex_any(&self, gid: Gid) -> Option<VertexAccessor<'_>> {
        let vlist = self.storage().vertex(gid)?;
        Some(VertexAccessor::attach(self, vlist))
    }

    pub fn edge(&self, gid: Gid, view: View) -> Option<EdgeAccessor<'_>> {
        let elist = self.storage().edge(gid)?;
        elist.visible_version(&self.tx, self.engine(), view)?;
        let mut edge = EdgeAccessor::attach(self, elist);
        edge.switch_view(view);
        Some(edge)
    }

    /// Lazy sequence of vertices visible in `view`.
    pub fn vertices(&self, view: View) -> impl Iterator<Item = VertexAccessor<'_>> + '_ {
        self.storage()
            .vertices_snapshot()
            .into_iter()
            .filter_map(move |(_, vlist)| {
                vlist.visible_version(&self.tx, self.engine(), view)?;
                let mut vertex = VertexAccessor::attach(self, vlist);
                vertex.switch_view(view);
                Some(vertex)
            })
    }

    pub fn edges(&self, view: View) -> impl Iterator<Item = EdgeAccessor<'_>> + '_ {
        self.storage()
            .edges_snapshot()
            .into_iter()
            .filter_map(move |(_, elist)| {
                elist.visible_version(&self.tx, self.engine(), view)?;
                let mut edge = EdgeAccessor::attach(self, elist);
                edge.switch_view(view);
                Some(edge)
            })
    }

    /// Vertices bearing `label`, via the label index.
    pub fn vertices_by_label(
        &self,
        label: LabelId,
        view: View,
    ) -> impl Iterator<Item = VertexAccessor<'_>> + '_ {
        self.storage()
            .label_index
            .access(label)
            .into_iter()
            .filter_map(move |(_, vlist)| {
                let version = vlist.visible_version(&self.tx, self.engine(), view)?;
                if !version.data().has_label(label) {
                    return None;
                }
                let mut vertex = VertexAccessor::attach(self, vlist);
                vertex.switch_view(view);
                Some(vertex)
            })
    }

    /// Indexed point lookup on `(label, property) == value`.
    pub fn vertices_by_label_property_value(
        &self,
        label: LabelId,
        property: PropertyKey,
        value: &PropertyValue,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        let target = OrderedValue(value.clone());
        self.storage()
            .label_property_index
            .point(label, property.id, value)
            .into_iter()
            .filter_map(|(_, vlist)| {
                let version = vlist.visible_version(&self.tx, self.engine(), view)?;
                {
                    let data = version.data();
                    if !data.has_label(label) {
                        return None;
                    }
                    let current = data.props.at(property).ok()?;
                    if OrderedValue(current) != target {
                        return None;
                    }
                }
                let mut vertex = VertexAccessor::attach(self, vlist);
                vertex.switch_view(view);
                Some(vertex)
            })
            .collect()
    }

    /// Indexed range scan on `(label, property)`, in value order.
    pub fn vertices_by_label_property_range(
        &self,
        label: LabelId,
        property: PropertyKey,
        lower: Bound<PropertyValue>,
        upper: Bound<PropertyValue>,
        view: View,
    ) -> Vec<VertexAccessor<'_>> {
        let lower = map_bound(lower);
        let upper = map_bound(upper);
        self.storage()
            .label_property_index
            .range(label, property.id, lower, upper)
            .into_iter()
            .filter_map(|(indexed_value, (_, vlist))| {
                let version = vlist.visible_version(&self.tx, self.engine(), view)?;
                {
                    let data = version.data();
                    if !data.has_label(label) {
                        return None;
                    }
                    let current = data.props.at(property).ok()?;
                    if OrderedValue(current) != OrderedValue(indexed_value) {
                        return None;
                    }
                }
                let mut vertex = VertexAccessor::attach(self, vlist);
                vertex.switch_view(view);
                Some(vertex)
            })
            .collect()
    }

    pub fn vertices_count(&self, view: View) -> usize {
        self.vertices(view).count()
    }

    pub fn edges_count(&self, view: View) -> usize {
        self.edges(view).count()
    }

    // Index management.

    /// Creates the `(label, property)` index and populates it from the
    /// currently visible vertices.
    pub fn build_index(&self, label: LabelId, property: PropertyKey) -> Result<()> {
        if !self
            .storage()
            .label_property_index
            .create(label, property.id)
        {
            return Err(GraphError::InvalidArgument(format!(
                "index on ({}, {}) already exists",
                self.label_name(label),
                self.property_name(property.id)
            )));
        }
        for vertex in self.vertices(View::New) {
            let version = vertex.current()?;
            let data = version.data();
            if !data.has_label(label) {
                continue;
            }
            let value = data.props.at(property)?;
            self.storage().label_property_index.add(
                label,
                property.id,
                &value,
                vertex.gid(),
                Arc::clone(&vertex.vlist),
            );
        }
        self.emplace_wal(Delta::BuildIndex {
            tx: self.tx.id(),
            label: self.label_name(label),
            property: self.property_name(property.id),
        })?;
        Ok(())
    }

    pub fn label_property_index_exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.storage().label_property_index.exists(label, property)
    }

    pub fn index_keys(&self) -> Vec<(LabelId, PropertyId)> {
        self.storage().label_property_index.keys()
    }

    // Lifecycle.

    /// Commits: the transaction's WAL records are made durable before the
    /// commit is acknowledged.
    pub fn commit(self) -> Result<()> {
        self.finished.set(true);
        let commit = self.emplace_wal(Delta::TxCommit { tx: self.tx.id() });
        match commit {
            Ok(()) => {
                self.engine().commit(&self.tx);
                Ok(())
            }
            Err(err) => {
                self.engine().abort(&self.tx);
                Err(err)
            }
        }
    }

    pub fn abort(self) {
        self.finished.set(true);
        let _ = self.emplace_wal(Delta::TxAbort { tx: self.tx.id() });
        self.engine().abort(&self.tx);
    }
}

impl Drop for GraphAccessor<'_> {
    fn drop(&mut self) {
        if !self.finished.get() {
            let _ = self.emplace_wal(Delta::TxAbort { tx: self.tx.id() });
            self.engine().abort(&self.tx);
        }
    }
}

fn map_bound(bound: Bound<PropertyValue>) -> Bound<OrderedValue> {
    match bound {
        Bound::Included(value) => Bound::Included(OrderedValue(value)),
        Bound::Excluded(value) => Bound::Excluded(OrderedValue(value)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

/// Accessor over one vertex record, bound to the accessor's transaction.
#[derive(Clone)]
pub struct VertexAccessor<'a> {
    dba: &'a GraphAccessor<'a>,
    pub(crate) vlist: Arc<VersionList<Vertex>>,
    old: Option<Arc<Record<Vertex>>>,
    new: Option<Arc<Record<Vertex>>>,
    use_new: bool,
}

impl<'a> VertexAccessor<'a> {
    fn attach(dba: &'a GraphAccessor<'a>, vlist: Arc<VersionList<Vertex>>) -> Self {
        let (old, new) = vlist.find_set_old_new(dba.transaction(), dba.engine());
        let use_new = new.is_some() && old.is_none();
        Self {
            dba,
            vlist,
            old,
            new,
            use_new,
        }
    }

    pub fn gid(&self) -> Gid {
        self.vlist.gid()
    }

    /// Re-resolves the old/new version pointers, e.g. after a command
    /// advance.
    pub fn reconstruct(&mut self) {
        let (old, new) = self
            .vlist
            .find_set_old_new(self.dba.transaction(), self.dba.engine());
        self.old = old;
        self.new = new;
    }

    /// Observe the latest version written by this transaction.
    pub fn switch_new(&mut self) -> &mut Self {
        if self.new.is_none() {
            self.reconstruct();
        }
        self.use_new = true;
        self
    }

    /// Observe the version that existed before the current command.
    pub fn switch_old(&mut self) -> &mut Self {
        self.use_new = false;
        self
    }

    pub(crate) fn switch_view(&mut self, view: View) {
        match view {
            View::New => self.switch_new(),
            View::Old => self.switch_old(),
        };
    }

    pub(crate) fn current(&self) -> Result<Arc<Record<Vertex>>> {
        let version = if self.use_new {
            self.new.clone().or_else(|| self.old.clone())
        } else {
            self.old.clone().or_else(|| self.new.clone())
        };
        version.ok_or(GraphError::NotFound("vertex version"))
    }

    /// Whether the record exists in `view` for this transaction.
    pub fn is_visible(&self, view: View) -> bool {
        self.vlist
            .visible_version(self.dba.transaction(), self.dba.engine(), view)
            .is_some()
    }

    pub fn labels(&self) -> Result<Vec<LabelId>> {
        Ok(self.current()?.data().labels.to_vec())
    }

    pub fn has_label(&self, label: LabelId) -> Result<bool> {
        Ok(self.current()?.data().has_label(label))
    }

    pub fn props_at(&self, key: PropertyKey) -> Result<PropertyValue> {
        self.current()?.data().props.at(key)
    }

    pub fn properties(&self) -> Result<Vec<(PropertyKey, PropertyValue)>> {
        self.current()?.data().props.pairs()
    }

    pub fn out_refs(&self) -> Result<Vec<EdgeRef>> {
        Ok(self.current()?.data().out_edges.clone())
    }

    pub fn in_refs(&self) -> Result<Vec<EdgeRef>> {
        Ok(self.current()?.data().in_edges.clone())
    }

    fn update(&mut self) -> Result<Arc<Record<Vertex>>> {
        let record = self
            .vlist
            .update(self.dba.transaction(), self.dba.engine())?;
        self.new = Some(record.clone());
        Ok(record)
    }

    pub fn add_label(&mut self, label: LabelId) -> Result<()> {
        let record = self.update()?;
        let added = record.data_mut().add_label(label);
        if !added {
            return Ok(());
        }
        self.dba
            .storage()
            .label_index
            .add(label, self.gid(), Arc::clone(&self.vlist));
        self.refresh_property_index(&record, Some(label))?;
        self.dba.emplace_wal(Delta::AddLabel {
            tx: self.dba.transaction().id(),
            gid: self.gid(),
            label: self.dba.label_name(label),
        })
    }

    pub fn remove_label(&mut self, label: LabelId) -> Result<()> {
        let record = self.update()?;
        let removed = record.data_mut().remove_label(label);
        if !removed {
            return Ok(());
        }
        self.dba.emplace_wal(Delta::RemoveLabel {
            tx: self.dba.transaction().id(),
            gid: self.gid(),
            label: self.dba.label_name(label),
        })
    }

    pub fn props_set(&mut self, key: PropertyKey, value: PropertyValue) -> Result<()> {
        if value.is_null() {
            return self.props_erase(key);
        }
        let record = self.update()?;
        record.data_mut().props.set(key, value.clone())?;
        self.refresh_property_index(&record, None)?;
        self.dba.emplace_wal(Delta::SetProperty {
            tx: self.dba.transaction().id(),
            entity: EntityKind::Vertex,
            gid: self.gid(),
            property: self.dba.property_name(key.id),
            value,
        })
    }

    pub fn props_erase(&mut self, key: PropertyKey) -> Result<()> {
        let record = self.update()?;
        record.data_mut().props.erase(key)?;
        self.dba.emplace_wal(Delta::EraseProperty {
            tx: self.dba.transaction().id(),
            entity: EntityKind::Vertex,
            gid: self.gid(),
            property: self.dba.property_name(key.id),
        })
    }

    pub fn props_clear(&mut self) -> Result<()> {
        let keys: Vec<PropertyKey> = self
            .properties()?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.props_erase(key)?;
        }
        Ok(())
    }

    /// Re-registers this record under every built `(label, property)`
    /// index it now qualifies for.
    fn refresh_property_index(
        &self,
        record: &Arc<Record<Vertex>>,
        only_label: Option<LabelId>,
    ) -> Result<()> {
        let keys = self.dba.index_keys();
        if keys.is_empty() {
            return Ok(());
        }
        let data = record.data();
        for (label, property_id) in keys {
            if let Some(target) = only_label {
                if label != target {
                    continue;
                }
            }
            if !data.has_label(label) {
                continue;
            }
            let key = self.dba.storage().property_key(property_id);
            let value = data.props.at(key)?;
            self.dba.storage().label_property_index.add(
                label,
                property_id,
                &value,
                self.gid(),
                Arc::clone(&self.vlist),
            );
        }
        Ok(())
    }
}

impl PartialEq for VertexAccessor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.gid() == other.gid()
    }
}

impl Eq for VertexAccessor<'_> {}

impl std::fmt::Debug for VertexAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VertexAccessor")
            .field("gid", &self.gid())
            .finish_non_exhaustive()
    }
}

/// Accessor over one edge record, bound to the accessor's transaction.
#[derive(Clone)]
pub struct EdgeAccessor<'a> {
    dba: &'a GraphAccessor<'a>,
    pub(crate) elist: Arc<VersionList<Edge>>,
    old: Option<Arc<Record<Edge>>>,
    new: Option<Arc<Record<Edge>>>,
    use_new: bool,
}

impl<'a> EdgeAccessor<'a> {
    fn attach(dba: &'a GraphAccessor<'a>, elist: Arc<VersionList<Edge>>) -> Self {
        let (old, new) = elist.find_set_old_new(dba.transaction(), dba.engine());
        let use_new = new.is_some() && old.is_none();
        Self {
            dba,
            elist,
            old,
            new,
            use_new,
        }
    }

    pub fn gid(&self) -> Gid {
        self.elist.gid()
    }

    pub fn reconstruct(&mut self) {
        let (old, new) = self
            .elist
            .find_set_old_new(self.dba.transaction(), self.dba.engine());
        self.old = old;
        self.new = new;
    }

    pub fn switch_new(&mut self) -> &mut Self {
        if self.new.is_none() {
            self.reconstruct();
        }
        self.use_new = true;
        self
    }

    pub fn switch_old(&mut self) -> &mut Self {
        self.use_new = false;
        self
    }

    pub(crate) fn switch_view(&mut self, view: View) {
        match view {
            View::New => self.switch_new(),
            View::Old => self.switch_old(),
        };
    }

    pub(crate) fn current(&self) -> Result<Arc<Record<Edge>>> {
        let version = if self.use_new {
            self.new.clone().or_else(|| self.old.clone())
        } else {
            self.old.clone().or_else(|| self.new.clone())
        };
        version.ok_or(GraphError::NotFound("edge version"))
    }

    pub fn is_visible(&self, view: View) -> bool {
        self.elist
            .visible_version(self.dba.transaction(), self.dba.engine(), view)
            .is_some()
    }

    pub fn edge_type(&self) -> Result<EdgeTypeId> {
        Ok(self.current()?.data().edge_type)
    }

    pub fn from(&self) -> Result<VertexAccessor<'a>> {
        let gid = self.current()?.data().from;
        self.dba
            .vertex_any(gid)
            .ok_or(GraphError::NotFound("vertex"))
    }

    pub fn to(&self) -> Result<VertexAccessor<'a>> {
        let gid = self.current()?.data().to;
        self.dba
            .vertex_any(gid)
            .ok_or(GraphError::NotFound("vertex"))
    }

    pub fn props_at(&self, key: PropertyKey) -> Result<PropertyValue> {
        self.current()?.data().props.at(key)
    }

    pub fn properties(&self) -> Result<Vec<(PropertyKey, PropertyValue)>> {
        self.current()?.data().props.pairs()
    }

    fn update(&mut self) -> Result<Arc<Record<Edge>>> {
        let record = self
            .elist
            .update(self.dba.transaction(), self.dba.engine())?;
        self.new = Some(record.clone());
        Ok(record)
    }

    pub fn props_set(&mut self, key: PropertyKey, value: PropertyValue) -> Result<()> {
        if value.is_null() {
            return self.props_erase(key);
        }
        let record = self.update()?;
        record.data_mut().props.set(key, value.clone())?;
        self.dba.emplace_wal(Delta::SetProperty {
            tx: self.dba.transaction().id(),
            entity: EntityKind::Edge,
            gid: self.gid(),
            property: self.dba.property_name(key.id),
            value,
        })
    }

    pub fn props_erase(&mut self, key: PropertyKey) -> Result<()> {
        let record = self.update()?;
        record.data_mut().props.erase(key)?;
        self.dba.emplace_wal(Delta::EraseProperty {
            tx: self.dba.transaction().id(),
            entity: EntityKind::Edge,
            gid: self.gid(),
            property: self.dba.property_name(key.id),
        })
    }

    pub fn props_clear(&mut self) -> Result<()> {
        let keys: Vec<PropertyKey> = self
            .properties()?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            self.props_erase(key)?;
        }
        Ok(())
    }
}

impl PartialEq for EdgeAccessor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.gid() == other.gid()
    }
}

impl Eq for EdgeAccessor<'_> {}

impl std::fmt::Debug for EdgeAccessor<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeAccessor")
            .field("gid", &self.gid())
            .finish_non_exhaustive()
    }
}
