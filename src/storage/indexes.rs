//! Secondary indexes over vertex records.
//!
//! Both indexes hold possibly-stale entries; scans re-verify label, value,
//! and version visibility at the accessor layer, and the garbage collector
//! drops entries whose chains are gone.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::ids::{Gid, LabelId, PropertyId};
use crate::storage::mvcc::VersionList;
use crate::storage::property_value::PropertyValue;
use crate::storage::vertex::Vertex;

pub type VertexEntry = (Gid, Arc<VersionList<Vertex>>);

/// Property value under the total order used by the label+property index
/// and ORDER BY: bool < number < string < list < map, numbers compared
/// across int/double.
#[derive(Clone, Debug)]
pub struct OrderedValue(pub PropertyValue);

impl OrderedValue {
    fn rank(&self) -> u8 {
        match &self.0 {
            PropertyValue::Null => 0,
            PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) | PropertyValue::Double(_) => 2,
            PropertyValue::String(_) => 3,
            PropertyValue::List(_) => 4,
            PropertyValue::Map(_) => 5,
        }
    }
}

impl PartialEq for OrderedValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for OrderedValue {}

impl PartialOrd for OrderedValue {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedValue {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        let rank = self.rank().cmp(&other.rank());
        if rank != CmpOrdering::Equal {
            return rank;
        }
        match (&self.0, &other.0) {
            (PropertyValue::Null, PropertyValue::Null) => CmpOrdering::Equal,
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a.cmp(b),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.cmp(b),
            (a, b) => match (numeric(a), numeric(b)) {
                (Some(a), Some(b)) => a.total_cmp(&b),
                _ => match (&self.0, &other.0) {
                    (PropertyValue::String(a), PropertyValue::String(b)) => a.cmp(b),
                    (PropertyValue::List(a), PropertyValue::List(b)) => {
                        for (x, y) in a.iter().zip(b.iter()) {
                            let ord = OrderedValue(x.clone()).cmp(&OrderedValue(y.clone()));
                            if ord != CmpOrdering::Equal {
                                return ord;
                            }
                        }
                        a.len().cmp(&b.len())
                    }
                    (PropertyValue::Map(a), PropertyValue::Map(b)) => {
                        for ((ka, va), (kb, vb)) in a.iter().zip(b.iter()) {
                            let ord = ka.cmp(kb);
                            if ord != CmpOrdering::Equal {
                                return ord;
                            }
                            let ord = OrderedValue(va.clone()).cmp(&OrderedValue(vb.clone()));
                            if ord != CmpOrdering::Equal {
                                return ord;
                            }
                        }
                        a.len().cmp(&b.len())
                    }
                    _ => CmpOrdering::Equal,
                },
            },
        }
    }
}

fn numeric(value: &PropertyValue) -> Option<f64> {
    match value {
        PropertyValue::Int(v) => Some(*v as f64),
        PropertyValue::Double(v) => Some(*v),
        _ => None,
    }
}

/// Label id → vertex records bearing the label in some version.
#[derive(Debug, Default)]
pub struct LabelIndex {
    entries: RwLock<HashMap<LabelId, Arc<RwLock<Vec<VertexEntry>>>>>,
}

impl LabelIndex {
    pub fn add(&self, label: LabelId, gid: Gid, vlist: Arc<VersionList<Vertex>>) {
        let bucket = {
            let entries = self.entries.read();
            entries.get(&label).cloned()
        };
        let bucket = match bucket {
            Some(bucket) => bucket,
            None => self
                .entries
                .write()
                .entry(label)
                .or_insert_with(|| Arc::new(RwLock::new(Vec::new())))
                .clone(),
        };
        let mut bucket = bucket.write();
        if !bucket.iter().any(|(existing, _)| *existing == gid) {
            bucket.push((gid, vlist));
        }
    }

    /// Snapshot of candidate records; callers filter by visibility.
    pub fn access(&self, label: LabelId) -> Vec<VertexEntry> {
        self.entries
            .read()
            .get(&label)
            .map(|bucket| bucket.read().clone())
            .unwrap_or_default()
    }

    /// Lazy cleanup: drops entries whose record is gone.
    pub fn cleanup(&self, keep: impl Fn(Gid) -> bool) {
        for bucket in self.entries.read().values() {
            bucket.write().retain(|(gid, _)| keep(*gid));
        }
    }
}

type ValueTree = BTreeMap<OrderedValue, Vec<VertexEntry>>;

/// `(label, property)` → ordered map keyed by property value, created
/// explicitly by `build_index`.
#[derive(Debug, Default)]
pub struct LabelPropertyIndex {
    indices: RwLock<HashMap<(LabelId, PropertyId), Arc<RwLock<ValueTree>>>>,
}

impl LabelPropertyIndex {
    /// Registers the index key; returns false when it already exists.
    pub fn create(&self, label: LabelId, property: PropertyId) -> bool {
        let mut indices = self.indices.write();
        if indices.contains_key(&(label, property)) {
            return false;
        }
        indices.insert((label, property), Arc::new(RwLock::new(BTreeMap::new())));
        true
    }

    pub fn exists(&self, label: LabelId, property: PropertyId) -> bool {
        self.indices.read().contains_key(&(label, property))
    }

    pub fn keys(&self) -> Vec<(LabelId, PropertyId)> {
        let mut keys: Vec<_> = self.indices.read().keys().copied().collect();
        keys.sort();
        keys
    }

    /// Inserts an entry when the `(label, property)` index exists.
    pub fn add(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
        gid: Gid,
        vlist: Arc<VersionList<Vertex>>,
    ) {
        if value.is_null() {
            return;
        }
        let tree = {
            let indices = self.indices.read();
            match indices.get(&(label, property)) {
                Some(tree) => tree.clone(),
                None => return,
            }
        };
        let mut tree = tree.write();
        let slot = tree.entry(OrderedValue(value.clone())).or_default();
        if !slot.iter().any(|(existing, _)| *existing == gid) {
            slot.push((gid, vlist));
        }
    }

    /// Candidates holding exactly `value`; callers re-verify visibility.
    pub fn point(
        &self,
        label: LabelId,
        property: PropertyId,
        value: &PropertyValue,
    ) -> Vec<VertexEntry> {
        let indices = self.indices.read();
        let Some(tree) = indices.get(&(label, property)) else {
            return Vec::new();
        };
        let result = tree
            .read()
            .get(&OrderedValue(value.clone()))
            .cloned()
            .unwrap_or_default();
        result
    }

    /// Candidates within the bounds, in value order, paired with the value
    /// they were indexed under so callers can re-verify.
    pub fn range(
        &self,
        label: LabelId,
        property: PropertyId,
        lower: Bound<OrderedValue>,
        upper: Bound<OrderedValue>,
    ) -> Vec<(PropertyValue, VertexEntry)> {
        let indices = self.indices.read();
        let Some(tree) = indices.get(&(label, property)) else {
            return Vec::new();
        };
        let tree = tree.read();
        let mut out = Vec::new();
        for (value, slot) in tree.range((lower, upper)) {
            for entry in slot {
                out.push((value.0.clone(), entry.clone()));
            }
        }
        out
    }

    pub fn cleanup(&self, keep: impl Fn(Gid) -> bool) {
        for tree in self.indices.read().values() {
            let mut tree = tree.write();
            for slot in tree.values_mut() {
                slot.retain(|(gid, _)| keep(*gid));
            }
            tree.retain(|_, slot| !slot.is_empty());
        }
    }
}
