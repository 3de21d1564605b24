//! Vertex payload stored in MVCC versions.

use smallvec::SmallVec;

use crate::ids::{EdgeTypeId, Gid, LabelId};
use crate::storage::props::PropertyValueStore;

/// Reference to an incident edge: the edge record, the neighbour on the
/// other end, and the edge type, all as stable arena ids.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EdgeRef {
    pub edge: Gid,
    pub other_vertex: Gid,
    pub edge_type: EdgeTypeId,
}

#[derive(Clone, Debug)]
pub struct Vertex {
    /// Ordered set of label ids.
    pub labels: SmallVec<[LabelId; 4]>,
    pub out_edges: Vec<EdgeRef>,
    pub in_edges: Vec<EdgeRef>,
    pub props: PropertyValueStore,
}

impl Vertex {
    pub fn new(props: PropertyValueStore) -> Self {
        Self {
            labels: SmallVec::new(),
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            props,
        }
    }

    pub fn has_label(&self, label: LabelId) -> bool {
        self.labels.binary_search(&label).is_ok()
    }

    /// Adds `label`, returning false when it was already present.
    pub fn add_label(&mut self, label: LabelId) -> bool {
        match self.labels.binary_search(&label) {
            Ok(_) => false,
            Err(pos) => {
                self.labels.insert(pos, label);
                true
            }
        }
    }

    /// Removes `label`, returning false when it was not present.
    pub fn remove_label(&mut self, label: LabelId) -> bool {
        match self.labels.binary_search(&label) {
            Ok(pos) => {
                self.labels.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}
