//! Edge payload stored in MVCC versions.

use crate::ids::{EdgeTypeId, Gid};
use crate::storage::props::PropertyValueStore;

#[derive(Clone, Debug)]
pub struct Edge {
    pub from: Gid,
    pub to: Gid,
    pub edge_type: EdgeTypeId,
    pub props: PropertyValueStore,
}

impl Edge {
    pub fn new(from: Gid, to: Gid, edge_type: EdgeTypeId, props: PropertyValueStore) -> Self {
        Self {
            from,
            to,
            edge_type,
            props,
        }
    }
}
