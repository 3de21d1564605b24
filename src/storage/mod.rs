pub mod codec;
pub mod edge;
pub mod graph;
pub mod indexes;
pub mod kvstore;
pub mod mvcc;
pub mod property_value;
pub mod props;
pub mod vertex;

pub use edge::Edge;
pub use graph::GraphStorage;
pub use indexes::OrderedValue;
pub use kvstore::{DummyKvStore, KvBackend, RedbKvStore};
pub use mvcc::{Record, VersionList, View};
pub use property_value::PropertyValue;
pub use props::PropertyValueStore;
pub use vertex::{EdgeRef, Vertex};
