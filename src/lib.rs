pub mod db;
pub mod durability;
pub mod error;
pub mod ids;
pub mod logging;
pub mod query;
pub mod stats;
pub mod storage;
pub mod tx;

pub use crate::db::{Config, EdgeAccessor, GraphAccessor, GraphDB, VertexAccessor};
pub use crate::error::{GraphError, Result};
pub use crate::ids::{EdgeTypeId, Gid, LabelId, Location, PropertyId, PropertyKey, TxId};
pub use crate::query::{LogicalOperator, Parameters, RowSink, SymbolTable, TypedValue};
pub use crate::storage::{PropertyValue, View};
