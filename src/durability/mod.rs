pub mod paths;
pub mod recovery;
pub mod snapshot;
pub mod wal;

pub use recovery::RecoveredState;
pub use snapshot::{SnapshotData, SnapshotEdge, SnapshotSummary, SnapshotVertex};
pub use wal::{Delta, EntityKind, Wal};
