mod manager;
mod snapshot;

pub use manager::{HistoryManager, HistoryStep, Popped};
pub use snapshot::{Snapshot, SnapshotId};

/// Who asked for a history commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOrigin {
    /// A layer operation performed by the engine itself
    Engine,
    /// A gesture boundary or a tool's `SaveHistory` message
    Tool,
}
