use std::sync::atomic::{AtomicU64, Ordering};

// Single static counter for all snapshots
static NEXT_SNAPSHOT_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonically increasing id, unique for the life of the process.
pub fn generate_snapshot_id() -> u64 {
    NEXT_SNAPSHOT_ID.fetch_add(1, Ordering::Relaxed)
}
