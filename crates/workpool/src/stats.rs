//! Pool statistics snapshot.

use std::time::Duration;

/// Best-effort snapshot of the pool's counters.
///
/// Individual counters are updated with relaxed atomics; the snapshot is
/// not atomic across fields.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Tasks accepted by a submission path.
    pub total_submitted: u64,
    /// Tasks executed to completion.
    pub total_completed: u64,
    /// Tasks whose execution panicked.
    pub total_failed: u64,
    /// Tasks cancelled (overwritten, force-stopped).
    pub total_cancelled: u64,
    /// Submissions rejected before enqueueing.
    pub total_rejected: u64,

    pub total_exec_time: Duration,
    pub avg_exec_time: Duration,

    /// Tasks currently queued.
    pub pending_tasks: usize,
    /// active workers / current workers, as of the last load sample.
    pub busy_ratio: f64,
    /// pending / queue capacity.
    pub pending_ratio: f64,

    pub current_threads: usize,
    pub active_threads: usize,
    pub peak_threads: usize,
    pub total_threads_created: u64,
    pub total_threads_destroyed: u64,

    pub discarded_tasks: u64,
    pub overwritten_tasks: u64,
    /// Times a submitter or worker waited on the pause condition.
    pub paused_waits: u64,
}
