//! Pool configuration and state enums.

use std::fmt;
use std::time::Duration;

/// Pool lifecycle states.
///
/// `Created -> Running <-> Paused -> ShuttingDown -> Stopped`, with
/// `Running | Paused -> ForceStopping -> Stopped` as the escalation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PoolState {
    Created = 0,
    Running = 1,
    /// Draining: no new tasks; queued and running tasks finish.
    ShuttingDown = 2,
    /// Cancelling: queued tasks are dropped, workers exit quickly.
    ForceStopping = 3,
    Stopped = 4,
    /// Task fetching is frozen; worker threads are kept.
    Paused = 5,
}

impl PoolState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => PoolState::Created,
            1 => PoolState::Running,
            2 => PoolState::ShuttingDown,
            3 => PoolState::ForceStopping,
            4 => PoolState::Stopped,
            _ => PoolState::Paused,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PoolState::Created => "CREATED",
            PoolState::Running => "RUNNING",
            PoolState::ShuttingDown => "SHUTTING_DOWN",
            PoolState::ForceStopping => "FORCE_STOPPING",
            PoolState::Stopped => "STOPPED",
            PoolState::Paused => "PAUSED",
        }
    }
}

impl fmt::Display for PoolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    Graceful,
    Force,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOption {
    Graceful,
    Force,
    /// Attempt a graceful stop; escalate to force at the deadline.
    Timeout(Duration),
}

/// Back-pressure policy applied when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum QueueFullPolicy {
    /// Wait for space; fail only when the queue closes.
    Block = 0,
    /// Reject the submission and count a discard.
    Discard = 1,
    /// Displace the oldest queued task, cancelling it.
    Overwrite = 2,
}

impl QueueFullPolicy {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => QueueFullPolicy::Discard,
            2 => QueueFullPolicy::Overwrite,
            _ => QueueFullPolicy::Block,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueFullPolicy::Block => "Block",
            QueueFullPolicy::Discard => "Discard",
            QueueFullPolicy::Overwrite => "Overwrite",
        }
    }
}

impl fmt::Display for QueueFullPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool tuning knobs. Values are normalized on construction: at least one
/// core thread, `max_threads >= core_threads`, `pending_low <= pending_hi`,
/// at least one debounce hit.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub queue_cap: usize,
    pub core_threads: usize,
    pub max_threads: usize,
    /// Load controller sampling interval.
    pub load_check_interval: Duration,
    /// Idle worker keep-alive hint.
    pub keep_alive: Duration,
    /// Busy-ratio upper bound; scale up when reached.
    pub scale_up_threshold: f64,
    /// Busy-ratio lower bound; scale down when at or below.
    pub scale_down_threshold: f64,
    pub pending_hi: usize,
    pub pending_low: usize,
    /// Consecutive samples a trigger must fire before the controller acts.
    pub debounce_hits: usize,
    /// Quiet period after a capacity change.
    pub cooldown: Duration,
    pub queue_policy: QueueFullPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            queue_cap: 1024,
            core_threads: 4,
            max_threads: 8,
            load_check_interval: Duration::from_millis(100),
            keep_alive: Duration::from_millis(5000),
            scale_up_threshold: 0.75,
            scale_down_threshold: 0.25,
            pending_hi: 64,
            pending_low: 8,
            debounce_hits: 3,
            cooldown: Duration::from_millis(500),
            queue_policy: QueueFullPolicy::Block,
        }
    }
}

impl PoolConfig {
    pub(crate) fn normalized(mut self) -> Self {
        self.core_threads = self.core_threads.max(1);
        self.max_threads = self.max_threads.max(self.core_threads);
        self.pending_low = self.pending_low.min(self.pending_hi);
        self.debounce_hits = self.debounce_hits.max(1);
        self
    }
}
