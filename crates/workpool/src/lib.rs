//! Worker-pool executor.
//!
//! The pool runs one OS thread per worker slot and feeds them from a bounded
//! lock-free multi-producer/multi-consumer queue. A dedicated coordinator
//! thread samples load and grows or shrinks the pool between its core and
//! maximum sizes.
//!
//! # Layers
//!
//! - [`queue::BoundedQueue`] - the lock-free ring with sequence-tagged cells
//! - [`blocking::BlockingQueue`] - waiting, close semantics, discard
//!   counters, and the overwrite-push primitive layered on top
//! - [`ThreadPool`] - worker slots, submission paths, back-pressure
//!   policies, pause/resume, and two-phase shutdown
//!
//! # Submission
//!
//! ```
//! use workpool::{PoolConfig, ThreadPool};
//!
//! let pool = ThreadPool::new(PoolConfig::default());
//! pool.start();
//!
//! let handle = pool.submit(|| 2 + 2);
//! assert_eq!(handle.wait(), Ok(4));
//!
//! pool.stop(workpool::StopMode::Graceful);
//! ```

#![warn(clippy::pedantic)]

pub mod blocking;
pub mod config;
pub mod pool;
pub mod queue;
pub mod stats;
pub mod task;

pub use blocking::{BlockingQueue, OverwriteOutcome, PopError, TryPushError};
pub use config::{PoolConfig, PoolState, QueueFullPolicy, ShutdownOption, StopMode};
pub use pool::ThreadPool;
pub use queue::BoundedQueue;
pub use stats::PoolStats;
pub use task::{TaskError, TaskHandle};
