//! Task representation and the one-shot result handle.
//!
//! Queued work is a sum type: either a runnable job or a directed exit
//! sentinel addressed to a specific worker slot. Workers pattern-match;
//! a sentinel addressed to someone else is requeued.
//!
//! `Execute` and `Cancel` are mutually exclusive and at-most-once each -
//! both consume the boxed job, so the type system enforces the contract.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

/// Why a task's result handle was resolved without a value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("pool is not running")]
    NotRunning,

    #[error("queue closed")]
    QueueClosed,

    #[error("discarded: queue full")]
    Discarded,

    #[error("overwritten")]
    Overwritten,

    #[error("force stopped")]
    ForceStopped,

    #[error("task panicked: {0}")]
    Panicked(String),
}

/// A queued unit of work.
pub(crate) enum Task {
    Run(Box<dyn Runnable>),
    /// Retire the worker slot with this id.
    Exit(u64),
}

/// Executable job. Consumed by exactly one of `run` or `cancel`.
pub(crate) trait Runnable: Send {
    /// Execute the job, capturing panics. Returns whether it succeeded.
    fn run(self: Box<Self>) -> bool;

    /// Resolve the job without executing it.
    fn cancel(self: Box<Self>, err: TaskError);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Fire-and-forget job used by `post`.
pub(crate) struct SimpleTask {
    f: Box<dyn FnOnce() + Send>,
}

impl SimpleTask {
    pub(crate) fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self { f: Box::new(f) }
    }
}

impl Runnable for SimpleTask {
    fn run(self: Box<Self>) -> bool {
        catch_unwind(AssertUnwindSafe(self.f)).is_ok()
    }

    fn cancel(self: Box<Self>, _err: TaskError) {}
}

enum HandleState<R> {
    Pending,
    Done(Result<R, TaskError>),
    Taken,
}

struct HandleShared<R> {
    state: Mutex<HandleState<R>>,
    cv: Condvar,
}

/// One-shot handle to a submitted task's outcome.
///
/// Resolved exactly once: with the task's return value, with the message of
/// a panic that escaped it, or with the rejection/cancellation error.
pub struct TaskHandle<R> {
    shared: Arc<HandleShared<R>>,
}

impl<R> TaskHandle<R> {
    /// Block until the task resolves and take the outcome.
    pub fn wait(self) -> Result<R, TaskError> {
        let mut state = self.shared.state.lock();
        loop {
            match std::mem::replace(&mut *state, HandleState::Taken) {
                HandleState::Done(result) => return result,
                HandleState::Pending => {
                    *state = HandleState::Pending;
                    self.shared.cv.wait(&mut state);
                }
                HandleState::Taken => panic!("task result already taken"),
            }
        }
    }

    /// Block up to `timeout`; `None` when the task has not resolved yet.
    ///
    /// The outcome can be taken only once; a later `wait` after a
    /// successful take panics.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<R, TaskError>> {
        let mut state = self.shared.state.lock();
        if matches!(*state, HandleState::Pending) {
            self.shared.cv.wait_for(&mut state, timeout);
        }
        match std::mem::replace(&mut *state, HandleState::Taken) {
            HandleState::Done(result) => Some(result),
            HandleState::Pending => {
                *state = HandleState::Pending;
                None
            }
            HandleState::Taken => panic!("task result already taken"),
        }
    }

    /// Whether the task has resolved.
    pub fn is_done(&self) -> bool {
        matches!(*self.shared.state.lock(), HandleState::Done(_))
    }
}

/// Completion side of a [`TaskHandle`]. Resolves at most once.
pub(crate) struct TaskPromise<R> {
    shared: Arc<HandleShared<R>>,
}

impl<R> TaskPromise<R> {
    pub(crate) fn complete(self, result: Result<R, TaskError>) {
        let mut state = self.shared.state.lock();
        if matches!(*state, HandleState::Pending) {
            *state = HandleState::Done(result);
            drop(state);
            self.shared.cv.notify_all();
        }
    }
}

pub(crate) fn handle_pair<R>() -> (TaskPromise<R>, TaskHandle<R>) {
    let shared = Arc::new(HandleShared {
        state: Mutex::new(HandleState::Pending),
        cv: Condvar::new(),
    });
    (
        TaskPromise {
            shared: Arc::clone(&shared),
        },
        TaskHandle { shared },
    )
}

/// Result-bearing job used by `submit`.
pub(crate) struct FutureTask<R> {
    f: Box<dyn FnOnce() -> R + Send>,
    promise: TaskPromise<R>,
}

impl<R> FutureTask<R> {
    pub(crate) fn new(f: impl FnOnce() -> R + Send + 'static, promise: TaskPromise<R>) -> Self {
        Self {
            f: Box::new(f),
            promise,
        }
    }
}

impl<R: Send + 'static> Runnable for FutureTask<R> {
    fn run(self: Box<Self>) -> bool {
        let FutureTask { f, promise } = *self;
        match catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                promise.complete(Ok(value));
                true
            }
            Err(payload) => {
                promise.complete(Err(TaskError::Panicked(panic_message(payload.as_ref()))));
                false
            }
        }
    }

    fn cancel(self: Box<Self>, err: TaskError) {
        self.promise.complete(Err(err));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_future_task_resolves_handle_with_value() {
        let (promise, handle) = handle_pair();
        let task = Box::new(FutureTask::new(|| 21 * 2, promise));
        assert!(task.run());
        assert_eq!(handle.wait(), Ok(42));
    }

    #[test]
    fn test_future_task_captures_panic_message() {
        let (promise, handle) = handle_pair::<u32>();
        let task = Box::new(FutureTask::new(|| panic!("broken invariant"), promise));
        assert!(!task.run());
        assert_eq!(
            handle.wait(),
            Err(TaskError::Panicked("broken invariant".to_string()))
        );
    }

    #[test]
    fn test_cancel_resolves_handle_with_error() {
        let (promise, handle) = handle_pair::<u32>();
        let task = Box::new(FutureTask::new(|| 1, promise));
        task.cancel(TaskError::Overwritten);
        assert_eq!(handle.wait(), Err(TaskError::Overwritten));
    }

    #[test]
    fn test_wait_blocks_until_resolution() {
        let (promise, handle) = handle_pair();
        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            promise.complete(Ok(7u32));
        });
        assert_eq!(handle.wait(), Ok(7));
        resolver.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_returns_none_while_pending() {
        let (promise, handle) = handle_pair::<u32>();
        assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());
        promise.complete(Ok(1));
    }

    #[test]
    fn test_simple_task_swallows_panics() {
        let task = Box::new(SimpleTask::new(|| panic!("ignored")));
        assert!(!task.run());
    }
}
