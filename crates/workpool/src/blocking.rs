//! Blocking adapter over the lock-free queue.
//!
//! Layers waiting, close semantics, an O(1) pending counter, a discard
//! counter, and the overwrite-push primitive on top of
//! [`BoundedQueue`](crate::queue::BoundedQueue). The fast paths stay
//! lock-free; locks are taken only to wait or to coordinate an overwrite.
//! Three fine-grained mutexes (push-wait, pop-wait, overwrite) keep the
//! slow paths from contending with each other.
//!
//! Untimed waits recheck on a short internal tick, so a notification that
//! lands between a failed attempt and the wait only delays the retry.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use crate::queue::BoundedQueue;

// Recheck tick for untimed waits.
const WAIT_TICK: Duration = Duration::from_millis(10);

/// Non-blocking push failure. The rejected item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub enum TryPushError<T> {
    Full(T),
    Closed(T),
}

impl<T> std::fmt::Display for TryPushError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryPushError::Full(_) => f.write_str("queue is full"),
            TryPushError::Closed(_) => f.write_str("queue is closed"),
        }
    }
}

/// Timed pop failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PopError {
    #[error("timed out waiting for an item")]
    Timeout,
    #[error("queue is closed")]
    Closed,
}

/// Result of an overwrite-push.
#[derive(Debug)]
pub enum OverwriteOutcome<T> {
    /// The item was enqueued; `displaced` holds the evicted oldest element
    /// when one had to make room.
    Pushed { displaced: Option<T> },
    /// The item could not be enqueued even after displacing `displaced`.
    Rejected { item: T, displaced: Option<T> },
    /// The queue is closed; the item is handed back.
    Closed(T),
}

/// Blocking MPMC queue with close semantics and back-pressure hooks.
pub struct BlockingQueue<T> {
    queue: BoundedQueue<T>,
    pending: AtomicUsize,
    discarded: AtomicUsize,
    closed: AtomicBool,
    push_lock: Mutex<()>,
    pop_lock: Mutex<()>,
    overwrite_lock: Mutex<()>,
    not_full: Condvar,
    not_empty: Condvar,
}

impl<T> BlockingQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: BoundedQueue::new(capacity),
            pending: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            push_lock: Mutex::new(()),
            pop_lock: Mutex::new(()),
            overwrite_lock: Mutex::new(()),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    // Bookkeeping after a successful enqueue: signal one pop waiter on the
    // empty -> non-empty transition.
    fn after_push(&self) {
        let prev = self.pending.fetch_add(1, Ordering::Release);
        if prev == 0 {
            self.not_empty.notify_one();
        }
    }

    // Bookkeeping after a successful dequeue: signal one push waiter on the
    // full -> non-full transition.
    fn after_pop(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::Release);
        if prev == self.capacity() {
            self.not_full.notify_one();
        }
    }

    /// Enqueue without waiting.
    ///
    /// A full queue increments the discard counter; a closed queue does not.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        if self.is_closed() {
            return Err(TryPushError::Closed(item));
        }
        match self.queue.try_push(item) {
            Ok(()) => {
                self.after_push();
                Ok(())
            }
            Err(item) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                Err(TryPushError::Full(item))
            }
        }
    }

    /// Enqueue, waiting for space. Returns the item if the queue closes.
    pub fn push(&self, item: T) -> Result<(), T> {
        if self.is_closed() {
            return Err(item);
        }
        let mut item = match self.queue.try_push(item) {
            Ok(()) => {
                self.after_push();
                return Ok(());
            }
            Err(item) => item,
        };

        let mut guard = self.push_lock.lock();
        loop {
            if self.is_closed() {
                return Err(item);
            }
            match self.queue.try_push(item) {
                Ok(()) => {
                    drop(guard);
                    self.after_push();
                    return Ok(());
                }
                Err(back) => item = back,
            }
            self.not_full.wait_for(&mut guard, WAIT_TICK);
        }
    }

    /// Enqueue, waiting up to `timeout`. A timeout counts as a discard.
    pub fn push_timeout(&self, item: T, timeout: Duration) -> Result<(), TryPushError<T>> {
        if self.is_closed() {
            return Err(TryPushError::Closed(item));
        }
        let mut item = match self.queue.try_push(item) {
            Ok(()) => {
                self.after_push();
                return Ok(());
            }
            Err(item) => item,
        };

        let deadline = Instant::now() + timeout;
        let mut guard = self.push_lock.lock();
        loop {
            if self.is_closed() {
                return Err(TryPushError::Closed(item));
            }
            match self.queue.try_push(item) {
                Ok(()) => {
                    drop(guard);
                    self.after_push();
                    return Ok(());
                }
                Err(back) => item = back,
            }
            let now = Instant::now();
            if now >= deadline {
                self.discarded.fetch_add(1, Ordering::Relaxed);
                return Err(TryPushError::Full(item));
            }
            let wait = (deadline - now).min(WAIT_TICK);
            self.not_full.wait_for(&mut guard, wait);
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.queue.try_pop()?;
        self.after_pop();
        Some(item)
    }

    /// Dequeue, waiting for an item. `None` means closed and drained.
    pub fn pop(&self) -> Option<T> {
        if let Some(item) = self.queue.try_pop() {
            self.pending.fetch_sub(1, Ordering::Release);
            self.not_full.notify_one();
            return Some(item);
        }

        let mut guard = self.pop_lock.lock();
        loop {
            if let Some(item) = self.queue.try_pop() {
                self.pending.fetch_sub(1, Ordering::Release);
                drop(guard);
                self.not_full.notify_one();
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            self.not_empty.wait_for(&mut guard, WAIT_TICK);
        }
    }

    /// Dequeue, waiting up to `timeout`.
    ///
    /// # Errors
    ///
    /// [`PopError::Timeout`] when nothing arrived in time;
    /// [`PopError::Closed`] when the queue closed while empty.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<T, PopError> {
        if let Some(item) = self.queue.try_pop() {
            self.pending.fetch_sub(1, Ordering::Release);
            self.not_full.notify_one();
            return Ok(item);
        }

        let deadline = Instant::now() + timeout;
        let mut guard = self.pop_lock.lock();
        loop {
            if let Some(item) = self.queue.try_pop() {
                self.pending.fetch_sub(1, Ordering::Release);
                drop(guard);
                self.not_full.notify_one();
                return Ok(item);
            }
            if self.is_closed() {
                return Err(PopError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PopError::Timeout);
            }
            let wait = (deadline - now).min(WAIT_TICK);
            self.not_empty.wait_for(&mut guard, wait);
        }
    }

    /// Push that displaces the oldest element when the queue is full.
    ///
    /// At most one overwrite is in flight at a time; racers coordinate on
    /// the overwrite mutex.
    pub fn overwrite_push(&self, item: T) -> OverwriteOutcome<T> {
        if self.is_closed() {
            return OverwriteOutcome::Closed(item);
        }

        let mut item = match self.queue.try_push(item) {
            Ok(()) => {
                self.pending.fetch_add(1, Ordering::Release);
                self.not_empty.notify_one();
                return OverwriteOutcome::Pushed { displaced: None };
            }
            Err(item) => item,
        };

        let guard = self.overwrite_lock.lock();
        if self.is_closed() {
            return OverwriteOutcome::Closed(item);
        }

        let Some(displaced) = self.queue.try_pop() else {
            return OverwriteOutcome::Rejected {
                item,
                displaced: None,
            };
        };
        self.pending.fetch_sub(1, Ordering::Release);

        let outcome = match self.queue.try_push(item) {
            Ok(()) => {
                self.pending.fetch_add(1, Ordering::Release);
                OverwriteOutcome::Pushed {
                    displaced: Some(displaced),
                }
            }
            Err(back) => {
                item = back;
                OverwriteOutcome::Rejected {
                    item,
                    displaced: Some(displaced),
                }
            }
        };
        drop(guard);
        self.not_empty.notify_one();
        outcome
    }

    /// Enqueue a batch without waiting, stopping at the first failure.
    pub fn try_push_batch<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        if self.is_closed() {
            return 0;
        }
        let count = self.queue.try_push_batch(items);
        if count > 0 {
            let prev = self.pending.fetch_add(count, Ordering::Release);
            if prev == 0 {
                // Batches may satisfy several waiters at once.
                self.not_empty.notify_all();
            }
        }
        count
    }

    /// Dequeue up to `max` items without waiting.
    pub fn try_pop_batch(&self, max: usize) -> Vec<T> {
        let items = self.queue.try_pop_batch(max);
        if !items.is_empty() {
            self.pending.fetch_sub(items.len(), Ordering::Release);
            self.not_full.notify_all();
        }
        items
    }

    /// Enqueue a batch, waiting for space per element. Stops early when the
    /// queue closes; returns the number pushed.
    pub fn push_batch<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut pushed = 0;
        for item in items {
            if self.push(item).is_err() {
                break;
            }
            pushed += 1;
        }
        pushed
    }

    /// Dequeue at least `min` (waiting as needed) and at most `max` items.
    pub fn pop_batch(&self, max: usize, min: usize) -> Vec<T> {
        let min = if min == 0 || min > max { 1 } else { min };
        let mut items = self.try_pop_batch(max);
        while items.len() < min {
            match self.pop() {
                Some(item) => items.push(item),
                None => return items,
            }
        }
        if items.len() < max {
            items.extend(self.try_pop_batch(max - items.len()));
        }
        items
    }

    /// Close the queue: subsequent pushes fail fast, waiters wake.
    /// Remaining items stay poppable until drained.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drain all remaining items.
    pub fn clear(&self) {
        while self.queue.try_pop().is_some() {}
        self.pending.store(0, Ordering::Release);
        self.not_full.notify_all();
    }

    /// Drain all remaining items through `visitor`.
    pub fn clear_with(&self, mut visitor: impl FnMut(T)) {
        while let Some(item) = self.queue.try_pop() {
            visitor(item);
        }
        self.pending.store(0, Ordering::Release);
        self.not_full.notify_all();
    }

    /// Observable size, maintained in lockstep with the queue.
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Number of non-blocking pushes rejected so far.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn reset_discarded(&self) {
        self.discarded.store(0, Ordering::Relaxed);
    }
}
