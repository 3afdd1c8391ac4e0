//! The worker pool.
//!
//! One OS thread per worker slot, fed from a [`BlockingQueue`] of tasks. A
//! separate coordinator thread samples queue depth and worker busyness and
//! grows or shrinks the pool between `core_threads` and `max_threads`.
//! Shrinking is cooperative: the coordinator marks an idle slot, enqueues a
//! directed exit sentinel for it, and joins the thread once the sentinel is
//! consumed.
//!
//! Shutdown is two-phase. A graceful stop first waits for in-flight
//! submissions to drain, then for the queue and active tasks to empty,
//! before closing the queue and joining workers. A force stop cancels every
//! queued task and closes immediately.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, trace, warn};

use crate::blocking::{BlockingQueue, OverwriteOutcome, TryPushError};
use crate::config::{PoolConfig, PoolState, QueueFullPolicy, ShutdownOption, StopMode};
use crate::stats::PoolStats;
use crate::task::{handle_pair, FutureTask, Runnable, SimpleTask, Task, TaskError, TaskHandle};

/// Per-slot bookkeeping shared with the worker thread.
///
/// The slot record outlives the thread it owns: the coordinator keeps it
/// until the join completes.
struct SlotShared {
    id: u64,
    should_exit: AtomicBool,
    idle: AtomicBool,
    /// Consecutive pop rounds without work.
    #[allow(dead_code)] // maintained for richer retirement policies
    idle_streak: AtomicU64,
    #[allow(dead_code)] // maintained for richer retirement policies
    last_active: Mutex<Instant>,
}

struct Worker {
    shared: Arc<SlotShared>,
    handle: Option<JoinHandle<()>>,
}

struct PoolInner {
    state: AtomicU8,
    queue: BlockingQueue<Task>,
    policy: AtomicU8,
    cfg: PoolConfig,

    workers: Mutex<Vec<Worker>>,
    next_worker_id: AtomicU64,

    pause_lock: Mutex<()>,
    pause_cv: Condvar,
    drain_lock: Mutex<()>,
    drain_cv: Condvar,
    submit_lock: Mutex<()>,
    submit_cv: Condvar,

    balancer_stop: AtomicBool,
    balancer_kick: AtomicBool,
    balancer_lock: Mutex<()>,
    balancer_cv: Condvar,
    balancer_handle: Mutex<Option<JoinHandle<()>>>,

    active_tasks: AtomicUsize,
    in_flight_submissions: AtomicUsize,

    total_submitted: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
    total_cancelled: AtomicU64,
    total_rejected: AtomicU64,
    total_exec_time_ns: AtomicU64,
    busy_ratio_bits: AtomicU64,
    pending_ratio_bits: AtomicU64,
    current_threads: AtomicUsize,
    active_threads: AtomicUsize,
    peak_threads: AtomicUsize,
    total_threads_created: AtomicU64,
    total_threads_destroyed: AtomicU64,
    discarded_tasks: AtomicU64,
    overwritten_tasks: AtomicU64,
    paused_waits: AtomicU64,
}

/// Worker-pool executor. Cheap to clone; clones share the pool.
///
/// When the last user handle drops, a still-running pool is stopped
/// gracefully. Worker and controller threads do not count as handles.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    // User-handle tracker; worker/controller threads hold only `inner`.
    handles: Arc<()>,
}

impl Clone for ThreadPool {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handles: Arc::clone(&self.handles),
        }
    }
}

// Outcome of the submission state gate.
enum Admission {
    Proceed,
    Rejected,
    ForceCancelled,
}

// Decrements the in-flight submission counter and wakes the drain when the
// last submitter leaves.
struct SubmitGuard<'a> {
    inner: &'a PoolInner,
}

impl<'a> SubmitGuard<'a> {
    fn new(inner: &'a PoolInner) -> Self {
        inner.in_flight_submissions.fetch_add(1, Ordering::AcqRel);
        Self { inner }
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        let prev = self
            .inner
            .in_flight_submissions
            .fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            let _g = self.inner.submit_lock.lock();
            self.inner.submit_cv.notify_all();
        }
    }
}

impl ThreadPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let cfg = cfg.normalized();
        let policy = cfg.queue_policy;
        debug!(
            target: "pool",
            core_threads = cfg.core_threads,
            max_threads = cfg.max_threads,
            queue_cap = cfg.queue_cap,
            policy = %policy,
            "pool constructed"
        );
        Self {
            inner: Arc::new(PoolInner {
                state: AtomicU8::new(PoolState::Created as u8),
                queue: BlockingQueue::new(cfg.queue_cap),
                policy: AtomicU8::new(policy as u8),
                cfg,
                workers: Mutex::new(Vec::new()),
                next_worker_id: AtomicU64::new(1),
                pause_lock: Mutex::new(()),
                pause_cv: Condvar::new(),
                drain_lock: Mutex::new(()),
                drain_cv: Condvar::new(),
                submit_lock: Mutex::new(()),
                submit_cv: Condvar::new(),
                balancer_stop: AtomicBool::new(true),
                balancer_kick: AtomicBool::new(false),
                balancer_lock: Mutex::new(()),
                balancer_cv: Condvar::new(),
                balancer_handle: Mutex::new(None),
                active_tasks: AtomicUsize::new(0),
                in_flight_submissions: AtomicUsize::new(0),
                total_submitted: AtomicU64::new(0),
                total_completed: AtomicU64::new(0),
                total_failed: AtomicU64::new(0),
                total_cancelled: AtomicU64::new(0),
                total_rejected: AtomicU64::new(0),
                total_exec_time_ns: AtomicU64::new(0),
                busy_ratio_bits: AtomicU64::new(0f64.to_bits()),
                pending_ratio_bits: AtomicU64::new(0f64.to_bits()),
                current_threads: AtomicUsize::new(0),
                active_threads: AtomicUsize::new(0),
                peak_threads: AtomicUsize::new(0),
                total_threads_created: AtomicU64::new(0),
                total_threads_destroyed: AtomicU64::new(0),
                discarded_tasks: AtomicU64::new(0),
                overwritten_tasks: AtomicU64::new(0),
                paused_waits: AtomicU64::new(0),
            }),
            handles: Arc::new(()),
        }
    }

    /// Convenience constructor with defaults for everything else.
    pub fn with_threads(threads: usize, queue_cap: usize) -> Self {
        let threads = threads.max(1);
        Self::new(PoolConfig {
            queue_cap,
            core_threads: threads,
            max_threads: threads,
            ..PoolConfig::default()
        })
    }

    /// Start the core workers and the load controller.
    ///
    /// Only valid from `Created`; anything else warns and no-ops.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(
                PoolState::Created as u8,
                PoolState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(target: "pool", state = %self.state(), "start ignored");
            return;
        }

        {
            let mut workers = inner.workers.lock();
            workers.reserve(inner.cfg.max_threads);
            for _ in 0..inner.cfg.core_threads {
                Self::spawn_worker_locked(inner, &mut workers);
            }
        }
        inner.balancer_stop.store(false, Ordering::Release);
        self.launch_balancer();

        info!(
            target: "pool",
            workers = inner.current_threads.load(Ordering::Relaxed),
            queue_cap = inner.queue.capacity(),
            policy = %self.queue_policy(),
            pending_hi = inner.cfg.pending_hi,
            pending_low = inner.cfg.pending_low,
            "pool started"
        );
    }

    fn spawn_worker_locked(inner: &Arc<PoolInner>, workers: &mut Vec<Worker>) {
        let id = inner.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::new(SlotShared {
            id,
            should_exit: AtomicBool::new(false),
            idle: AtomicBool::new(true),
            idle_streak: AtomicU64::new(0),
            last_active: Mutex::new(Instant::now()),
        });

        let thread_inner = Arc::clone(inner);
        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("pool-worker-{id}"))
            .spawn(move || worker_loop(&thread_inner, &thread_shared))
            .expect("failed to spawn worker thread");

        workers.push(Worker {
            shared,
            handle: Some(handle),
        });
        inner.current_threads.fetch_add(1, Ordering::AcqRel);
        inner.total_threads_created.fetch_add(1, Ordering::Relaxed);

        let mut peak = inner.peak_threads.load(Ordering::Relaxed);
        let current = inner.current_threads.load(Ordering::Relaxed);
        while current > peak {
            match inner.peak_threads.compare_exchange_weak(
                peak,
                current,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
        debug!(
            target: "pool",
            worker_id = id,
            current_threads = current,
            "worker created"
        );
    }

    /// Submit a fire-and-forget closure.
    pub fn post(&self, f: impl FnOnce() + Send + 'static) {
        let inner = &self.inner;
        let _guard = SubmitGuard::new(inner);
        match self.admit() {
            Admission::Proceed => {}
            Admission::Rejected | Admission::ForceCancelled => {
                inner.record_rejected();
                return;
            }
        }
        self.dispatch(Box::new(SimpleTask::new(f)));
    }

    /// Submit a result-bearing closure; the handle resolves with the value,
    /// the panic message, or the rejection error.
    pub fn submit<F, R>(&self, f: F) -> TaskHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let inner = &self.inner;
        let (promise, handle) = handle_pair();
        let task: Box<dyn Runnable> = Box::new(FutureTask::new(f, promise));

        let _guard = SubmitGuard::new(inner);
        match self.admit() {
            Admission::Proceed => {}
            Admission::ForceCancelled => {
                inner.record_cancelled();
                task.cancel(TaskError::ForceStopped);
                error!(
                    target: "pool",
                    pending = inner.queue.len(),
                    "submit cancelled: pool force stopping"
                );
                return handle;
            }
            Admission::Rejected => {
                inner.record_rejected();
                warn!(target: "pool", state = %self.state(), "submit rejected: pool not running");
                task.cancel(TaskError::NotRunning);
                return handle;
            }
        }

        self.dispatch(task);
        handle
    }

    /// Submit a batch of closures; returns the number accepted.
    ///
    /// Uses the non-blocking batch path regardless of policy; tasks that do
    /// not fit are dropped and counted as rejected.
    pub fn post_batch<I, F>(&self, tasks: I) -> usize
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() + Send + 'static,
    {
        let inner = &self.inner;
        let _guard = SubmitGuard::new(inner);
        if self.state() != PoolState::Running {
            return 0;
        }

        let batch: Vec<Task> = tasks
            .into_iter()
            .map(|f| Task::Run(Box::new(SimpleTask::new(f)) as Box<dyn Runnable>))
            .collect();
        let offered = batch.len();
        let accepted = inner.queue.try_push_batch(batch);
        inner
            .total_submitted
            .fetch_add(accepted as u64, Ordering::Relaxed);
        if accepted < offered {
            inner
                .total_rejected
                .fetch_add((offered - accepted) as u64, Ordering::Relaxed);
        }
        trace!(target: "pool", offered, accepted, "batch submitted");
        accepted
    }

    // State gate shared by the submission paths. Waits through a pause;
    // tolerates a pause that woke into a graceful shutdown.
    fn admit(&self) -> Admission {
        let inner = &self.inner;
        let mut waited_in_pause = false;
        loop {
            match self.state() {
                PoolState::Running => {
                    if waited_in_pause {
                        debug!(target: "pool", "submission resumed after pause");
                    }
                    return Admission::Proceed;
                }
                PoolState::Paused => {
                    let mut guard = inner.pause_lock.lock();
                    inner.paused_waits.fetch_add(1, Ordering::Relaxed);
                    while self.state() == PoolState::Paused {
                        inner.pause_cv.wait(&mut guard);
                    }
                    waited_in_pause = true;
                }
                PoolState::ShuttingDown if waited_in_pause => {
                    info!(
                        target: "pool",
                        "submission admitted during shutdown: waited through pause"
                    );
                    return Admission::Proceed;
                }
                PoolState::ForceStopping if waited_in_pause => {
                    return Admission::ForceCancelled;
                }
                _ => return Admission::Rejected,
            }
        }
    }

    // Enqueue a runnable according to the back-pressure policy.
    fn dispatch(&self, task: Box<dyn Runnable>) {
        let inner = &self.inner;
        match self.queue_policy() {
            QueueFullPolicy::Block => match inner.queue.push(Task::Run(task)) {
                Ok(()) => {
                    inner.total_submitted.fetch_add(1, Ordering::Relaxed);
                    trace!(target: "pool", pending = inner.queue.len(), "submitted (Block)");
                }
                Err(task) => {
                    inner.record_rejected();
                    warn!(target: "pool", "submission failed (Block): queue closed");
                    cancel_task(task, TaskError::QueueClosed);
                }
            },
            QueueFullPolicy::Discard => match inner.queue.try_push(Task::Run(task)) {
                Ok(()) => {
                    inner.total_submitted.fetch_add(1, Ordering::Relaxed);
                }
                Err(TryPushError::Full(task)) => {
                    inner.record_rejected();
                    inner.discarded_tasks.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        target: "pool",
                        pending = inner.queue.len(),
                        discarded = inner.discarded_tasks.load(Ordering::Relaxed),
                        "submission discarded (Discard)"
                    );
                    cancel_task(task, TaskError::Discarded);
                }
                Err(TryPushError::Closed(task)) => {
                    inner.record_rejected();
                    cancel_task(task, TaskError::QueueClosed);
                }
            },
            QueueFullPolicy::Overwrite => match inner.queue.overwrite_push(Task::Run(task)) {
                OverwriteOutcome::Pushed { displaced } => {
                    self.resolve_displaced(displaced);
                    inner.total_submitted.fetch_add(1, Ordering::Relaxed);
                }
                OverwriteOutcome::Rejected { item, displaced } => {
                    self.resolve_displaced(displaced);
                    inner.record_rejected();
                    inner.discarded_tasks.fetch_add(1, Ordering::Relaxed);
                    warn!(target: "pool", "submission failed (Overwrite): queue would not accept task");
                    cancel_task(item, TaskError::Discarded);
                }
                OverwriteOutcome::Closed(item) => {
                    inner.record_rejected();
                    cancel_task(item, TaskError::QueueClosed);
                }
            },
        }
    }

    // Cancel a task displaced by an overwrite-push. A displaced exit
    // sentinel is requeued, not cancelled.
    fn resolve_displaced(&self, displaced: Option<Task>) {
        let inner = &self.inner;
        match displaced {
            None => {}
            Some(Task::Run(old)) => {
                old.cancel(TaskError::Overwritten);
                inner.record_cancelled();
                inner.overwritten_tasks.fetch_add(1, Ordering::Relaxed);
                debug!(
                    target: "pool",
                    overwritten = inner.overwritten_tasks.load(Ordering::Relaxed),
                    "queued task overwritten"
                );
            }
            Some(exit @ Task::Exit(_)) => {
                if inner.queue.push(exit).is_err() {
                    warn!(target: "pool", "dropped exit sentinel on closed queue");
                }
            }
        }
    }

    /// Freeze task fetching. Workers and submitters wait on the pause
    /// condition; `resume` releases them.
    pub fn pause(&self) {
        if self
            .inner
            .state
            .compare_exchange(
                PoolState::Running as u8,
                PoolState::Paused as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            info!(target: "pool", "paused");
        } else {
            debug!(target: "pool", state = %self.state(), "pause ignored");
        }
    }

    pub fn resume(&self) {
        if self
            .inner
            .state
            .compare_exchange(
                PoolState::Paused as u8,
                PoolState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            let _g = self.inner.pause_lock.lock();
            self.inner.pause_cv.notify_all();
            info!(target: "pool", "resumed");
        } else {
            debug!(target: "pool", state = %self.state(), "resume ignored");
        }
    }

    /// Stop the pool.
    ///
    /// Graceful: drain in-flight submissions, wait for pending and active
    /// tasks to reach zero, close the queue, join everything. Force: cancel
    /// every queued task, close, join.
    pub fn stop(&self, mode: StopMode) {
        let inner = &self.inner;
        info!(target: "pool", mode = ?mode, state = %self.state(), "stop requested");
        let graceful = mode == StopMode::Graceful;

        loop {
            let current = self.state();
            let target = match current {
                PoolState::Stopped => break,
                PoolState::Created => PoolState::Stopped,
                PoolState::Running | PoolState::Paused => {
                    if graceful {
                        PoolState::ShuttingDown
                    } else {
                        PoolState::ForceStopping
                    }
                }
                PoolState::ShuttingDown if !graceful => PoolState::ForceStopping,
                _ => break,
            };
            if target == current {
                break;
            }
            if inner
                .state
                .compare_exchange(
                    current as u8,
                    target as u8,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                debug!(target: "pool", from = %current, to = %target, "stop transition");
                break;
            }
        }

        // Wake anything parked on the pause condition.
        {
            let _g = inner.pause_lock.lock();
            inner.pause_cv.notify_all();
        }

        match self.state() {
            PoolState::ShuttingDown => {
                info!(
                    target: "pool",
                    in_flight = inner.in_flight_submissions.load(Ordering::Acquire),
                    "graceful stop: draining submissions"
                );
                {
                    let mut guard = inner.submit_lock.lock();
                    while inner.in_flight_submissions.load(Ordering::Acquire) != 0 {
                        inner.submit_cv.wait(&mut guard);
                    }
                }
                info!(
                    target: "pool",
                    pending = inner.queue.len(),
                    active = inner.active_tasks.load(Ordering::Acquire),
                    "graceful stop: draining tasks"
                );
                {
                    let mut guard = inner.drain_lock.lock();
                    while inner.queue.len() != 0 || inner.active_tasks.load(Ordering::Acquire) != 0
                    {
                        inner.drain_cv.wait(&mut guard);
                    }
                }
                inner.queue.close();
                info!(target: "pool", "graceful stop: queue closed");
            }
            PoolState::ForceStopping => {
                let pending = inner.queue.len();
                warn!(target: "pool", pending, "force stop: cancelling queued tasks");
                inner.queue.clear_with(|task| {
                    if let Task::Run(job) = task {
                        job.cancel(TaskError::ForceStopped);
                        inner.record_cancelled();
                    }
                });
                inner.queue.close();
            }
            PoolState::Stopped => return,
            _ => {}
        }

        self.stop_balancer();

        let workers: Vec<Worker> = {
            let mut guard = inner.workers.lock();
            guard.drain(..).collect()
        };
        let joined = workers.len();
        for mut worker in workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }

        inner.state.store(PoolState::Stopped as u8, Ordering::Release);
        info!(
            target: "pool",
            joined,
            pending = inner.queue.len(),
            active = inner.active_tasks.load(Ordering::Acquire),
            "pool stopped"
        );
    }

    /// Shut the pool down, optionally escalating at a deadline.
    pub fn shutdown(&self, option: ShutdownOption) {
        match option {
            ShutdownOption::Graceful => self.stop(StopMode::Graceful),
            ShutdownOption::Force => self.stop(StopMode::Force),
            ShutdownOption::Timeout(timeout) => {
                info!(target: "pool", timeout_ms = timeout.as_millis() as u64, "shutdown with deadline");
                let watchdog = {
                    let pool = self.clone();
                    thread::spawn(move || {
                        let deadline = Instant::now() + timeout;
                        while pool.state() != PoolState::Stopped {
                            if Instant::now() >= deadline {
                                warn!(target: "pool", "shutdown deadline exceeded: escalating to force stop");
                                pool.stop(StopMode::Force);
                                return;
                            }
                            thread::sleep(Duration::from_millis(5));
                        }
                    })
                };
                self.stop(StopMode::Graceful);
                let _ = watchdog.join();
            }
        }
    }

    fn launch_balancer(&self) {
        // The controller thread holds only the inner Arc so that dropping
        // the last user handle can still trigger the automatic stop.
        let inner = Arc::clone(&self.inner);
        debug!(
            target: "pool.balancer",
            interval_ms = inner.cfg.load_check_interval.as_millis() as u64,
            cooldown_ms = inner.cfg.cooldown.as_millis() as u64,
            "launching load controller"
        );
        let handle = thread::Builder::new()
            .name("pool-balancer".to_string())
            .spawn(move || balancer_loop(&inner))
            .expect("failed to spawn load controller thread");
        *self.inner.balancer_handle.lock() = Some(handle);
    }

    fn stop_balancer(&self) {
        self.inner.balancer_stop.store(true, Ordering::Release);
        {
            let _g = self.inner.balancer_lock.lock();
            self.inner.balancer_cv.notify_all();
        }
        let handle = self.inner.balancer_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
            debug!(target: "pool.balancer", "load controller joined");
        }
    }

    /// Wake the load controller for an immediate sample.
    pub fn trigger_load_check(&self) {
        self.inner.balancer_kick.store(true, Ordering::Release);
        let _g = self.inner.balancer_lock.lock();
        self.inner.balancer_cv.notify_one();
        trace!(target: "pool.balancer", "manual load check triggered");
    }
}

fn balancer_loop(inner: &Arc<PoolInner>) {
    let cfg = &inner.cfg;
    let mut up_hits = 0usize;
    let mut down_hits = 0usize;
    let mut last_adjust = Instant::now();

    while !inner.balancer_stop.load(Ordering::Acquire) {
        {
            let mut guard = inner.balancer_lock.lock();
            if !inner.balancer_stop.load(Ordering::Acquire)
                && !inner.balancer_kick.load(Ordering::Acquire)
            {
                inner
                    .balancer_cv
                    .wait_for(&mut guard, cfg.load_check_interval);
            }
        }
        if inner.balancer_stop.load(Ordering::Acquire) {
            break;
        }
        let kicked = inner.balancer_kick.swap(false, Ordering::AcqRel);
        let now = Instant::now();
        if !kicked && now.duration_since(last_adjust) < cfg.cooldown {
            continue;
        }

        let pending = inner.queue.len();
        let current = inner.current_threads.load(Ordering::Acquire);
        let active = inner.active_threads.load(Ordering::Acquire);
        let busy_ratio = if current == 0 {
            0.0
        } else {
            active as f64 / current as f64
        };
        inner
            .busy_ratio_bits
            .store(busy_ratio.to_bits(), Ordering::Release);
        inner.pending_ratio_bits.store(
            (pending as f64 / inner.queue.capacity() as f64).to_bits(),
            Ordering::Relaxed,
        );

        let grow = pending >= cfg.pending_hi || busy_ratio >= cfg.scale_up_threshold;
        let shrink = pending <= cfg.pending_low && busy_ratio <= cfg.scale_down_threshold;

        if grow {
            up_hits += 1;
            if up_hits >= cfg.debounce_hits {
                up_hits = 0;
                down_hits = 0;
                last_adjust = now;
                let mut workers = inner.workers.lock();
                if inner.current_threads.load(Ordering::Acquire) < cfg.max_threads {
                    let before = inner.current_threads.load(Ordering::Acquire);
                    ThreadPool::spawn_worker_locked(inner, &mut workers);
                    info!(
                        target: "pool.balancer",
                        from = before,
                        to = inner.current_threads.load(Ordering::Acquire),
                        pending,
                        busy_ratio,
                        "scaled up"
                    );
                } else {
                    debug!(
                        target: "pool.balancer",
                        max_threads = cfg.max_threads,
                        "scale-up skipped: at capacity"
                    );
                }
            }
            continue;
        }

        if shrink {
            down_hits += 1;
            if down_hits >= cfg.debounce_hits {
                up_hits = 0;
                down_hits = 0;
                last_adjust = now;
                shrink_one(inner);
            }
            continue;
        }

        // Mixed signals reset the debounce counters.
        up_hits = 0;
        down_hits = 0;
    }
    debug!(target: "pool.balancer", "load controller exiting");
}

// Retire one idle worker: mark it, send a directed exit sentinel, join.
fn shrink_one(inner: &Arc<PoolInner>) {
    let target_id = {
        let workers = inner.workers.lock();
        if inner.current_threads.load(Ordering::Acquire) <= inner.cfg.core_threads {
            None
        } else {
            workers
                .iter()
                .find(|worker| {
                    worker.shared.idle.load(Ordering::Acquire)
                        && worker
                            .shared
                            .should_exit
                            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                            .is_ok()
                })
                .map(|worker| worker.shared.id)
        }
    };

    let Some(target_id) = target_id else {
        debug!(target: "pool.balancer", "scale-down skipped: no idle workers");
        return;
    };

    if inner.queue.push(Task::Exit(target_id)).is_err() {
        warn!(target: "pool.balancer", worker_id = target_id, "failed to enqueue exit sentinel");
        return;
    }
    debug!(target: "pool.balancer", worker_id = target_id, "exit sentinel enqueued");

    let worker = {
        let mut workers = inner.workers.lock();
        workers
            .iter()
            .position(|worker| worker.shared.id == target_id)
            .map(|index| workers.remove(index))
    };
    if let Some(mut worker) = worker {
        if let Some(handle) = worker.handle.take() {
            let _ = handle.join();
        }
    }
    info!(
        target: "pool.balancer",
        workers = inner.current_threads.load(Ordering::Acquire),
        "scaled down"
    );
}

impl ThreadPool {
    pub fn state(&self) -> PoolState {
        PoolState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn running(&self) -> bool {
        self.state() == PoolState::Running
    }

    pub fn paused(&self) -> bool {
        self.state() == PoolState::Paused
    }

    /// Tasks currently queued.
    pub fn pending(&self) -> usize {
        self.inner.queue.len()
    }

    /// Tasks currently executing.
    pub fn active_tasks(&self) -> usize {
        self.inner.active_tasks.load(Ordering::Acquire)
    }

    pub fn current_threads(&self) -> usize {
        self.inner.current_threads.load(Ordering::Acquire)
    }

    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Acquire)
    }

    pub fn queue_policy(&self) -> QueueFullPolicy {
        QueueFullPolicy::from_u8(self.inner.policy.load(Ordering::Acquire))
    }

    pub fn set_queue_policy(&self, policy: QueueFullPolicy) {
        self.inner.policy.store(policy as u8, Ordering::Release);
    }

    pub fn discarded_tasks(&self) -> u64 {
        self.inner.discarded_tasks.load(Ordering::Relaxed)
    }

    pub fn overwritten_tasks(&self) -> u64 {
        self.inner.overwritten_tasks.load(Ordering::Relaxed)
    }

    pub fn paused_waits(&self) -> u64 {
        self.inner.paused_waits.load(Ordering::Relaxed)
    }

    /// Best-effort statistics snapshot; not atomic across fields.
    pub fn stats(&self) -> PoolStats {
        let inner = &self.inner;
        let completed = inner.total_completed.load(Ordering::Relaxed);
        let exec_ns = inner.total_exec_time_ns.load(Ordering::Acquire);
        let pending = inner.queue.len();
        let capacity = inner.queue.capacity();

        PoolStats {
            total_submitted: inner.total_submitted.load(Ordering::Relaxed),
            total_completed: completed,
            total_failed: inner.total_failed.load(Ordering::Relaxed),
            total_cancelled: inner.total_cancelled.load(Ordering::Relaxed),
            total_rejected: inner.total_rejected.load(Ordering::Relaxed),
            total_exec_time: Duration::from_nanos(exec_ns),
            avg_exec_time: if completed == 0 {
                Duration::ZERO
            } else {
                Duration::from_nanos(exec_ns / completed)
            },
            pending_tasks: pending,
            busy_ratio: f64::from_bits(inner.busy_ratio_bits.load(Ordering::Relaxed)),
            pending_ratio: if capacity == 0 {
                0.0
            } else {
                pending as f64 / capacity as f64
            },
            current_threads: self.current_threads(),
            active_threads: self.active_threads(),
            peak_threads: inner.peak_threads.load(Ordering::Relaxed),
            total_threads_created: inner.total_threads_created.load(Ordering::Relaxed),
            total_threads_destroyed: inner.total_threads_destroyed.load(Ordering::Relaxed),
            discarded_tasks: self.discarded_tasks(),
            overwritten_tasks: self.overwritten_tasks(),
            paused_waits: self.paused_waits(),
        }
    }

    pub fn reset_statistics(&self) {
        let inner = &self.inner;
        inner.total_submitted.store(0, Ordering::Relaxed);
        inner.total_completed.store(0, Ordering::Relaxed);
        inner.total_failed.store(0, Ordering::Relaxed);
        inner.total_cancelled.store(0, Ordering::Relaxed);
        inner.total_rejected.store(0, Ordering::Relaxed);
        inner.total_exec_time_ns.store(0, Ordering::Relaxed);
        inner.busy_ratio_bits.store(0f64.to_bits(), Ordering::Relaxed);
        inner
            .pending_ratio_bits
            .store(0f64.to_bits(), Ordering::Relaxed);
        inner
            .peak_threads
            .store(self.current_threads(), Ordering::Relaxed);
        inner.total_threads_created.store(0, Ordering::Relaxed);
        inner.total_threads_destroyed.store(0, Ordering::Relaxed);
        inner.discarded_tasks.store(0, Ordering::Relaxed);
        inner.overwritten_tasks.store(0, Ordering::Relaxed);
        inner.paused_waits.store(0, Ordering::Relaxed);
    }
}

impl PoolInner {
    fn record_task_complete(&self, success: bool, elapsed: Duration) {
        self.total_exec_time_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        if success {
            self.total_completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_cancelled(&self) {
        self.total_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    fn record_rejected(&self) {
        self.total_rejected.fetch_add(1, Ordering::Relaxed);
    }

    fn state(&self) -> PoolState {
        PoolState::from_u8(self.state.load(Ordering::Acquire))
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        // Last user handle out turns off the lights.
        if Arc::strong_count(&self.handles) == 1 && self.state() != PoolState::Stopped {
            self.stop(StopMode::Graceful);
        }
    }
}

fn cancel_task(task: Task, err: TaskError) {
    if let Task::Run(job) = task {
        job.cancel(err);
    }
}

fn worker_loop(inner: &Arc<PoolInner>, slot: &Arc<SlotShared>) {
    debug!(target: "pool.worker", worker_id = slot.id, "worker started");
    // Balance the per-thread counters no matter how the loop exits.
    struct ExitGuard<'a> {
        inner: &'a PoolInner,
    }
    impl Drop for ExitGuard<'_> {
        fn drop(&mut self) {
            self.inner.current_threads.fetch_sub(1, Ordering::AcqRel);
            self.inner
                .total_threads_destroyed
                .fetch_add(1, Ordering::Relaxed);
            let _g = self.inner.drain_lock.lock();
            self.inner.drain_cv.notify_all();
        }
    }
    let _exit_guard = ExitGuard {
        inner: inner.as_ref(),
    };

    loop {
        {
            let mut guard = inner.pause_lock.lock();
            while inner.state() == PoolState::Paused {
                inner.paused_waits.fetch_add(1, Ordering::Relaxed);
                debug!(target: "pool.worker", worker_id = slot.id, "waiting: pool paused");
                inner.pause_cv.wait(&mut guard);
            }
        }
        if inner.state() == PoolState::ForceStopping {
            debug!(target: "pool.worker", worker_id = slot.id, "exiting: force stop");
            break;
        }

        slot.idle.store(true, Ordering::Release);
        slot.idle_streak.fetch_add(1, Ordering::Relaxed);

        let Some(task) = inner.queue.pop() else {
            if inner.queue.is_closed() {
                debug!(target: "pool.worker", worker_id = slot.id, "exiting: queue closed");
                break;
            }
            continue;
        };

        match task {
            Task::Exit(target) if target == slot.id => {
                slot.should_exit.store(false, Ordering::Release);
                info!(target: "pool.worker", worker_id = slot.id, "directed exit received");
                break;
            }
            Task::Exit(other) => {
                debug!(
                    target: "pool.worker",
                    worker_id = slot.id,
                    target_id = other,
                    "forwarding exit sentinel"
                );
                if inner.queue.push(Task::Exit(other)).is_err() {
                    warn!(target: "pool.worker", worker_id = slot.id, "failed to requeue exit sentinel");
                    break;
                }
            }
            Task::Run(job) => {
                *slot.last_active.lock() = Instant::now();
                slot.idle.store(false, Ordering::Release);
                slot.idle_streak.store(0, Ordering::Relaxed);
                inner.active_threads.fetch_add(1, Ordering::AcqRel);
                inner.active_tasks.fetch_add(1, Ordering::AcqRel);

                let started = Instant::now();
                let success = job.run();
                let elapsed = started.elapsed();
                inner.record_task_complete(success, elapsed);

                inner.active_tasks.fetch_sub(1, Ordering::AcqRel);
                inner.active_threads.fetch_sub(1, Ordering::AcqRel);
                slot.idle.store(true, Ordering::Release);
                slot.idle_streak.fetch_add(1, Ordering::Relaxed);

                if success {
                    trace!(
                        target: "pool.worker",
                        worker_id = slot.id,
                        duration_us = elapsed.as_micros() as u64,
                        pending = inner.queue.len(),
                        "task completed"
                    );
                } else {
                    error!(
                        target: "pool.worker",
                        worker_id = slot.id,
                        duration_us = elapsed.as_micros() as u64,
                        "task panicked during execution"
                    );
                }

                if inner.active_tasks.load(Ordering::Acquire) == 0 && inner.queue.is_empty() {
                    let _g = inner.drain_lock.lock();
                    inner.drain_cv.notify_all();
                }
            }
        }
    }
    debug!(target: "pool.worker", worker_id = slot.id, "worker loop exiting");
}
