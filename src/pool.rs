//! The pool facade: submission, quiescence waiting, and release.
//!
//! Atomics hold the hot counters, a `Mutex<Option<Sender<_>>>` makes
//! submission closeable through a shared reference, a
//! `Mutex<Vec<JoinHandle<_>>>` holds the worker roster, and shutdown joins
//! each worker with a timeout rather than blocking on it forever.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar as ParkingCondvar, Mutex as ParkingMutex};
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::WorkerPoolConfig;
use crate::controller::{self, ControllerHandle, Scalable};
use crate::envelope::{Envelope, TaskBody};
use crate::error::{PoolError, TaskError};
use crate::lock::{BlockingLock, Lock, RawLock};
use crate::queue::TaskQueue;
use crate::worker::{self, Callbacks, WorkerHandle, WorkerState, WorkerStateCell, WorkerStats};

/// The join-with-timeout window for a worker thread during release, past
/// which it is detached rather than waited on further. A runaway callable
/// is never forcibly killed, so this bounds how long shutdown waits on one.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// A snapshot of pool activity, for introspection and tests.
#[derive(Debug, Clone, Copy)]
pub struct PoolStats {
    /// Number of worker threads currently on the roster.
    pub worker_count: usize,
    /// Envelopes currently being attempted by a worker (not queued).
    pub active_tasks: u64,
    /// Envelopes waiting in the queue, not yet picked up by a worker.
    pub queued_tasks: u64,
    /// Total envelopes submitted since construction.
    pub submitted_tasks: u64,
    /// Total envelopes that reached a terminal success.
    pub completed_tasks: u64,
    /// Total envelopes that exhausted their retry budget and failed.
    pub failed_tasks: u64,
    /// Total attempt retries across all envelopes.
    pub retried_tasks: u64,
}

struct PoolInner<R, E, L: RawLock> {
    config: WorkerPoolConfig,
    queue: TaskQueue<Envelope<R, E>>,
    roster: Lock<L, Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
    inflight: AtomicU64,
    submitted: AtomicU64,
    quiescence_mutex: ParkingMutex<()>,
    quiescence_condvar: ParkingCondvar,
    shutdown: std::sync::atomic::AtomicBool,
    callbacks: Arc<Callbacks<R, E>>,
    worker_stats: Arc<WorkerStats>,
}

impl<R, E, L> PoolInner<R, E, L>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    /// Called by a worker (via the `on_task_done` callback) whenever an
    /// envelope reaches a terminal outcome.
    fn task_completed(&self) {
        if self.inflight.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.quiescence_mutex.lock();
            self.quiescence_condvar.notify_all();
        }
    }
}

impl<R, E, L> Scalable for PoolInner<R, E, L>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    fn worker_count(&self) -> usize {
        self.roster.lock().len()
    }

    fn min_workers(&self) -> usize {
        self.config.effective_min_workers()
    }

    fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    fn scale_up(self: &Arc<Self>) {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, stop_rx) = crossbeam_channel::unbounded();
        let state = Arc::new(WorkerStateCell::new(WorkerState::Starting));
        let shared = Arc::clone(self);
        let on_task_done: Arc<dyn Fn() + Send + Sync> = Arc::new(move || shared.task_completed());

        let spawned = worker::spawn(
            id,
            self.config.thread_stack_size,
            self.config.timeout,
            self.queue.receiver(),
            stop_rx,
            Arc::clone(&self.callbacks),
            Arc::clone(&self.worker_stats),
            Arc::clone(&state),
            on_task_done,
        );

        match spawned {
            Ok(join) => {
                self.roster.lock().push(WorkerHandle {
                    id,
                    stop_tx,
                    state,
                    join: Some(join),
                });
            }
            Err(e) => warn!(error = %e, "failed to spawn worker thread"),
        }
    }

    fn scale_down(self: &Arc<Self>) {
        let mut roster = self.roster.lock();
        if let Some(handle) = roster.pop() {
            handle.state.set(WorkerState::Draining);
            let _ = handle.stop_tx.send(());
            debug!(worker_id = handle.id, "worker marked draining");
            // Removed from the roster immediately; the thread itself
            // finishes its current task, if any, and exits on its own. Its
            // `JoinHandle` is dropped here rather than joined (joining
            // would block the controller tick). `release`/`release_force`
            // only need to join workers still on the roster when they run.
        }
    }
}

/// A pool of worker threads draining a shared task queue, with optional
/// per-task timeout, retry, and dynamic sizing.
pub struct Pool<R, E, L = BlockingLock>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    inner: Arc<PoolInner<R, E, L>>,
    controller: ParkingMutex<Option<ControllerHandle>>,
}

impl<R, E, L> Pool<R, E, L>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    /// Construct and start a pool: spawns `max_workers` workers under
    /// static sizing, or `min_workers` plus the adjustment controller
    /// under dynamic sizing.
    pub(crate) fn spawn(
        config: WorkerPoolConfig,
        lock: L,
        error_callback: Option<Arc<dyn Fn(TaskError<E>) + Send + Sync>>,
        result_callback: Option<Arc<dyn Fn(R) + Send + Sync>>,
        task_callback: Option<Arc<dyn Fn() + Send + Sync>>,
    ) -> Self {
        let dynamic = config.is_dynamic();
        let initial_workers = if dynamic {
            config.effective_min_workers()
        } else {
            config.max_workers
        };

        let inner = Arc::new(PoolInner {
            config: config.clone(),
            queue: TaskQueue::new(),
            roster: Lock::new(lock, Vec::with_capacity(initial_workers)),
            next_worker_id: AtomicUsize::new(0),
            inflight: AtomicU64::new(0),
            submitted: AtomicU64::new(0),
            quiescence_mutex: ParkingMutex::new(()),
            quiescence_condvar: ParkingCondvar::new(),
            shutdown: std::sync::atomic::AtomicBool::new(false),
            callbacks: Arc::new(Callbacks {
                error: error_callback,
                result: result_callback,
                task: task_callback,
            }),
            worker_stats: Arc::new(WorkerStats::default()),
        });

        for _ in 0..initial_workers {
            inner.scale_up();
        }

        let controller_handle = dynamic.then(|| controller::spawn(Arc::clone(&inner)));

        info!(
            worker_count = initial_workers,
            max_workers = config.max_workers,
            dynamic,
            "pool started"
        );

        Self {
            inner,
            controller: ParkingMutex::new(controller_handle),
        }
    }

    /// Submit a result-bearing task. `f` receives a [`CancellationToken`]
    /// it may poll to cooperatively abandon work past the configured
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Released`] if the pool has begun releasing.
    pub fn submit<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: Fn(&CancellationToken) -> Result<R, E> + Send + Sync + 'static,
    {
        self.enqueue(TaskBody::ResultBearing(Arc::new(f)))
    }

    /// Submit a fire-and-forget task. Its only possible failures are
    /// timeout and panic.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Released`] if the pool has begun releasing.
    pub fn submit_fire_and_forget<F>(&self, f: F) -> Result<(), PoolError>
    where
        F: Fn(&CancellationToken) + Send + Sync + 'static,
    {
        self.enqueue(TaskBody::FireAndForget(Arc::new(f)))
    }

    fn enqueue(&self, body: TaskBody<R, E>) -> Result<(), PoolError> {
        if self.inner.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Released);
        }
        let envelope = Envelope::new(body, self.inner.config.retry_count);
        // Counted before the push is attempted, since `wait`'s quiescence
        // check needs every queued-or-running envelope counted for as long
        // as it could possibly still be observed by a worker.
        self.inner.inflight.fetch_add(1, Ordering::AcqRel);
        self.inner.submitted.fetch_add(1, Ordering::Relaxed);
        if self.inner.queue.push(envelope) {
            return Ok(());
        }
        // Lost the race with `release`/`release_force`: the shutdown flag
        // check above passed, but the queue was closed before this push
        // landed, so no worker will ever see this envelope. Undo the
        // counters taken above rather than leaving them stuck forever.
        self.inner.submitted.fetch_sub(1, Ordering::Relaxed);
        self.inner.task_completed();
        Err(PoolError::Released)
    }

    /// Block the calling thread until every submitted task has reached a
    /// terminal outcome and the queue is empty.
    pub fn wait(&self) {
        let mut guard = self.inner.quiescence_mutex.lock();
        while self.inner.inflight.load(Ordering::Acquire) != 0 {
            self.inner.quiescence_condvar.wait(&mut guard);
        }
    }

    /// A point-in-time snapshot of pool activity.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let queued = self.inner.queue.len() as u64;
        let inflight = self.inner.inflight.load(Ordering::Acquire) as u64;
        PoolStats {
            worker_count: self.inner.roster.lock().len(),
            active_tasks: inflight.saturating_sub(queued),
            queued_tasks: queued,
            submitted_tasks: self.inner.submitted.load(Ordering::Relaxed),
            completed_tasks: self.inner.worker_stats.completed.load(Ordering::Relaxed),
            failed_tasks: self.inner.worker_stats.failed.load(Ordering::Relaxed),
            retried_tasks: self.inner.worker_stats.retried.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting new submissions and shut down, letting every
    /// already-queued task run to completion first.
    pub fn release(&self) {
        self.shutdown(true);
    }

    /// Stop accepting new submissions and shut down immediately: queued
    /// tasks that have not yet started are discarded. A task already
    /// executing still runs to completion (a runaway attempt is never
    /// forcibly killed).
    pub fn release_force(&self) {
        self.shutdown(false);
    }

    fn shutdown(&self, drain_pending: bool) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(mut controller) = self.controller.lock().take() {
            controller.stop();
        }

        if !drain_pending {
            let rx = self.inner.queue.receiver();
            let mut discarded = 0u64;
            while rx.try_recv().is_ok() {
                if let Some(cb) = self.inner.callbacks.error.as_ref() {
                    cb(TaskError::Released);
                }
                self.inner.task_completed();
                discarded += 1;
            }
            if discarded > 0 {
                warn!(discarded, "discarded queued tasks on forced release");
            }
        }

        self.inner.queue.close();

        let mut roster = self.inner.roster.lock();
        if !drain_pending {
            for handle in roster.iter() {
                let _ = handle.stop_tx.send(());
            }
        }
        for handle in roster.iter_mut() {
            handle.state.set(WorkerState::Draining);
            if let Some(join) = handle.join.take() {
                join_with_timeout(handle.id, join);
            }
        }
        roster.clear();

        info!("pool released");
    }
}

impl<R, E, L> Drop for Pool<R, E, L>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    fn drop(&mut self) {
        // Signals shutdown and closes the queue so worker threads can exit
        // on their own, but does not join them: blocking a drop could turn
        // an accidental "forgot to call release" into an unbounded hang if
        // a task never returns. Call `release` explicitly for a shutdown
        // that waits for every worker to exit before returning.
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut controller) = self.controller.lock().take() {
            controller.stop();
        }
        self.inner.queue.close();
        debug!("pool dropped without explicit release; workers will detach");
    }
}

/// Join a worker thread, detaching it instead of blocking forever if it
/// does not exit promptly, using the same helper-thread-plus-`recv_timeout`
/// idiom as a per-task timeout attempt.
fn join_with_timeout(id: usize, join: JoinHandle<()>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let helper = thread::spawn(move || {
        let ok = join.join().is_ok();
        let _ = tx.send(ok);
    });

    match rx.recv_timeout(WORKER_JOIN_TIMEOUT) {
        Ok(true) => debug!(worker_id = id, "worker joined"),
        Ok(false) => warn!(worker_id = id, "worker panicked during shutdown"),
        Err(_) => warn!(worker_id = id, "worker did not exit within timeout; detaching"),
    }
    let _ = helper.join();
}
