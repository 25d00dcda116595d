//! The worker thread loop: dequeue, attempt with timeout, retry, callback.
//!
//! Each worker is a named, stack-sized `thread::Builder` blocking on `recv`
//! until the queue channel closes. A second, per-worker channel lets a
//! single worker be told to stop without closing the queue for everyone
//! else (a targeted stop token for the adjustment controller's scale-down).

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Select, Sender};
use tracing::{debug, trace, warn};

use crate::cancel::CancellationToken;
use crate::envelope::{AttemptOutcome, Envelope, TaskBody};
use crate::error::TaskError;

/// A worker's position in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Starting,
    Running,
    Draining,
    Exited,
}

const STARTING: u8 = 0;
const RUNNING: u8 = 1;
const DRAINING: u8 = 2;
const EXITED: u8 = 3;

/// Atomic storage for a [`WorkerState`], readable from any thread for
/// introspection/tests without locking.
#[derive(Default)]
pub(crate) struct WorkerStateCell(AtomicU8);

impl WorkerStateCell {
    pub(crate) fn new(state: WorkerState) -> Self {
        let cell = Self(AtomicU8::new(STARTING));
        cell.set(state);
        cell
    }

    pub(crate) fn set(&self, state: WorkerState) {
        let raw = match state {
            WorkerState::Starting => STARTING,
            WorkerState::Running => RUNNING,
            WorkerState::Draining => DRAINING,
            WorkerState::Exited => EXITED,
        };
        self.0.store(raw, Ordering::Release);
    }

    pub(crate) fn get(&self) -> WorkerState {
        match self.0.load(Ordering::Acquire) {
            STARTING => WorkerState::Starting,
            RUNNING => WorkerState::Running,
            DRAINING => WorkerState::Draining,
            _ => WorkerState::Exited,
        }
    }
}

/// Callbacks a worker delivers an envelope's outcome to. Shared (`Arc`)
/// across every worker and the controller.
pub(crate) struct Callbacks<R, E> {
    pub(crate) error: Option<Arc<dyn Fn(TaskError<E>) + Send + Sync>>,
    pub(crate) result: Option<Arc<dyn Fn(R) + Send + Sync>>,
    pub(crate) task: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Per-task accounting a worker updates as envelopes terminate.
pub(crate) struct WorkerStats {
    pub(crate) completed: std::sync::atomic::AtomicU64,
    pub(crate) failed: std::sync::atomic::AtomicU64,
    pub(crate) retried: std::sync::atomic::AtomicU64,
}

impl Default for WorkerStats {
    fn default() -> Self {
        Self {
            completed: std::sync::atomic::AtomicU64::new(0),
            failed: std::sync::atomic::AtomicU64::new(0),
            retried: std::sync::atomic::AtomicU64::new(0),
        }
    }
}

/// A running worker: its thread, its private stop channel, and its state.
pub(crate) struct WorkerHandle {
    pub(crate) id: usize,
    pub(crate) stop_tx: Sender<()>,
    pub(crate) state: Arc<WorkerStateCell>,
    pub(crate) join: Option<JoinHandle<()>>,
}

/// Spawn one worker thread.
///
/// `on_idle` is invoked by the worker every time it completes an envelope,
/// giving the pool a chance to notice quiescence without a dedicated poll.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn<R, E>(
    id: usize,
    stack_size: usize,
    timeout: Option<Duration>,
    task_rx: Receiver<Envelope<R, E>>,
    stop_rx: Receiver<()>,
    callbacks: Arc<Callbacks<R, E>>,
    stats: Arc<WorkerStats>,
    state: Arc<WorkerStateCell>,
    on_task_done: Arc<dyn Fn() + Send + Sync>,
) -> std::io::Result<JoinHandle<()>>
where
    R: Send + 'static,
    E: Send + 'static,
{
    thread::Builder::new()
        .name(format!("worker-pool-{id}"))
        .stack_size(stack_size)
        .spawn(move || {
            state.set(WorkerState::Running);
            debug!(worker_id = id, "worker started");
            run_loop(id, timeout, &task_rx, &stop_rx, &callbacks, &stats, &on_task_done);
            state.set(WorkerState::Exited);
            debug!(worker_id = id, "worker exited");
        })
}

fn run_loop<R, E>(
    id: usize,
    timeout: Option<Duration>,
    task_rx: &Receiver<Envelope<R, E>>,
    stop_rx: &Receiver<()>,
    callbacks: &Callbacks<R, E>,
    stats: &WorkerStats,
    on_task_done: &(dyn Fn() + Send + Sync),
) where
    R: Send + 'static,
    E: Send + 'static,
{
    loop {
        let mut sel = Select::new();
        let task_idx = sel.recv(task_rx);
        let stop_idx = sel.recv(stop_rx);
        let oper = sel.select();

        if oper.index() == stop_idx {
            let _ = oper.recv(stop_rx);
            trace!(worker_id = id, "worker received targeted stop");
            break;
        }

        debug_assert_eq!(oper.index(), task_idx);
        match oper.recv(task_rx) {
            Ok(envelope) => {
                process_envelope(envelope, timeout, callbacks, stats);
                on_task_done();
            }
            Err(_) => {
                // Queue disconnected: every producer dropped its sender and
                // the queue is drained. Graceful shutdown complete.
                break;
            }
        }
    }
}

/// Drive one envelope through attempts until it succeeds or its retry
/// budget is exhausted.
fn process_envelope<R, E>(
    mut envelope: Envelope<R, E>,
    timeout: Option<Duration>,
    callbacks: &Callbacks<R, E>,
    stats: &WorkerStats,
) where
    R: Send + 'static,
    E: Send + 'static,
{
    loop {
        match run_attempt(&envelope.body, timeout) {
            AttemptOutcome::Success(maybe_value) => {
                if let (Some(value), Some(cb)) = (maybe_value, callbacks.result.as_ref()) {
                    cb(value);
                }
                stats.completed.fetch_add(1, Ordering::Relaxed);
                break;
            }
            outcome @ (AttemptOutcome::TimedOut
            | AttemptOutcome::Panicked(_)
            | AttemptOutcome::UserFailed(_)) => {
                if envelope.attempts_remaining > 0 {
                    envelope.attempts_remaining -= 1;
                    stats.retried.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
                let err = match outcome {
                    AttemptOutcome::TimedOut => TaskError::Timeout,
                    AttemptOutcome::Panicked(payload) => TaskError::Panic(payload),
                    AttemptOutcome::UserFailed(e) => TaskError::User(e),
                    AttemptOutcome::Success(_) => unreachable!(),
                };
                if let Some(cb) = callbacks.error.as_ref() {
                    // An error callback that panics must not take the
                    // worker down with it.
                    if catch_unwind(AssertUnwindSafe(|| cb(err))).is_err() {
                        warn!("error callback panicked; discarding");
                    }
                }
                stats.failed.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    if let Some(cb) = callbacks.task.as_ref() {
        let _ = catch_unwind(AssertUnwindSafe(|| cb()));
    }
}

/// Run one attempt of a task body, enforcing `timeout` if set.
///
/// When a timeout is configured, the callable runs on a detached helper
/// thread, so a runaway callable that ignores cancellation never blocks
/// this worker past `timeout`. It is simply abandoned, never forcibly
/// killed.
fn run_attempt<R, E>(body: &TaskBody<R, E>, timeout: Option<Duration>) -> AttemptOutcome<R, E>
where
    R: Send + 'static,
    E: Send + 'static,
{
    let token = CancellationToken::new();

    let Some(timeout) = timeout else {
        return match catch_unwind(AssertUnwindSafe(|| body.call(&token))) {
            Ok(Ok(value)) => AttemptOutcome::Success(value),
            Ok(Err(e)) => AttemptOutcome::UserFailed(e),
            Err(payload) => AttemptOutcome::Panicked(panic_message(payload)),
        };
    };

    let (tx, rx) = std_mpsc::channel();
    let body = body.clone();
    let worker_token = token.clone();
    // Detached: if this attempt times out we stop waiting on it, but the
    // thread itself keeps running to completion (or forever).
    let _ = thread::spawn(move || {
        let outcome = catch_unwind(AssertUnwindSafe(|| body.call(&worker_token)));
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(Ok(value))) => AttemptOutcome::Success(value),
        Ok(Ok(Err(e))) => AttemptOutcome::UserFailed(e),
        Ok(Err(payload)) => AttemptOutcome::Panicked(panic_message(payload)),
        Err(_) => {
            token.cancel();
            AttemptOutcome::TimedOut
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::TaskBody;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    fn ok_body() -> TaskBody<u32, String> {
        TaskBody::ResultBearing(Arc::new(|_token| Ok(7)))
    }

    fn err_body() -> TaskBody<u32, String> {
        TaskBody::ResultBearing(Arc::new(|_token| Err("boom".to_string())))
    }

    fn panics_body() -> TaskBody<u32, String> {
        TaskBody::ResultBearing(Arc::new(|_token| panic!("kaboom")))
    }

    fn slow_body() -> TaskBody<u32, String> {
        TaskBody::ResultBearing(Arc::new(|_token| {
            thread::sleep(StdDuration::from_millis(200));
            Ok(1)
        }))
    }

    #[test]
    fn success_without_timeout() {
        match run_attempt(&ok_body(), None) {
            AttemptOutcome::Success(Some(7)) => {}
            _ => panic!("expected success"),
        }
    }

    #[test]
    fn user_error_without_timeout() {
        match run_attempt(&err_body(), None) {
            AttemptOutcome::UserFailed(e) => assert_eq!(e, "boom"),
            _ => panic!("expected user failure"),
        }
    }

    #[test]
    fn panic_is_captured_not_propagated() {
        match run_attempt(&panics_body(), None) {
            AttemptOutcome::Panicked(msg) => assert!(msg.contains("kaboom")),
            _ => panic!("expected panic capture"),
        }
    }

    #[test]
    fn timeout_fires_before_slow_body_finishes() {
        match run_attempt(&slow_body(), Some(StdDuration::from_millis(20))) {
            AttemptOutcome::TimedOut => {}
            _ => panic!("expected timeout"),
        }
    }

    #[test]
    fn process_envelope_retries_until_success() {
        let attempt = AtomicUsize::new(0);
        let body: TaskBody<u32, String> = TaskBody::ResultBearing(Arc::new(move |_token| {
            if attempt.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("not yet".to_string())
            } else {
                Ok(42)
            }
        }));
        let envelope = Envelope::new(body, 5);
        let stats = WorkerStats::default();
        let callbacks = Callbacks {
            error: None,
            result: Some(Arc::new(|_: u32| {})),
            task: None,
        };
        process_envelope(envelope, None, &callbacks, &stats);
        assert_eq!(stats.completed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.retried.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn process_envelope_exhausts_retries_and_reports_error() {
        let body = err_body();
        let envelope = Envelope::new(body, 2);
        let stats = WorkerStats::default();
        let reported = Arc::new(AtomicUsize::new(0));
        let reported_clone = Arc::clone(&reported);
        let callbacks = Callbacks {
            error: Some(Arc::new(move |_: TaskError<String>| {
                reported_clone.fetch_add(1, Ordering::SeqCst);
            })),
            result: None,
            task: None,
        };
        process_envelope(envelope, None, &callbacks, &stats);
        assert_eq!(stats.failed.load(Ordering::SeqCst), 1);
        assert_eq!(stats.retried.load(Ordering::SeqCst), 2);
        assert_eq!(reported.load(Ordering::SeqCst), 1);
    }
}
