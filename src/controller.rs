//! The adjustment controller: grows or shrinks the worker roster in
//! response to queue depth.
//!
//! Runs on its own thread, ticking on a fixed interval (a
//! `thread::Builder`-spawned loop with a `sleep` cadence).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

/// How often the controller re-evaluates the roster size.
pub(crate) const CONTROLLER_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// What the controller needs from the pool to make and act on a decision.
/// A trait (rather than a concrete `Pool` reference) keeps this module
/// independent of `Pool`'s generic parameters.
///
/// `scale_up`/`scale_down` take an `Arc<Self>` receiver (the same shape as
/// `futures`' `ArcWake`) because spawning a worker wires a callback that
/// needs its own strong reference back to the pool.
pub(crate) trait Scalable: Send + Sync {
    fn queue_depth(&self) -> usize;
    fn worker_count(&self) -> usize;
    fn min_workers(&self) -> usize;
    fn max_workers(&self) -> usize;
    fn scale_up(self: &Arc<Self>);
    fn scale_down(self: &Arc<Self>);
}

/// Handle to a running controller thread.
pub(crate) struct ControllerHandle {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Spawn the controller thread for a dynamically-sized pool.
///
/// Scale-up fires when the queue is deeper than the midpoint between
/// `min_workers` and `max_workers` and the roster has headroom. Scale-down
/// fires when the queue is shallower than `min_workers` worth of slack and
/// the roster has more than `min_workers`. Between the two sits a dead
/// band where the controller does nothing, avoiding thrash at the
/// boundary.
pub(crate) fn spawn<T>(pool: Arc<T>) -> ControllerHandle
where
    T: Scalable + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);

    let join = thread::Builder::new()
        .name("worker-pool-controller".into())
        .spawn(move || {
            info!("adjustment controller started");
            while !stop_clone.load(Ordering::Acquire) {
                tick(&pool);
                thread::sleep(CONTROLLER_TICK_INTERVAL);
            }
            info!("adjustment controller stopped");
        })
        .expect("failed to spawn adjustment controller thread");

    ControllerHandle {
        stop,
        join: Some(join),
    }
}

fn tick<T: Scalable>(pool: &Arc<T>) {
    let depth = pool.queue_depth();
    let workers = pool.worker_count();
    let min = pool.min_workers();
    let max = pool.max_workers();

    let scale_up_threshold = min + (max - min) / 2;

    if depth > scale_up_threshold && workers < max {
        debug!(depth, workers, max, "scaling up");
        pool.scale_up();
    } else if depth < min && workers > min {
        debug!(depth, workers, min, "scaling down");
        pool.scale_down();
    }
}
