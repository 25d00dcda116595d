//! Builder wiring a [`WorkerPoolConfig`] together with the non-serializable
//! collaborators (callbacks, lock capability) into a running [`Pool`].
//!
//! Validates configuration first, then constructs and spawns.

use std::sync::Arc;

use crate::config::WorkerPoolConfig;
use crate::error::{PoolError, TaskError};
use crate::lock::{BlockingLock, RawLock};
use crate::pool::Pool;

type ErrorCallback<E> = Arc<dyn Fn(TaskError<E>) + Send + Sync>;
type ResultCallback<R> = Arc<dyn Fn(R) + Send + Sync>;
type TaskCallback = Arc<dyn Fn() + Send + Sync>;

/// Builds a [`Pool`] from a [`WorkerPoolConfig`] plus optional callbacks and
/// an optional lock capability override.
pub struct PoolBuilder<R, E, L = BlockingLock> {
    config: WorkerPoolConfig,
    lock: L,
    error_callback: Option<ErrorCallback<E>>,
    result_callback: Option<ResultCallback<R>>,
    task_callback: Option<TaskCallback>,
}

impl<R, E> PoolBuilder<R, E, BlockingLock>
where
    R: Send + 'static,
    E: Send + 'static,
{
    /// Start a builder from the given configuration, using the default
    /// blocking lock capability.
    #[must_use]
    pub fn new(config: WorkerPoolConfig) -> Self {
        Self {
            config,
            lock: BlockingLock::new(),
            error_callback: None,
            result_callback: None,
            task_callback: None,
        }
    }
}

impl<R, E, L> PoolBuilder<R, E, L>
where
    R: Send + 'static,
    E: Send + 'static,
    L: RawLock + 'static,
{
    /// Use a caller-supplied lock capability in place of the default
    /// blocking mutex (e.g. [`crate::lock::SpinLock`] for short, highly
    /// contended critical sections).
    pub fn with_lock<L2: RawLock + 'static>(self, lock: L2) -> PoolBuilder<R, E, L2> {
        PoolBuilder {
            config: self.config,
            lock,
            error_callback: self.error_callback,
            result_callback: self.result_callback,
            task_callback: self.task_callback,
        }
    }

    /// Invoked after a task's retries are exhausted, with the terminal
    /// error.
    #[must_use]
    pub fn error_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(TaskError<E>) + Send + Sync + 'static,
    {
        self.error_callback = Some(Arc::new(f));
        self
    }

    /// Invoked on success of a result-bearing task, with the returned
    /// value.
    #[must_use]
    pub fn result_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(R) + Send + Sync + 'static,
    {
        self.result_callback = Some(Arc::new(f));
        self
    }

    /// Invoked after every task terminates (success or failure), for
    /// accounting/tracing purposes independent of the task's outcome.
    #[must_use]
    pub fn task_callback<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.task_callback = Some(Arc::new(f));
        self
    }

    /// Validate the configuration and spawn the pool's workers (and, if
    /// dynamically sized, the adjustment controller).
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if `config` fails validation.
    pub fn build(self) -> Result<Pool<R, E, L>, PoolError> {
        self.config.validate()?;
        Ok(Pool::spawn(
            self.config,
            self.lock,
            self.error_callback,
            self.result_callback,
            self.task_callback,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn build_rejects_invalid_config() {
        let cfg = WorkerPoolConfig {
            max_workers: 0,
            ..WorkerPoolConfig::default()
        };
        let result: Result<Pool<(), Infallible>, _> = PoolBuilder::new(cfg).build();
        assert!(result.is_err());
    }

    #[test]
    fn build_succeeds_with_valid_config() {
        let cfg = WorkerPoolConfig {
            max_workers: 2,
            ..WorkerPoolConfig::default()
        };
        let pool: Pool<(), Infallible> = PoolBuilder::new(cfg).build().unwrap();
        pool.release();
    }
}
