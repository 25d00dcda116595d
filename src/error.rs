//! Error taxonomy for task execution and pool lifecycle.

use thiserror::Error;

/// A failure local to a single task attempt.
///
/// These flow through the retry loop and, if not absorbed by a successful
/// retry, reach the configured error callback. If no error callback is
/// configured they are dropped silently: observability beyond that
/// callback is an explicit non-goal of this crate.
#[derive(Debug, Error)]
pub enum TaskError<E> {
    /// The task attempt exceeded its configured timeout.
    #[error("task attempt timed out")]
    Timeout,

    /// The task callable panicked; the payload (if a string) is captured.
    #[error("task panicked: {0}")]
    Panic(String),

    /// A result-bearing task returned an application error.
    #[error("task failed: {0}")]
    User(#[source] E),

    /// The envelope was abandoned by a forced release before it started.
    #[error("task abandoned: pool was released before it started")]
    Released,
}

/// A failure at the pool level: submission or construction.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `submit` was called after `release`/`release_force` began.
    #[error("pool has been released; no further submissions are accepted")]
    Released,

    /// Construction arguments failed validation.
    #[error("invalid pool configuration: {0}")]
    Config(String),
}
