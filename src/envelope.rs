//! The task envelope: a user callable plus its retry budget.
//!
//! Two task shapes are supported, tagged at the envelope level rather than
//! by parallel pool types: a fire-and-forget callable that succeeds unless
//! it times out or panics, and a result-bearing callable whose `Err` is
//! itself a failure.

use std::sync::Arc;

use crate::cancel::CancellationToken;

type FireAndForgetFn = Arc<dyn Fn(&CancellationToken) + Send + Sync>;
type ResultBearingFn<R, E> = Arc<dyn Fn(&CancellationToken) -> Result<R, E> + Send + Sync>;

/// The user-supplied work for one envelope.
///
/// Bodies are `Fn`, not `FnOnce`: a task that times out may be retried, and
/// since a runaway attempt is never forcibly killed the original attempt's
/// thread may still be running when a retry starts. The body must be
/// safely callable again from a fresh `Arc` clone rather than requiring
/// the abandoned attempt to hand ownership back.
pub(crate) enum TaskBody<R, E> {
    /// Returns nothing; failure is only timeout or panic.
    FireAndForget(FireAndForgetFn),
    /// Returns `Result<R, E>`; `Err` is a failure.
    ResultBearing(ResultBearingFn<R, E>),
}

impl<R, E> Clone for TaskBody<R, E> {
    fn clone(&self) -> Self {
        match self {
            Self::FireAndForget(f) => Self::FireAndForget(Arc::clone(f)),
            Self::ResultBearing(f) => Self::ResultBearing(Arc::clone(f)),
        }
    }
}

impl<R, E> TaskBody<R, E> {
    /// Invoke the body once, unifying both shapes into a single `Result`:
    /// fire-and-forget always yields `Ok(None)` on a normal return.
    pub(crate) fn call(&self, token: &CancellationToken) -> Result<Option<R>, E> {
        match self {
            Self::FireAndForget(f) => {
                f(token);
                Ok(None)
            }
            Self::ResultBearing(f) => f(token).map(Some),
        }
    }
}

/// The outcome of one attempt at running a [`TaskBody`].
pub(crate) enum AttemptOutcome<R, E> {
    /// The callable ran to completion successfully.
    Success(Option<R>),
    /// The callable returned an application error.
    UserFailed(E),
    /// The callable did not return within the configured timeout.
    TimedOut,
    /// The callable panicked.
    Panicked(String),
}

/// A task submitted to the pool, wrapped with its remaining retry budget.
///
/// Created at submission, consumed by exactly one worker at a time (though
/// a single envelope may pass through several attempts across retries
/// without ever being visible to more than one worker concurrently).
pub(crate) struct Envelope<R, E> {
    pub(crate) body: TaskBody<R, E>,
    pub(crate) attempts_remaining: u32,
}

impl<R, E> Envelope<R, E> {
    /// Wrap a task body with the pool's configured retry budget.
    ///
    /// `retry_count` is the number of *additional* attempts after the
    /// first.
    pub(crate) fn new(body: TaskBody<R, E>, retry_count: u32) -> Self {
        Self {
            body,
            attempts_remaining: retry_count,
        }
    }
}
