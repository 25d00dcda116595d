//! # workpool
//!
//! A bounded, dynamically-sized worker pool for short-lived tasks.
//!
//! The pool amortizes thread-creation cost and caps concurrency against a
//! shared, unbounded task queue. Each worker runs tasks under an optional
//! per-attempt timeout and retry budget, and delivers terminal outcomes to
//! caller-supplied callbacks. Under dynamic sizing (`min_workers <
//! max_workers`) a background adjustment controller grows or shrinks the
//! worker roster in response to queue depth.
//!
//! ## Quick example
//!
//! ```
//! use workpool::{PoolBuilder, WorkerPoolConfig};
//!
//! let config = WorkerPoolConfig {
//!     max_workers: 4,
//!     ..WorkerPoolConfig::default()
//! };
//! let pool = PoolBuilder::<u32, std::convert::Infallible>::new(config)
//!     .result_callback(|value| assert_eq!(value, 42))
//!     .build()
//!     .expect("valid configuration");
//!
//! pool.submit(|_cancel| Ok(42)).unwrap();
//! pool.wait();
//! pool.release();
//! ```
//!
//! ## What this crate does not do
//!
//! Task prioritization, persistence across process restarts, cross-process
//! dispatch, fair scheduling, and ordered result delivery are explicit
//! non-goals. The task queue is plain FIFO at the dispatch point only;
//! completion order is unspecified.

/// Cooperative per-task cancellation token.
pub mod cancel;
/// Declarative, validated pool configuration.
pub mod config;
/// Error taxonomy for task execution and pool lifecycle.
pub mod error;
/// The mutual-exclusion capability the pool is polymorphic over.
pub mod lock;
/// The pool facade: construction, submission, quiescence, release.
pub mod pool;
/// Optional structured-logging bootstrap.
pub mod telemetry;

mod builder;
mod controller;
mod envelope;
mod queue;
mod worker;

pub use builder::PoolBuilder;
pub use cancel::CancellationToken;
pub use config::WorkerPoolConfig;
pub use error::{PoolError, TaskError};
pub use lock::{BlockingLock, Lock, LockGuard, RawLock, SpinLock};
pub use pool::{Pool, PoolStats};
