//! Pool configuration: the options recognized at construction, validated
//! before any thread is spawned.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PoolError;

/// Default worker count when the caller does not specify one: one worker
/// per logical CPU, matching the common default for CPU-bound worker pools.
fn default_max_workers() -> usize {
    num_cpus::get().max(1)
}

/// Declarative, serializable settings for a [`crate::pool::Pool`].
///
/// Callbacks and the lock type are not part of this struct: they are not
/// serializable and are wired up through [`crate::builder::PoolBuilder`]
/// instead, which keeps plain configuration data separate from the
/// factory closures it takes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    /// Upper bound on the number of worker threads. Must be `>= 1`.
    pub max_workers: usize,

    /// Lower bound on the number of worker threads under dynamic sizing.
    /// `None` (the default) disables the adjustment controller: the pool
    /// is statically sized at `max_workers` regardless of what
    /// `max_workers` turns out to be. Unlike a plain `usize` field, this
    /// can't silently fall out of sync with an overridden `max_workers`
    /// when only part of the struct is specified.
    #[serde(default)]
    pub min_workers: Option<usize>,

    /// Per-attempt timeout; `None`/zero disables the timeout envelope.
    #[serde(with = "duration_millis_opt", default)]
    pub timeout: Option<Duration>,

    /// Additional attempts after the first on failure. `0` disables retry.
    #[serde(default)]
    pub retry_count: u32,

    /// Stack size for worker threads, in bytes.
    #[serde(default = "default_stack_size")]
    pub thread_stack_size: usize,
}

fn default_stack_size() -> usize {
    2 * 1024 * 1024
}

mod duration_millis_opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        value.map(|d| d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let millis: Option<u64> = Option::deserialize(d)?;
        Ok(millis.map(Duration::from_millis))
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            min_workers: None,
            timeout: None,
            retry_count: 0,
            thread_stack_size: default_stack_size(),
        }
    }
}

impl WorkerPoolConfig {
    /// Start from the default configuration (`max_workers` = CPU count,
    /// static sizing, no timeout, no retry).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate option combinations, returning [`PoolError::Config`] on the
    /// first violation.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_workers == 0 {
            return Err(PoolError::Config("max_workers must be >= 1".into()));
        }
        if let Some(min_workers) = self.min_workers {
            if min_workers > self.max_workers {
                return Err(PoolError::Config(format!(
                    "min_workers ({min_workers}) must be <= max_workers ({})",
                    self.max_workers
                )));
            }
        }
        if self.thread_stack_size == 0 {
            return Err(PoolError::Config("thread_stack_size must be >= 1".into()));
        }
        Ok(())
    }

    /// The effective floor: `min_workers` if set, otherwise `max_workers`
    /// (static sizing).
    #[must_use]
    pub(crate) fn effective_min_workers(&self) -> usize {
        self.min_workers.unwrap_or(self.max_workers)
    }

    /// Whether the adjustment controller should run (dynamic sizing).
    #[must_use]
    pub(crate) fn is_dynamic(&self) -> bool {
        self.effective_min_workers() < self.max_workers
    }
}
