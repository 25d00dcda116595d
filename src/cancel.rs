//! Cooperative per-task cancellation.
//!
//! The pool never forcibly kills a running task thread. A
//! [`CancellationToken`] is passed as the first argument to every user
//! callable; a well-behaved callable polls [`CancellationToken::is_cancelled`]
//! at convenient points and returns early. The worker itself proceeds past
//! the timeout regardless of whether the callable observed the signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag a task callable may observe to cooperatively abandon work.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a fresh, non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_through_clone() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
