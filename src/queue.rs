//! The task queue: an unbounded FIFO handoff from producers to workers.
//!
//! Built on `crossbeam_channel`: non-blocking, unbounded enqueue from any
//! thread, and a blocking `recv` for workers that returns promptly once the
//! queue is closed and drained. The sender lives behind a `Mutex<Option<_>>`
//! so it can be dropped through `&self`, letting a shared, non-`mut` pool
//! reference close the queue on release.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

/// A FIFO channel of envelopes. Workers get their own `Receiver` clone;
/// the `Sender` is shared and closable through `&self`.
pub(crate) struct TaskQueue<T> {
    tx: Mutex<Option<Sender<T>>>,
    rx: Receiver<T>,
}

impl<T> TaskQueue<T> {
    /// Create a new, empty unbounded queue.
    pub(crate) fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    /// Non-blocking enqueue. Returns `false` without enqueueing if the
    /// queue has already been closed; callers must treat a `false` return
    /// as "this item was never observed by a worker" and unwind whatever
    /// accounting they performed in anticipation of a successful push.
    pub(crate) fn push(&self, item: T) -> bool {
        match self.tx.lock().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    /// A cloneable handle workers use to pull from the queue.
    pub(crate) fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }

    /// Drop the sender, letting every worker's blocking `recv` drain
    /// whatever is already queued and then return an error once empty.
    pub(crate) fn close(&self) {
        self.tx.lock().take();
    }

    /// Current number of envelopes waiting to be pulled. Used by the
    /// adjustment controller to decide whether to scale. Lock-free: reads
    /// the channel's internal counter directly.
    pub(crate) fn len(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_preserved() {
        let q = TaskQueue::new();
        q.push(1);
        q.push(2);
        q.push(3);
        let rx = q.receiver();
        assert_eq!(rx.recv().unwrap(), 1);
        assert_eq!(rx.recv().unwrap(), 2);
        assert_eq!(rx.recv().unwrap(), 3);
    }

    #[test]
    fn len_reflects_depth() {
        let q = TaskQueue::new();
        assert_eq!(q.len(), 0);
        q.push("a");
        q.push("b");
        assert_eq!(q.len(), 2);
        let rx = q.receiver();
        rx.recv().unwrap();
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn close_drains_then_disconnects() {
        let q = TaskQueue::new();
        q.push("a");
        q.close();
        let rx = q.receiver();
        assert_eq!(rx.recv().unwrap(), "a");
        assert!(rx.recv().is_err());
    }

    #[test]
    fn push_after_close_reports_failure() {
        let q = TaskQueue::new();
        q.close();
        assert!(!q.push("late"));
    }

    #[test]
    fn push_before_close_reports_success() {
        let q = TaskQueue::new();
        assert!(q.push("on time"));
    }
}
