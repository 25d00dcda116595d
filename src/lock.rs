//! The mutual-exclusion capability the pool is polymorphic over.
//!
//! The pool never hardcodes a concrete lock. Internal counters and the
//! worker roster are guarded through a minimal two-operation trait so
//! callers can swap in whatever primitive suits their contention profile:
//! a blocking mutex by default, or a spinlock for the short critical
//! sections on the hot submit/complete path.

use std::cell::UnsafeCell;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex as ParkingLotMutex;

/// A mutual-exclusion capability: block until held, then release.
///
/// Implementations must uphold exclusive access between `acquire` and
/// `release`, and must release on unwind (panicking while holding the lock
/// must not poison it: the pool relies on this to keep serving tasks after
/// a worker panic, see `TaskError::Panic`).
pub trait RawLock: Send + Sync {
    /// Block the calling thread until exclusive access is held.
    fn acquire(&self);
    /// Release previously-acquired exclusive access.
    fn release(&self);
}

/// Default lock: a `parking_lot::Mutex<()>`. Fair, no poisoning, efficient
/// under contention: the right choice unless profiling says otherwise.
#[derive(Default)]
pub struct BlockingLock {
    inner: ParkingLotMutex<()>,
    // Guard is forgotten across acquire/release since RawLock has no
    // associated guard type; held instead via a raw lock/unlock pair.
}

impl BlockingLock {
    /// Create a new, unlocked `BlockingLock`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawLock for BlockingLock {
    fn acquire(&self) {
        std::mem::forget(self.inner.lock());
    }

    fn release(&self) {
        // Safety is provided by parking_lot's raw interface: acquire()
        // forgot the guard after locking, so force_unlock is paired 1:1.
        unsafe { self.inner.force_unlock() };
    }
}

/// A test-and-set spinlock for very short critical sections on contended
/// hot paths. Busy-waits instead of parking the thread, which is only
/// worth it when the critical section is a handful of instructions
/// (incrementing a counter, pushing onto a small roster), never while
/// holding it across a blocking call.
#[derive(Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    /// Create a new, unlocked `SpinLock`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RawLock for SpinLock {
    fn acquire(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A value protected by a `RawLock` capability, with a RAII guard so
/// internal pool code can never forget to release.
pub struct Lock<L: RawLock, T> {
    raw: L,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is only ever granted through `LockGuard`, which
// requires holding the raw lock for its entire lifetime.
unsafe impl<L: RawLock, T: Send> Send for Lock<L, T> {}
unsafe impl<L: RawLock, T: Send> Sync for Lock<L, T> {}

impl<L: RawLock, T> Lock<L, T> {
    /// Wrap `value` behind the given raw lock capability.
    pub fn new(raw: L, value: T) -> Self {
        Self {
            raw,
            data: UnsafeCell::new(value),
        }
    }

    /// Acquire exclusive access, blocking the caller until it is held.
    ///
    /// # Panics
    ///
    /// Does not panic. If the held guard's drop is skipped via
    /// `mem::forget`, the lock leaks held forever, the same caveat as any
    /// other RAII guard.
    pub fn lock(&self) -> LockGuard<'_, L, T> {
        self.raw.acquire();
        LockGuard { owner: self }
    }
}

/// RAII guard returned by [`Lock::lock`]. Releases the raw lock on drop.
pub struct LockGuard<'a, L: RawLock, T> {
    owner: &'a Lock<L, T>,
}

impl<L: RawLock, T> Deref for LockGuard<'_, L, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding the guard implies the raw lock is held.
        unsafe { &*self.owner.data.get() }
    }
}

impl<L: RawLock, T> DerefMut for LockGuard<'_, L, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding the guard implies the raw lock is held.
        unsafe { &mut *self.owner.data.get() }
    }
}

impl<L: RawLock, T> Drop for LockGuard<'_, L, T> {
    fn drop(&mut self) {
        self.owner.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn blocking_lock_mutual_exclusion() {
        let lock = Arc::new(Lock::new(BlockingLock::new(), 0_i64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    fn spin_lock_mutual_exclusion() {
        let lock = Arc::new(Lock::new(SpinLock::new(), 0_i64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    *lock.lock() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 8000);
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = Lock::new(BlockingLock::new(), 0);
        {
            let mut guard = lock.lock();
            *guard = 42;
        }
        // If release() did not run, this would deadlock.
        assert_eq!(*lock.lock(), 42);
    }
}
