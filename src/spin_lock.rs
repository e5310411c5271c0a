//! Spin Lock - busy-waiting mutual exclusion for short critical sections.
//!
//! Companion primitive to the ring for the rare shared state that two
//! threads genuinely must both mutate (the ring itself never needs it).
//! Test-and-test-and-set: the lock attempt is a single atomic swap, and
//! contended waiters spin on plain loads so the cache line stays shared
//! until the holder releases it.
//!
//! Intended for critical sections measured in nanoseconds. Anything that
//! can block or park should use a real mutex instead.

#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};
#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};

use std::cell::UnsafeCell;
use std::fmt;
use std::hint;
use std::ops::{Deref, DerefMut};

// ============================================================================
// SpinLock
// ============================================================================

/// A spin lock protecting a value of type `T`.
///
/// Locking returns a guard that dereferences to the value and releases
/// the lock on drop. There is no poisoning: a panic while holding the
/// guard still releases the lock in its unwind.
pub struct SpinLock<T> {
    locked: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: the flag serializes all access to `value`, so sharing the lock
// across threads is safe whenever the value itself may move between them.
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Create an unlocked lock around `value`.
    pub fn new(value: T) -> Self {
        SpinLock {
            locked: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquire the lock, spinning until it is free.
    ///
    /// The acquiring swap synchronizes with the releasing store of the
    /// previous holder, so everything written under the lock is visible
    /// to the next holder.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        loop {
            if !self.locked.swap(true, Ordering::Acquire) {
                return SpinLockGuard { lock: self };
            }
            // Wait on plain loads; retry the swap only once the holder
            // has cleared the flag.
            while self.locked.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// Acquire the lock only if it is free right now.
    ///
    /// # Returns
    /// `None` if another holder has the lock; no spinning.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        if !self.locked.load(Ordering::Relaxed) && !self.locked.swap(true, Ordering::Acquire) {
            Some(SpinLockGuard { lock: self })
        } else {
            None
        }
    }

    /// Consume the lock and return the value. No locking needed: owning
    /// the lock by value proves no guard exists.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    /// Mutable access through an exclusive reference, again without
    /// touching the flag.
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        SpinLock::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("value", &*guard).finish(),
            None => f.debug_struct("SpinLock").field("value", &"<locked>").finish(),
        }
    }
}

// ============================================================================
// Guard
// ============================================================================

/// RAII guard for a held [`SpinLock`]. Releases the lock when dropped.
pub struct SpinLockGuard<'a, T> {
    lock: &'a SpinLock<T>,
}

impl<T> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the guard exists, so this thread holds the flag and
        // no other reference to the value is live.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: as in `deref`.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        // Pairs with the acquiring swap of the next holder.
        self.lock.locked.store(false, Ordering::Release);
    }
}

impl<T: fmt::Debug> fmt::Debug for SpinLockGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_lock_and_mutate() {
        let lock = SpinLock::new(0u64);

        *lock.lock() = 41;
        *lock.lock() += 1;

        assert_eq!(*lock.lock(), 42);
    }

    #[test]
    fn test_try_lock_while_held() {
        let lock = SpinLock::new(5u64);

        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);

        let reacquired = lock.try_lock().expect("lock was released");
        assert_eq!(*reacquired, 5);
    }

    #[test]
    fn test_contended_counter() {
        const THREADS: usize = 4;
        const INCREMENTS: usize = 10_000;

        let lock = Arc::new(SpinLock::new(0usize));
        let mut handles = Vec::with_capacity(THREADS);

        for _ in 0..THREADS {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..INCREMENTS {
                    *lock.lock() += 1;
                }
            }));
        }
        for handle in handles {
            handle.join().expect("worker panicked");
        }

        assert_eq!(*lock.lock(), THREADS * INCREMENTS);
    }

    #[test]
    fn test_into_inner_and_get_mut() {
        let mut lock = SpinLock::new(String::from("a"));
        lock.get_mut().push('b');
        assert_eq!(lock.into_inner(), "ab");
    }

    #[test]
    fn test_default() {
        let lock: SpinLock<u64> = SpinLock::default();
        assert_eq!(*lock.lock(), 0);
    }

    #[test]
    fn test_debug_shows_value_or_locked() {
        let lock = SpinLock::new(7u64);
        assert!(format!("{:?}", lock).contains('7'));

        let guard = lock.lock();
        assert!(format!("{:?}", lock).contains("<locked>"));
        drop(guard);
    }
}
