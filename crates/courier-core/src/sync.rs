//! Lock helpers that survive poisoning.

use std::sync::{Mutex, MutexGuard};

/// Extension trait for `Mutex` that recovers the guard from a poisoned lock.
///
/// Counters guarded by these locks are always left consistent between
/// statements, so a panic in another holder does not invalidate them.
pub trait IgnoreLock<T> {
    /// Locks the mutex, clearing any poison.
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T>;

    /// Runs `action` with exclusive access and returns its result.
    fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, action: F) -> R;
}

impl<T> IgnoreLock<T> for Mutex<T> {
    fn lock_ignore_poison(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_lock<R, F: FnOnce(&mut T) -> R>(&self, action: F) -> R {
        let mut guard = self.lock_ignore_poison();
        action(&mut guard)
    }
}
