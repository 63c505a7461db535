//! # ExclusivityLock: FIFO mutual exclusion for lifecycle transitions.
//!
//! [`ExclusivityLock::lock`] resolves, once the lock is free, to a
//! [`ReleaseGuard`]. The lock is released when the guard drops, so release
//! happens exactly once per acquisition on every exit path (success, error,
//! early return, panic unwinding).
//!
//! ## Fairness
//! Waiters are served in the order they called `lock()`:
//! ```text
//! lock() A ──► granted
//! lock() B ──► queued ─┐
//! lock() C ──► queued ─┼─► A drops ─► B granted ─► B drops ─► C granted
//! ```

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// FIFO-fair asynchronous mutual exclusion.
///
/// Cheap to clone; clones share the same lock.
#[derive(Clone, Debug, Default)]
pub struct ExclusivityLock {
    inner: Arc<Mutex<()>>,
}

/// Proof of acquisition; releases the lock on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ReleaseGuard {
    _guard: OwnedMutexGuard<()>,
}

impl ExclusivityLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock and returns its release guard.
    pub async fn lock(&self) -> ReleaseGuard {
        ReleaseGuard {
            _guard: Arc::clone(&self.inner).lock_owned().await,
        }
    }

    /// Returns `true` while some guard is alive.
    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_on_drop() {
        let lock = ExclusivityLock::new();
        {
            let _g = lock.lock().await;
            assert!(lock.is_locked());
        }
        assert!(!lock.is_locked());
        let _again = lock.lock().await;
    }

    #[tokio::test]
    async fn test_release_on_error_path() {
        async fn fallible(lock: &ExclusivityLock) -> Result<(), &'static str> {
            let _g = lock.lock().await;
            if lock.is_locked() {
                return Err("hook failed");
            }
            Ok(())
        }

        let lock = ExclusivityLock::new();
        assert!(fallible(&lock).await.is_err());
        assert!(!lock.is_locked());
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_call_order() {
        let lock = ExclusivityLock::new();
        let order = Arc::new(SyncMutex::new(Vec::new()));

        let first = lock.lock().await;
        let mut joins = Vec::new();
        for i in 0..5 {
            let lock = lock.clone();
            let order = order.clone();
            joins.push(tokio::spawn(async move {
                let _g = lock.lock().await;
                order.lock().push(i);
            }));
            // Let the task enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(first);
        for j in joins {
            j.await.unwrap();
        }

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }
}
