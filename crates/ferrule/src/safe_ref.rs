//! Revocable references for callbacks that may outlive their owner.
//!
//! A [`SafeReference<T>`] is a shared, lock-guarded liveness cell. The owner
//! creates it alongside itself and hands out clones (cheap, `Send + Sync`) to
//! background tasks. A task calls [`lock`](SafeReference::lock) to get
//! temporary access; the owner calls [`clear`](SafeReference::clear) from its
//! teardown path before tearing down anything the task might touch.
//!
//! `lock` and `clear` are mutually exclusive: `clear` waits for every
//! outstanding [`SafeReferenceLock`] to be released, and every `lock` that
//! starts after `clear` returned observes absence.
//!
//! # Examples
//!
//! ```
//! use ferrule::SafeReference;
//!
//! struct Owner {
//!     name: &'static str,
//! }
//!
//! let this = SafeReference::new(Owner { name: "manager" });
//! let for_task = this.clone();
//!
//! assert_eq!(for_task.lock().map(|owner| owner.name), Some("manager"));
//!
//! this.clear();
//! assert!(for_task.lock().is_none());
//! ```

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

/// Shared, revocable reference to an owner object.
pub struct SafeReference<T> {
    slot: Arc<RwLock<Option<Arc<T>>>>,
}

impl<T> SafeReference<T> {
    /// Creates a live reference to `target`.
    #[must_use]
    pub fn new(target: T) -> Self {
        Self::from_arc(Arc::new(target))
    }

    /// Creates a live reference to an already shared `target`.
    #[must_use]
    pub fn from_arc(target: Arc<T>) -> Self {
        Self {
            slot: Arc::new(RwLock::new(Some(target))),
        }
    }

    /// Attempts to obtain temporary access to the target.
    ///
    /// Returns `None` if the reference has been cleared; callers should treat
    /// that as the normal "owner is gone" outcome. While the returned lock is
    /// held, [`clear`](Self::clear) blocks, so the target stays alive.
    ///
    /// Locks may be nested on one thread, but a thread holding a lock must
    /// never call `clear` on the same reference.
    #[must_use]
    pub fn lock(&self) -> Option<SafeReferenceLock<'_, T>> {
        RwLockReadGuard::try_map(self.slot.read_recursive(), |slot| slot.as_deref())
            .ok()
            .map(|guard| SafeReferenceLock { guard })
    }

    /// Returns `true` until the reference is cleared.
    ///
    /// The answer may be stale by the time it is used; only
    /// [`lock`](Self::lock) gives a stable view.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.slot.read_recursive().is_some()
    }

    /// Revokes the reference for every clone.
    ///
    /// Blocks until all outstanding locks are released. The target is dropped
    /// here unless something else still owns its `Arc`.
    ///
    /// # Panics
    ///
    /// Panics if the reference was already cleared.
    #[track_caller]
    pub fn clear(&self) {
        let target = self.slot.write().take();
        assert!(target.is_some(), "SafeReference cleared twice");
        drop(target);
    }

    /// Returns `true` if both references share one liveness cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Clone for SafeReference<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for SafeReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeReference")
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

/// Temporary access to a live target. Keeps [`SafeReference::clear`] waiting
/// until dropped.
pub struct SafeReferenceLock<'a, T> {
    guard: MappedRwLockReadGuard<'a, T>,
}

impl<T> Deref for SafeReferenceLock<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for SafeReferenceLock<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SafeReferenceLock").field(&*self.guard).finish()
    }
}
