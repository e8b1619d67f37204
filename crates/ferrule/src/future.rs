//! User-facing view onto a status cell.
//!
//! A [`Future<T>`] does not own its result; it names a cell in a
//! [`FutureTable`] and keeps that cell alive. Copies alias the same cell and
//! therefore observe the same eventual outcome.
//!
//! # Observing completion
//!
//! | Style | API | Runs on |
//! |-------|-----|---------|
//! | Polling | [`Future::status`], [`Future::result`] | caller |
//! | Bounded blocking wait | [`Future::wait`] | caller |
//! | Callback | [`Future::on_completion`] | completing thread |
//! | `async`/`.await` | [`Future::completion`], `IntoFuture` | executor |

use std::fmt;
use std::future::IntoFuture;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::error::FutureError;
use crate::table::{FutureHandle, FutureStatus, FutureTable, Slot};

/// Handle to the eventual result of an asynchronous operation.
///
/// # Examples
///
/// ```
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::sync::Arc;
///
/// use ferrule::FutureTable;
///
/// let table = FutureTable::new();
/// let handle = table.alloc::<u32>(0);
/// let future = handle.future();
///
/// let seen = Arc::new(AtomicU32::new(0));
/// future.on_completion({
///     let seen = Arc::clone(&seen);
///     move |done| seen.store(done.result().unwrap_or(0), Ordering::SeqCst)
/// });
///
/// handle.complete(Ok(5));
/// assert_eq!(seen.load(Ordering::SeqCst), 5);
/// ```
pub struct Future<T> {
    table: FutureTable,
    handle: FutureHandle,
    slot: Arc<Slot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Future<T> {
    /// Builds a future that adopts a reference already taken on `handle`.
    pub(crate) fn from_parts(table: FutureTable, handle: FutureHandle, slot: Arc<Slot>) -> Self {
        Self {
            table,
            handle,
            slot,
            _marker: PhantomData,
        }
    }

    /// Returns the handle of the cell this future observes.
    #[must_use]
    pub const fn handle(&self) -> FutureHandle {
        self.handle
    }

    /// Returns the current status without blocking.
    #[inline]
    #[must_use]
    pub fn status(&self) -> FutureStatus {
        self.slot.status()
    }

    /// Returns `true` once the operation has finished.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status() == FutureStatus::Complete
    }

    /// Returns the error code and message once complete.
    ///
    /// A successful operation reports `(0, "")`. Returns `None` while pending.
    #[must_use]
    pub fn error(&self) -> Option<(i32, &str)> {
        let done = self.slot.completion()?;
        Some(
            done.error
                .as_ref()
                .map_or((0, ""), |err| (err.code, err.message.as_str())),
        )
    }

    /// Blocks the calling thread until the operation completes or `timeout`
    /// elapses, and returns the status observed at that point.
    ///
    /// Nothing is cancelled when the wait times out.
    pub fn wait(&self, timeout: Duration) -> FutureStatus {
        self.table.wait(&self.slot, timeout)
    }
}

impl<T: 'static> Future<T> {
    /// Borrows the result.
    ///
    /// # Errors
    ///
    /// - [`FutureError::ResultNotReady`] while pending.
    /// - [`FutureError::OperationFailed`] if the operation reported an error.
    pub fn result_ref(&self) -> Result<&T, FutureError> {
        let done = self.slot.completion().ok_or(FutureError::ResultNotReady)?;
        if let Some(err) = &done.error {
            return Err(err.clone().into());
        }
        done.value
            .as_deref()
            .and_then(|value| value.downcast_ref::<T>())
            .ok_or(FutureError::InvalidHandle(self.handle))
    }

    /// Returns a copy of the result. Reading never consumes it; every call
    /// after completion yields the same value.
    ///
    /// # Errors
    ///
    /// Same as [`result_ref`](Self::result_ref).
    pub fn result(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        self.result_ref().cloned()
    }

    /// Registers `callback` to run exactly once when the operation completes.
    ///
    /// The callback runs on whichever thread completes the cell. If the cell
    /// is already complete it runs immediately on the calling thread. Only
    /// one callback is kept per cell; registering another replaces (and
    /// drops without calling) the previous one, even when registered
    /// through a different copy of this future.
    pub fn on_completion<F>(&self, callback: F)
    where
        F: FnOnce(&Self) + Send + 'static,
    {
        self.table
            .register_callback(self.handle, move |table, handle, slot| {
                let future = Self::from_parts(table.clone(), handle, slot);
                callback(&future);
            });
    }

    /// Returns a [`std::future::Future`] that resolves once the operation
    /// completes.
    #[must_use]
    pub fn completion(&self) -> Completion<T> {
        Completion {
            future: self.clone(),
        }
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        self.table.add_ref(self.handle);
        Self::from_parts(self.table.clone(), self.handle, Arc::clone(&self.slot))
    }
}

impl<T> Drop for Future<T> {
    fn drop(&mut self) {
        self.table.release(self.handle);
    }
}

impl<T> PartialEq for Future<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<T> Eq for Future<T> {}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("handle", &self.handle)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Awaitable adapter returned by [`Future::completion`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Completion<T> {
    future: Future<T>,
}

impl<T: Clone + 'static> std::future::Future for Completion<T> {
    type Output = Result<T, FutureError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let future = &self.future;
        if future.is_complete()
            || future.table.register_waker(future.handle, cx.waker()) == FutureStatus::Complete
        {
            return Poll::Ready(future.result());
        }
        Poll::Pending
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Completion").field(&self.future).finish()
    }
}

impl<T: Clone + 'static> IntoFuture for Future<T> {
    type Output = Result<T, FutureError>;
    type IntoFuture = Completion<T>;

    fn into_future(self) -> Self::IntoFuture {
        Completion { future: self }
    }
}
