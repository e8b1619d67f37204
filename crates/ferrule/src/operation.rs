//! The per-operation task template shared by every façade.
//!
//! A façade method allocates a cell, hands the caller a [`Future`] and queues
//! the real work with [`spawn_operation`]. On the worker the task:
//!
//! 1. locks the façade's [`SafeReference`]; if the façade is gone the work
//!    is dropped and the future stays pending,
//! 2. runs the operation against the locked owner,
//! 3. releases the lock and completes the cell.
//!
//! The owner lock is always released before the table lock is taken, so the
//! two are never held together.
//!
//! [`Future`]: crate::Future

use crate::error::{OperationError, ScheduleError};
use crate::safe_ref::SafeReference;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::table::SafeFutureHandle;
use crate::tracing::internal::log_operation_abandoned;

/// Queues `op` on `scheduler` as an operation of the object behind `owner`,
/// completing `handle` with its outcome.
///
/// # Errors
///
/// Returns [`ScheduleError::Stopped`] if the scheduler no longer accepts
/// work. `handle` is dropped in that case; callers that want to report the
/// failure through the future should complete a clone of it.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ferrule::{spawn_operation, FutureStatus, FutureTable, SafeReference, Scheduler};
///
/// struct Counter {
///     base: u32,
/// }
///
/// let scheduler = Scheduler::new();
/// let table = FutureTable::new();
/// let owner = SafeReference::new(Counter { base: 40 });
///
/// let handle = table.alloc::<u32>(0);
/// let future = handle.future();
/// spawn_operation(&scheduler, &owner, handle, |counter| Ok(counter.base + 2)).unwrap();
///
/// assert_eq!(future.wait(Duration::from_secs(5)), FutureStatus::Complete);
/// assert_eq!(future.result(), Ok(42));
/// ```
pub fn spawn_operation<S, T, F>(
    scheduler: &Scheduler,
    owner: &SafeReference<S>,
    handle: SafeFutureHandle<T>,
    op: F,
) -> Result<TaskHandle, ScheduleError>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
    F: FnOnce(&S) -> Result<T, OperationError> + Send + 'static,
{
    let owner = owner.clone();
    scheduler.schedule(move || {
        let outcome = {
            let Some(target) = owner.lock() else {
                log_operation_abandoned(handle.handle().id());
                return;
            };
            op(&target)
        };
        handle.complete(outcome);
    })
}
