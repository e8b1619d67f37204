//! Reference-counted table of status cells.
//!
//! A [`FutureTable`] owns every status cell for one logical owner (usually a
//! single façade object). Each cell is named by a stable [`FutureHandle`] and
//! lives until all references to it are gone *and* it has completed.
//!
//! # Locking
//!
//! Every mutation (allocation, completion, reference counting, callback
//! registration) is serialized by a single mutex scoped to the table. The
//! completed outcome itself lives in a write-once cell, so reading an already
//! completed cell takes no lock at all. Callbacks, wakers and payload drops
//! always run after the table lock has been released.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use std::task::Waker;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{FutureError, OperationError};
use crate::future::Future;
use crate::tracing::internal::log_future_completed;

/// Stable identifier of one status cell.
///
/// Handles are never reused within a table. [`FutureHandle::INVALID`] never
/// names a cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureHandle(u64);

impl FutureHandle {
    /// A handle that never names a cell.
    pub const INVALID: Self = Self(0);

    /// Returns the raw numeric id.
    #[must_use]
    pub const fn id(self) -> u64 {
        self.0
    }

    /// Returns `true` unless this is [`FutureHandle::INVALID`].
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for FutureHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Completion state of a status cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FutureStatus {
    /// The operation has not finished.
    #[default]
    Pending,
    /// The operation finished, successfully or not.
    Complete,
}

pub(crate) type Payload = Arc<dyn Any + Send + Sync>;

/// The single write a cell ever receives.
pub(crate) struct Outcome {
    pub(crate) error: Option<OperationError>,
    pub(crate) value: Option<Payload>,
}

/// Immutable identity of a cell plus its write-once outcome.
pub(crate) struct Slot {
    kind: usize,
    type_id: TypeId,
    outcome: OnceLock<Outcome>,
}

impl Slot {
    fn new<T: 'static>(kind: usize) -> Self {
        Self {
            kind,
            type_id: TypeId::of::<T>(),
            outcome: OnceLock::new(),
        }
    }

    #[inline]
    pub(crate) fn completion(&self) -> Option<&Outcome> {
        self.outcome.get()
    }

    #[inline]
    pub(crate) fn status(&self) -> FutureStatus {
        if self.outcome.get().is_some() {
            FutureStatus::Complete
        } else {
            FutureStatus::Pending
        }
    }
}

type Callback = Box<dyn FnOnce(&FutureTable, FutureHandle, Arc<Slot>) + Send>;

struct Entry {
    slot: Arc<Slot>,
    ref_count: usize,
    callback: Option<Callback>,
    wakers: Vec<Waker>,
}

impl Entry {
    fn new(slot: Slot, ref_count: usize) -> Self {
        Self {
            slot: Arc::new(slot),
            ref_count,
            callback: None,
            wakers: Vec::new(),
        }
    }
}

struct TableState {
    entries: HashMap<FutureHandle, Entry>,
    last_results: HashMap<usize, FutureHandle>,
    next_id: u64,
}

impl TableState {
    fn insert(&mut self, slot: Slot, ref_count: usize) -> FutureHandle {
        self.next_id += 1;
        let handle = FutureHandle(self.next_id);
        self.entries.insert(handle, Entry::new(slot, ref_count));
        handle
    }

    /// Drops one reference. Returns the entry if it has to be reclaimed so
    /// the caller can drop it after releasing the table lock.
    fn release(&mut self, handle: FutureHandle) -> Option<Entry> {
        let entry = self.entries.get_mut(&handle)?;
        assert!(
            entry.ref_count > 0,
            "future handle {handle} released more often than referenced"
        );
        entry.ref_count -= 1;
        if entry.ref_count == 0 && entry.slot.status() == FutureStatus::Complete {
            return self.entries.remove(&handle);
        }
        None
    }
}

struct TableShared {
    state: Mutex<TableState>,
    completed: Condvar,
}

/// Read-only snapshot of one cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellView {
    /// The cell's handle.
    pub handle: FutureHandle,
    /// Operation kind tag given at allocation.
    pub kind: usize,
    /// Pending or complete.
    pub status: FutureStatus,
    /// `0` on success or while pending.
    pub error_code: i32,
    /// Empty on success or while pending.
    pub error_message: String,
    /// Outstanding references (futures, allocation handles, last-result slot).
    pub ref_count: usize,
}

/// Table of reference-counted status cells.
///
/// Cloning a `FutureTable` yields another handle to the same table.
///
/// # Examples
///
/// ```
/// use ferrule::{FutureStatus, FutureTable};
///
/// let table = FutureTable::new();
/// let handle = table.alloc::<u32>(0);
/// let future = table.future(&handle);
/// assert_eq!(future.status(), FutureStatus::Pending);
///
/// handle.complete(Ok(7));
/// assert_eq!(future.result(), Ok(7));
/// ```
#[derive(Clone)]
pub struct FutureTable {
    shared: Arc<TableShared>,
}

impl Default for FutureTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FutureTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TableShared {
                state: Mutex::new(TableState {
                    entries: HashMap::new(),
                    last_results: HashMap::new(),
                    next_id: 0,
                }),
                completed: Condvar::new(),
            }),
        }
    }

    /// Allocates a pending cell of the given operation kind.
    ///
    /// The returned handle holds the cell's first reference.
    pub fn alloc<T: Send + Sync + 'static>(&self, kind: usize) -> SafeFutureHandle<T> {
        let handle = self.shared.state.lock().insert(Slot::new::<T>(kind), 1);
        SafeFutureHandle::new(self.clone(), handle)
    }

    /// Allocates a pending cell and registers it as the last result of `kind`.
    ///
    /// The previously registered cell of that kind loses the table's
    /// reference but stays valid for every future still holding it.
    pub fn alloc_last<T: Send + Sync + 'static>(&self, kind: usize) -> SafeFutureHandle<T> {
        let (handle, reclaimed) = {
            let mut state = self.shared.state.lock();
            let handle = state.insert(Slot::new::<T>(kind), 2);
            let reclaimed = state
                .last_results
                .insert(kind, handle)
                .and_then(|previous| state.release(previous));
            (handle, reclaimed)
        };
        drop(reclaimed);
        SafeFutureHandle::new(self.clone(), handle)
    }

    /// Returns a future observing the cell behind `handle`.
    pub fn future<T: Send + Sync + 'static>(&self, handle: &SafeFutureHandle<T>) -> Future<T> {
        let slot = {
            let mut state = self.shared.state.lock();
            let entry = Self::entry_mut(&mut state, handle.handle);
            entry.ref_count += 1;
            Arc::clone(&entry.slot)
        };
        Future::from_parts(self.clone(), handle.handle, slot)
    }

    /// Returns a future for the most recent cell allocated with
    /// [`alloc_last`](Self::alloc_last) for `kind`.
    ///
    /// Returns `None` if nothing was registered for `kind` or if the
    /// registered cell does not carry a `T`.
    pub fn last_result<T: Send + Sync + 'static>(&self, kind: usize) -> Option<Future<T>> {
        let (handle, slot) = {
            let mut state = self.shared.state.lock();
            let handle = *state.last_results.get(&kind)?;
            let entry = state.entries.get_mut(&handle)?;
            if entry.slot.type_id != TypeId::of::<T>() {
                return None;
            }
            entry.ref_count += 1;
            (handle, Arc::clone(&entry.slot))
        };
        Some(Future::from_parts(self.clone(), handle, slot))
    }

    /// Moves the cell behind `handle` to the completed state.
    ///
    /// Wakes blocked waiters and async tasks, then invokes the registered
    /// completion callback (if any) on the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if the cell was already completed. A second completion would
    /// break the single-write guarantee every reader relies on.
    pub fn complete<T: Send + Sync + 'static>(
        &self,
        handle: &SafeFutureHandle<T>,
        outcome: Result<T, OperationError>,
    ) {
        let completion = match outcome {
            Ok(value) => Outcome {
                error: None,
                value: Some(Arc::new(value)),
            },
            Err(error) => Outcome {
                error: Some(error),
                value: None,
            },
        };
        self.complete_erased(handle.handle, completion);
    }

    fn complete_erased(&self, handle: FutureHandle, completion: Outcome) {
        let code = completion.error.as_ref().map_or(0, |err| err.code);
        let (callback, wakers, slot) = {
            let mut state = self.shared.state.lock();
            let entry = Self::entry_mut(&mut state, handle);
            assert!(
                entry.slot.outcome.set(completion).is_ok(),
                "future {handle} completed twice"
            );
            let callback = entry.callback.take();
            if callback.is_some() {
                // Owned by the future handed to the callback.
                entry.ref_count += 1;
            }
            let wakers = std::mem::take(&mut entry.wakers);
            let slot = Arc::clone(&entry.slot);
            self.shared.completed.notify_all();
            (callback, wakers, slot)
        };

        log_future_completed(handle.id(), slot.kind, code);

        for waker in wakers {
            waker.wake();
        }
        if let Some(callback) = callback {
            callback(self, handle, slot);
        }
    }

    /// Returns a snapshot of the cell behind `handle`.
    ///
    /// # Panics
    ///
    /// In debug builds, panics if `handle` names no live cell. Release builds
    /// return a default view instead.
    #[must_use]
    pub fn view(&self, handle: FutureHandle) -> CellView {
        let view = self.try_view(handle);
        debug_assert!(view.is_ok(), "lookup of invalid future handle {handle}");
        view.unwrap_or_default()
    }

    /// Returns a snapshot of the cell behind `handle`, or
    /// [`FutureError::InvalidHandle`] if it was never allocated or has been
    /// reclaimed.
    pub fn try_view(&self, handle: FutureHandle) -> Result<CellView, FutureError> {
        let state = self.shared.state.lock();
        let entry = state
            .entries
            .get(&handle)
            .ok_or(FutureError::InvalidHandle(handle))?;
        let (error_code, error_message) = entry
            .slot
            .completion()
            .and_then(|done| done.error.as_ref())
            .map_or((0, String::new()), |err| (err.code, err.message.clone()));
        Ok(CellView {
            handle,
            kind: entry.slot.kind,
            status: entry.slot.status(),
            error_code,
            error_message,
            ref_count: entry.ref_count,
        })
    }

    /// Returns the reference count of `handle`, or `None` if the cell has
    /// been reclaimed.
    #[must_use]
    pub fn ref_count(&self, handle: FutureHandle) -> Option<usize> {
        self.shared
            .state
            .lock()
            .entries
            .get(&handle)
            .map(|entry| entry.ref_count)
    }

    /// Number of live cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Returns `true` if no cell is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live cells that are still pending.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.shared
            .state
            .lock()
            .entries
            .values()
            .filter(|entry| entry.slot.status() == FutureStatus::Pending)
            .count()
    }

    pub(crate) fn add_ref(&self, handle: FutureHandle) {
        let mut state = self.shared.state.lock();
        Self::entry_mut(&mut state, handle).ref_count += 1;
    }

    pub(crate) fn release(&self, handle: FutureHandle) {
        let reclaimed = self.shared.state.lock().release(handle);
        drop(reclaimed);
    }

    /// Installs `callback`, replacing any earlier one, or runs it right away
    /// if the cell has already completed.
    pub(crate) fn register_callback<F>(&self, handle: FutureHandle, callback: F)
    where
        F: FnOnce(&Self, FutureHandle, Arc<Slot>) + Send + 'static,
    {
        let mut state = self.shared.state.lock();
        let entry = Self::entry_mut(&mut state, handle);
        if entry.slot.status() == FutureStatus::Complete {
            entry.ref_count += 1;
            let slot = Arc::clone(&entry.slot);
            drop(state);
            callback(self, handle, slot);
            return;
        }
        let replaced = entry.callback.replace(Box::new(callback));
        drop(state);
        drop(replaced);
    }

    /// Remembers `waker` until completion. Returns the status observed under
    /// the table lock so a completion can never slip in between.
    pub(crate) fn register_waker(&self, handle: FutureHandle, waker: &Waker) -> FutureStatus {
        let mut state = self.shared.state.lock();
        let entry = Self::entry_mut(&mut state, handle);
        if entry.slot.status() == FutureStatus::Complete {
            return FutureStatus::Complete;
        }
        if !entry.wakers.iter().any(|known| known.will_wake(waker)) {
            entry.wakers.push(waker.clone());
        }
        FutureStatus::Pending
    }

    pub(crate) fn wait(&self, slot: &Slot, timeout: Duration) -> FutureStatus {
        if slot.status() == FutureStatus::Complete {
            return FutureStatus::Complete;
        }
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self.shared.state.lock();
        while slot.status() == FutureStatus::Pending {
            match deadline {
                Some(deadline) => {
                    if self
                        .shared
                        .completed
                        .wait_until(&mut state, deadline)
                        .timed_out()
                    {
                        break;
                    }
                }
                None => self.shared.completed.wait(&mut state),
            }
        }
        slot.status()
    }

    #[track_caller]
    fn entry_mut(state: &mut TableState, handle: FutureHandle) -> &mut Entry {
        match state.entries.get_mut(&handle) {
            Some(entry) => entry,
            None => panic!("invalid future handle {handle}"),
        }
    }
}

impl fmt::Debug for FutureTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("FutureTable")
            .field("live", &state.entries.len())
            .field("last_results", &state.last_results.len())
            .finish_non_exhaustive()
    }
}

/// Typed allocation handle for a pending cell.
///
/// Held by whoever is going to complete the operation. Each handle owns one
/// reference to the cell; clones own their own. It is `Send + Sync` so it can
/// travel into scheduler tasks.
pub struct SafeFutureHandle<T> {
    table: FutureTable,
    handle: FutureHandle,
    _marker: PhantomData<fn(T)>,
}

impl<T: Send + Sync + 'static> SafeFutureHandle<T> {
    fn new(table: FutureTable, handle: FutureHandle) -> Self {
        Self {
            table,
            handle,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped handle.
    #[must_use]
    pub const fn handle(&self) -> FutureHandle {
        self.handle
    }

    /// Returns the table this handle belongs to.
    #[must_use]
    pub const fn table(&self) -> &FutureTable {
        &self.table
    }

    /// Returns a new future observing this cell.
    #[must_use]
    pub fn future(&self) -> Future<T> {
        self.table.future(self)
    }

    /// Completes the cell. See [`FutureTable::complete`].
    ///
    /// # Panics
    ///
    /// Panics if the cell was already completed.
    pub fn complete(&self, outcome: Result<T, OperationError>) {
        self.table.complete(self, outcome);
    }
}

impl<T: Send + Sync + 'static> Clone for SafeFutureHandle<T> {
    fn clone(&self) -> Self {
        self.table.add_ref(self.handle);
        Self::new(self.table.clone(), self.handle)
    }
}

impl<T> Drop for SafeFutureHandle<T> {
    fn drop(&mut self) {
        self.table.release(self.handle);
    }
}

impl<T> fmt::Debug for SafeFutureHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeFutureHandle")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
