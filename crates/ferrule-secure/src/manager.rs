//! Asynchronous manager for per-app secure user data.

use std::fmt;
use std::sync::LazyLock;

use ferrule::{
    spawn_operation, Future, FutureTable, OperationError, SafeReference, Scheduler,
    SchedulerConfig,
};

use crate::error::{SecureErrorCode, StoreError};
use crate::store::SecureStore;

/// Scheduler shared by every manager created with [`UserSecureManager::new`],
/// so backend access is serialized process-wide.
static SHARED_SCHEDULER: LazyLock<Scheduler> = LazyLock::new(|| {
    Scheduler::with_config(SchedulerConfig {
        thread_name: "ferrule-secure".to_string(),
        ..SchedulerConfig::default()
    })
    .unwrap_or_else(|err| panic!("failed to spawn secure storage worker: {err}"))
});

/// Operation kinds, used to track the last result of each.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Load,
    Save,
    Delete,
    DeleteAll,
}

impl Operation {
    const fn kind(self) -> usize {
        self as usize
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load_user_data",
            Self::Save => "save_user_data",
            Self::Delete => "delete_user_data",
            Self::DeleteAll => "delete_all_data",
        }
    }
}

/// What scheduled operations reach through the manager's safe reference.
struct ManagerState {
    store: Box<dyn SecureStore>,
}

/// Loads, saves and deletes user data without blocking the caller.
///
/// Every method returns a [`Future`] immediately and performs the backend
/// call on the manager's scheduler. Operations run in submission order.
///
/// Dropping the manager waits for an operation that is already running, then
/// abandons the rest: their futures never complete. Use
/// [`Future::wait`](ferrule::Future::wait) with a timeout where that matters.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use ferrule::FutureStatus;
/// use ferrule_secure::{MemoryStore, UserSecureManager};
///
/// let manager = UserSecureManager::new(MemoryStore::new());
/// manager.save_user_data("app1", "secret");
/// let loaded = manager.load_user_data("app1");
///
/// assert_eq!(loaded.wait(Duration::from_secs(5)), FutureStatus::Complete);
/// assert_eq!(loaded.result().unwrap(), "secret");
/// ```
pub struct UserSecureManager {
    table: FutureTable,
    scheduler: Scheduler,
    this: SafeReference<ManagerState>,
}

impl UserSecureManager {
    /// Creates a manager over `store` that uses the process-wide scheduler.
    #[must_use]
    pub fn new(store: impl SecureStore + 'static) -> Self {
        Self::with_scheduler(store, SHARED_SCHEDULER.clone())
    }

    /// Creates a manager over `store` that runs its operations on `scheduler`.
    #[must_use]
    pub fn with_scheduler(store: impl SecureStore + 'static, scheduler: Scheduler) -> Self {
        Self {
            table: FutureTable::new(),
            scheduler,
            this: SafeReference::new(ManagerState {
                store: Box::new(store),
            }),
        }
    }

    /// Loads the data stored for `app_name`.
    ///
    /// Fails with [`SecureErrorCode::NoEntry`] if nothing is stored.
    pub fn load_user_data(&self, app_name: &str) -> Future<String> {
        let key = app_name.to_string();
        self.start(Operation::Load, check_app_name(app_name), move |state| {
            let data = state.store.load(&key)?;
            String::from_utf8(data).map_err(|err| StoreError::InvalidData(err.to_string()))
        })
    }

    /// Stores `user_data` for `app_name`, replacing earlier data.
    pub fn save_user_data(&self, app_name: &str, user_data: &str) -> Future<()> {
        let key = app_name.to_string();
        let data = user_data.as_bytes().to_vec();
        self.start(Operation::Save, check_app_name(app_name), move |state| {
            state.store.save(&key, &data)
        })
    }

    /// Removes the data stored for `app_name`. Succeeds if there was none.
    pub fn delete_user_data(&self, app_name: &str) -> Future<()> {
        let key = app_name.to_string();
        self.start(Operation::Delete, check_app_name(app_name), move |state| {
            state.store.delete(&key)
        })
    }

    /// Removes the data of every app.
    pub fn delete_all_data(&self) -> Future<()> {
        self.start(Operation::DeleteAll, Ok(()), |state| state.store.delete_all())
    }

    /// Future of the most recent [`load_user_data`](Self::load_user_data) call.
    #[must_use]
    pub fn load_user_data_last_result(&self) -> Option<Future<String>> {
        self.table.last_result(Operation::Load.kind())
    }

    /// Future of the most recent [`save_user_data`](Self::save_user_data) call.
    #[must_use]
    pub fn save_user_data_last_result(&self) -> Option<Future<()>> {
        self.table.last_result(Operation::Save.kind())
    }

    /// Future of the most recent [`delete_user_data`](Self::delete_user_data) call.
    #[must_use]
    pub fn delete_user_data_last_result(&self) -> Option<Future<()>> {
        self.table.last_result(Operation::Delete.kind())
    }

    /// Future of the most recent [`delete_all_data`](Self::delete_all_data) call.
    #[must_use]
    pub fn delete_all_data_last_result(&self) -> Option<Future<()>> {
        self.table.last_result(Operation::DeleteAll.kind())
    }

    /// Scheduler this manager submits to.
    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn start<T, F>(
        &self,
        operation: Operation,
        precheck: Result<(), OperationError>,
        op: F,
    ) -> Future<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&ManagerState) -> Result<T, StoreError> + Send + 'static,
    {
        let handle = self.table.alloc_last::<T>(operation.kind());
        let future = handle.future();

        if let Err(err) = precheck {
            tracing::debug!(operation = operation.as_str(), error = %err, "request rejected");
            handle.complete(Err(err));
            return future;
        }

        let fallback = handle.clone();
        let scheduled = spawn_operation(&self.scheduler, &self.this, handle, move |state| {
            op(state).map_err(|err| {
                if matches!(err, StoreError::NotFound(_)) {
                    tracing::debug!(operation = operation.as_str(), error = %err, "no entry");
                } else {
                    tracing::warn!(operation = operation.as_str(), error = %err, "backend failed");
                }
                OperationError::from(err)
            })
        });
        if let Err(err) = scheduled {
            tracing::warn!(operation = operation.as_str(), error = %err, "request not scheduled");
            fallback.complete(Err(SecureErrorCode::Unavailable.error(err.to_string())));
        }
        future
    }
}

fn check_app_name(app_name: &str) -> Result<(), OperationError> {
    if app_name.is_empty() {
        Err(SecureErrorCode::InvalidArgument.error("app name must not be empty"))
    } else {
        Ok(())
    }
}

impl Drop for UserSecureManager {
    fn drop(&mut self) {
        self.this.clear();
    }
}

impl fmt::Debug for UserSecureManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserSecureManager")
            .field("scheduler", &self.scheduler)
            .field("pending", &self.table.pending_len())
            .finish_non_exhaustive()
    }
}
