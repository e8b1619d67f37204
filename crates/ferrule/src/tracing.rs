//! Structured logging support.
//!
//! When the `tracing` feature is enabled, this module emits spans and events
//! for scheduler workers and future completion. Without the feature every
//! helper compiles down to nothing.

#[cfg(feature = "tracing")]
pub mod internal {
    use std::sync::atomic::{AtomicU64, Ordering};
    use tracing::{span, Level};

    /// Stable identifier of a scheduler instance.
    ///
    /// Used to correlate every event emitted by one worker thread.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchedulerId(pub u64);

    static NEXT_SCHEDULER_ID: AtomicU64 = AtomicU64::new(1);

    /// Generate the next unique scheduler ID.
    pub fn next_scheduler_id() -> SchedulerId {
        SchedulerId(NEXT_SCHEDULER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Guard returned by [`enter_worker_span`].
    pub type WorkerSpan = span::EnteredSpan;

    /// Enter the span covering a worker thread's whole life.
    pub fn enter_worker_span(id: SchedulerId) -> WorkerSpan {
        span!(Level::DEBUG, "scheduler_worker", scheduler_id = id.0).entered()
    }

    pub fn log_worker_state(id: SchedulerId, state: &str) {
        tracing::debug!(scheduler_id = id.0, state, "worker_state");
    }

    pub fn log_task_scheduled(id: SchedulerId, seq: u64, delay_ms: u64) {
        tracing::trace!(scheduler_id = id.0, seq, delay_ms, "task_scheduled");
    }

    pub fn log_task_executed(id: SchedulerId) {
        tracing::trace!(scheduler_id = id.0, "task_executed");
    }

    pub fn log_task_panicked(id: SchedulerId, message: &str) {
        tracing::error!(scheduler_id = id.0, panic = message, "task_panicked");
    }

    pub fn log_tasks_discarded(id: SchedulerId, count: usize) {
        if count > 0 {
            tracing::debug!(scheduler_id = id.0, count, "tasks_discarded");
        }
    }

    pub fn log_future_completed(handle: u64, kind: usize, error_code: i32) {
        tracing::trace!(handle, kind, error_code, "future_completed");
    }

    pub fn log_operation_abandoned(handle: u64) {
        tracing::debug!(handle, "operation_abandoned");
    }
}

#[cfg(not(feature = "tracing"))]
#[allow(clippy::missing_const_for_fn)]
pub mod internal {
    /// Stub type when tracing is disabled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SchedulerId(pub u64);

    /// Stub function when tracing is disabled.
    pub fn next_scheduler_id() -> SchedulerId {
        SchedulerId(0)
    }

    /// Stub guard when tracing is disabled.
    pub type WorkerSpan = ();

    pub fn enter_worker_span(_id: SchedulerId) -> WorkerSpan {}

    pub fn log_worker_state(_id: SchedulerId, _state: &str) {}

    pub fn log_task_scheduled(_id: SchedulerId, _seq: u64, _delay_ms: u64) {}

    pub fn log_task_executed(_id: SchedulerId) {}

    pub fn log_task_panicked(_id: SchedulerId, _message: &str) {}

    pub fn log_tasks_discarded(_id: SchedulerId, _count: usize) {}

    pub fn log_future_completed(_handle: u64, _kind: usize, _error_code: i32) {}

    pub fn log_operation_abandoned(_handle: u64) {}
}

pub use internal::SchedulerId;
