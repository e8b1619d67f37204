//! Scheduler metrics and statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a scheduler's task counters since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Tasks accepted by `schedule*`.
    pub tasks_scheduled: u64,
    /// Task runs that returned normally. Each run of a repeating task counts.
    pub tasks_executed: u64,
    /// Task runs that panicked.
    pub tasks_panicked: u64,
    /// Tasks skipped because they were cancelled before running.
    pub tasks_cancelled: u64,
    /// Tasks dropped unexecuted at shutdown.
    pub tasks_discarded: u64,
}

/// Live counters shared between submitters and the worker.
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    scheduled: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
    cancelled: AtomicU64,
    discarded: AtomicU64,
}

impl SchedulerCounters {
    pub(crate) fn record_scheduled(&self) {
        self.scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_executed(&self) {
        self.executed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: u64) {
        self.discarded.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            tasks_scheduled: self.scheduled.load(Ordering::Relaxed),
            tasks_executed: self.executed.load(Ordering::Relaxed),
            tasks_panicked: self.panicked.load(Ordering::Relaxed),
            tasks_cancelled: self.cancelled.load(Ordering::Relaxed),
            tasks_discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = SchedulerCounters::default();
        counters.record_scheduled();
        counters.record_scheduled();
        counters.record_scheduled();
        counters.record_executed();
        counters.record_cancelled();

        let metrics = counters.snapshot();
        assert_eq!(metrics.tasks_scheduled, 3);
        assert_eq!(metrics.tasks_executed, 1);
        assert_eq!(metrics.tasks_cancelled, 1);
        assert_eq!(metrics.tasks_panicked, 0);
        assert_eq!(metrics.tasks_discarded, 0);
    }

    #[test]
    fn test_discarded_adds_batch() {
        let counters = SchedulerCounters::default();
        counters.record_discarded(4);
        counters.record_discarded(0);
        counters.record_panicked();
        assert_eq!(counters.snapshot().tasks_discarded, 4);
        assert_eq!(counters.snapshot().tasks_panicked, 1);
    }
}
