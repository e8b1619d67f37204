//! Queued work items and their caller-side handles.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub(super) enum Job {
    Once(Box<dyn FnOnce() + Send>),
    Repeating {
        run: Box<dyn FnMut() + Send>,
        period: Duration,
    },
}

/// One queued unit of work.
pub(super) struct Task {
    pub(super) due: Instant,
    pub(super) seq: u64,
    pub(super) job: Job,
    pub(super) control: Arc<TaskControl>,
}

impl Task {
    /// Ordering key: earliest due first, submission order among equals.
    pub(super) const fn key(&self) -> (Instant, u64) {
        (self.due, self.seq)
    }
}

const QUEUED: u8 = 0;
const STARTED: u8 = 1;
const DROPPED: u8 = 2;

/// Shared between the queued task and its [`TaskHandle`].
///
/// `claim` moves out of `QUEUED` exactly once: to `STARTED` when the worker
/// first runs the task, or to `DROPPED` when the task is rejected at
/// submission or discarded at shutdown.
#[derive(Debug)]
pub(super) struct TaskControl {
    cancelled: AtomicBool,
    claim: AtomicU8,
    repeating: bool,
}

impl TaskControl {
    pub(super) const fn new(repeating: bool) -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            claim: AtomicU8::new(QUEUED),
            repeating,
        }
    }

    pub(super) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Claims the task for running. Returns `false` if it was dropped.
    /// Later runs of a repeating task find it already started.
    pub(super) fn try_start(&self) -> bool {
        match self
            .claim
            .compare_exchange(QUEUED, STARTED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == STARTED,
        }
    }

    /// Takes back a task that has not started yet. Returns `false` if the
    /// worker already claimed it.
    pub(super) fn try_reject(&self) -> bool {
        self.claim
            .compare_exchange(QUEUED, DROPPED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Marks a task as dropped at shutdown. Returns `false` if it had
    /// already been rejected at submission, so it is not counted twice.
    pub(super) fn discard(&self) -> bool {
        self.claim
            .compare_exchange(QUEUED, DROPPED, Ordering::AcqRel, Ordering::Acquire)
            .map_or_else(|current| current == STARTED, |_| true)
    }

    fn is_started(&self) -> bool {
        self.claim.load(Ordering::Acquire) == STARTED
    }
}

/// Caller-side handle to a scheduled task.
///
/// Dropping the handle does not cancel the task.
#[derive(Clone)]
pub struct TaskHandle {
    control: Arc<TaskControl>,
}

impl TaskHandle {
    pub(super) const fn new(control: Arc<TaskControl>) -> Self {
        Self { control }
    }

    /// Cancels the task.
    ///
    /// A one-shot task that has not started yet will be skipped; a repeating
    /// task stops re-arming after its current run. Returns `true` if this
    /// call prevented at least one future run, `false` if the task was
    /// already cancelled or had already run.
    pub fn cancel(&self) -> bool {
        let already = self.control.cancelled.swap(true, Ordering::AcqRel);
        !already && (self.control.repeating || !self.is_triggered())
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    /// Returns `true` once the task has started running at least once.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.control.is_started()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.is_cancelled())
            .field("triggered", &self.is_triggered())
            .field("repeating", &self.control.repeating)
            .finish()
    }
}
