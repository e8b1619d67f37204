//! Serial background task scheduler.
//!
//! A [`Scheduler`] owns exactly one worker thread. Submitters never block:
//! tasks are pushed onto a lock-free inbox and the worker is unparked. The
//! worker moves them into a timer-ordered queue and runs them one at a time.
//!
//! # Ordering
//!
//! Tasks run in order of their due time (`submission time + delay`), ties
//! broken by submission order. Tasks submitted without delay therefore run
//! strictly FIFO. Every façade sharing one scheduler shares that single
//! order.
//!
//! # Worker states
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Idle` | Waiting for the next task or timer |
//! | `Running` | Executing a task |
//! | `Draining` | [`Scheduler::stop`] was called; the current task finishes, nothing new starts |
//! | `Stopped` | Worker exited; unstarted tasks were discarded |
//!
//! # Examples
//!
//! ```
//! use std::sync::mpsc;
//!
//! use ferrule::Scheduler;
//!
//! let scheduler = Scheduler::new();
//! let (tx, rx) = mpsc::channel();
//! scheduler.schedule(move || tx.send(42).unwrap()).unwrap();
//! assert_eq!(rx.recv().unwrap(), 42);
//! ```

mod task;
mod worker;

pub use task::TaskHandle;

use std::fmt;
use std::io;
use std::sync::atomic::{self, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam::queue::SegQueue;
use crossbeam::sync::{Parker, Unparker};
use parking_lot::Mutex;

use crate::error::ScheduleError;
use crate::metrics::{SchedulerCounters, SchedulerMetrics};
use crate::tracing::internal::{log_task_scheduled, log_worker_state, next_scheduler_id};
use crate::tracing::SchedulerId;
use task::{Job, Task, TaskControl};

/// Name given to worker threads unless configured otherwise.
pub const DEFAULT_THREAD_NAME: &str = "ferrule-scheduler";

/// Delays and periods are clamped to this so due times never overflow.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Lifecycle state of a scheduler's worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Waiting for work.
    Idle = 0,
    /// Executing a task.
    Running = 1,
    /// Finishing the current task before exiting.
    Draining = 2,
    /// Exited.
    Stopped = 3,
}

impl WorkerState {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    /// Lower-case name, as used in log events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }

    /// Returns `true` if new submissions are rejected in this state.
    #[must_use]
    pub const fn is_shutting_down(self) -> bool {
        matches!(self, Self::Draining | Self::Stopped)
    }
}

/// Worker thread configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name of the worker thread.
    pub thread_name: String,
    /// Stack size of the worker thread. `None` uses the platform default.
    pub stack_size: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            stack_size: None,
        }
    }
}

/// State shared by submitters and the worker thread.
pub(crate) struct Shared {
    id: SchedulerId,
    inbox: SegQueue<Task>,
    unparker: Unparker,
    state: AtomicU8,
    next_seq: AtomicU64,
    counters: SchedulerCounters,
}

impl Shared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        let swapped = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if swapped {
            log_worker_state(self.id, to.as_str());
        }
        swapped
    }

    fn set_state(&self, to: WorkerState) {
        self.state.store(to as u8, Ordering::SeqCst);
        log_worker_state(self.id, to.as_str());
    }

    /// Moves an active worker to `Draining`. Returns `false` if it was
    /// already shutting down.
    fn begin_drain(&self) -> bool {
        loop {
            let current = self.state();
            if current.is_shutting_down() {
                return false;
            }
            if self.transition(current, WorkerState::Draining) {
                return true;
            }
        }
    }

    fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }
}

struct SchedulerInner {
    shared: Arc<Shared>,
    worker_thread: ThreadId,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SchedulerInner {
    fn stop(&self) {
        self.shared.begin_drain();
        self.shared.unparker.unpark();

        // The guard must be gone before joining: a task on the worker may be
        // calling `stop` at the same time.
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        if self.worker_thread == thread::current().id() {
            // Stopped from inside one of its own tasks: the loop exits once
            // that task returns.
            return;
        }
        // Tasks run under catch_unwind, so a join error means the loop
        // itself died; it has stopped either way.
        let _ = handle.join();
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Handle to a serial task queue with one background worker.
///
/// Clones share the same queue and worker. The worker is stopped when the
/// last clone is dropped, or explicitly via [`stop`](Self::stop).
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Starts a scheduler with the default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to create the worker thread.
    /// Use [`with_config`](Self::with_config) to handle that case.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
            .unwrap_or_else(|err| panic!("failed to spawn scheduler worker: {err}"))
    }

    /// Starts a scheduler whose worker thread is built from `config`.
    pub fn with_config(config: SchedulerConfig) -> io::Result<Self> {
        let parker = Parker::new();
        let shared = Arc::new(Shared {
            id: next_scheduler_id(),
            inbox: SegQueue::new(),
            unparker: parker.unparker().clone(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            next_seq: AtomicU64::new(0),
            counters: SchedulerCounters::default(),
        });

        let mut builder = thread::Builder::new().name(config.thread_name);
        if let Some(size) = config.stack_size {
            builder = builder.stack_size(size);
        }
        let handle = builder.spawn({
            let shared = Arc::clone(&shared);
            move || worker::run(&shared, &parker)
        })?;

        Ok(Self {
            inner: Arc::new(SchedulerInner {
                shared,
                worker_thread: handle.thread().id(),
                worker: Mutex::new(Some(handle)),
            }),
        })
    }

    /// Queues `task` to run as soon as the worker reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Stopped`] once the scheduler is shutting down.
    pub fn schedule<F>(&self, task: F) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Job::Once(Box::new(task)), Duration::ZERO, false)
    }

    /// Queues `task` to run no earlier than `delay` from now.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Stopped`] once the scheduler is shutting down.
    pub fn schedule_after<F>(&self, task: F, delay: Duration) -> Result<TaskHandle, ScheduleError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit(Job::Once(Box::new(task)), delay, false)
    }

    /// Queues `task` to run after `delay` and then every `period` until
    /// cancelled through the returned handle.
    ///
    /// The next run is armed when the previous one returns. A run that
    /// panics stops the repetition.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::Stopped`] once the scheduler is shutting down.
    pub fn schedule_repeating<F>(
        &self,
        task: F,
        delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle, ScheduleError>
    where
        F: FnMut() + Send + 'static,
    {
        let job = Job::Repeating {
            run: Box::new(task),
            period: period.min(MAX_DELAY),
        };
        self.submit(job, delay, true)
    }

    fn submit(
        &self,
        job: Job,
        delay: Duration,
        repeating: bool,
    ) -> Result<TaskHandle, ScheduleError> {
        let shared = &self.inner.shared;
        if shared.state().is_shutting_down() {
            return Err(ScheduleError::Stopped);
        }

        let delay = delay.min(MAX_DELAY);
        let control = Arc::new(TaskControl::new(repeating));
        let seq = shared.next_seq();
        shared.inbox.push(Task {
            due: Instant::now() + delay,
            seq,
            job,
            control: Arc::clone(&control),
        });

        // `stop` may have drained the inbox between the check above and the
        // push. Whoever claims the task first decides whether it runs.
        atomic::fence(Ordering::SeqCst);
        if shared.state().is_shutting_down() && control.try_reject() {
            return Err(ScheduleError::Stopped);
        }

        shared.counters.record_scheduled();
        log_task_scheduled(
            shared.id,
            seq,
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        );
        shared.unparker.unpark();

        Ok(TaskHandle::new(control))
    }

    /// Stops the worker.
    ///
    /// The task currently running (if any) finishes; queued tasks that have
    /// not started are discarded; later submissions are rejected. Blocks
    /// until the worker thread has exited, unless called from a task running
    /// on this scheduler.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Returns the worker's current state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.inner.shared.state()
    }

    /// Returns a snapshot of the task counters.
    #[must_use]
    pub fn metrics(&self) -> SchedulerMetrics {
        self.inner.shared.counters.snapshot()
    }

    /// Returns `true` when called from this scheduler's worker thread.
    #[must_use]
    pub fn is_worker_thread(&self) -> bool {
        self.inner.worker_thread == thread::current().id()
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("id", &self.inner.shared.id.0)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
