//! Handle-based futures for callback-style asynchronous APIs.
//!
//! `ferrule` is the plumbing behind façades that expose slow operations
//! (storage, network, platform services) as non-blocking calls returning a
//! [`Future<T>`]. It has four parts:
//!
//! - **Handle table**: [`FutureTable`] owns reference-counted status cells,
//!   each named by a stable [`FutureHandle`] and written exactly once.
//! - **Futures**: [`Future<T>`] observes one cell through polling, a bounded
//!   blocking [`wait`](Future::wait), a single completion callback or
//!   `.await`. [`SafeFutureHandle<T>`] is the completing side.
//! - **Safe references**: [`SafeReference<T>`] lets a background task use its
//!   owner only while the owner is alive.
//! - **Scheduler**: [`Scheduler`] runs tasks serially on one worker thread,
//!   with optional delays, repetition and cancellation.
//!
//! [`spawn_operation`] ties them together into the template every façade
//! operation follows.
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//!
//! use ferrule::{spawn_operation, FutureStatus, FutureTable, SafeReference, Scheduler};
//!
//! struct Greeter {
//!     name: String,
//! }
//!
//! let scheduler = Scheduler::new();
//! let table = FutureTable::new();
//! let this = SafeReference::new(Greeter { name: "ferrule".to_string() });
//!
//! let handle = table.alloc::<String>(0);
//! let future = handle.future();
//! spawn_operation(&scheduler, &this, handle, |greeter| {
//!     Ok(format!("hello, {}", greeter.name))
//! })
//! .unwrap();
//!
//! assert_eq!(future.wait(Duration::from_secs(5)), FutureStatus::Complete);
//! assert_eq!(future.result().unwrap(), "hello, ferrule");
//! ```
//!
//! # Thread Safety
//!
//! Every public type is `Send + Sync`. Completion callbacks run on whichever
//! thread completes the cell, normally the scheduler's worker.
//!
//! # Feature Flags
//!
//! - `tracing` (default): emit `tracing` spans and events for worker state
//!   changes, task execution and future completion.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod future;
mod metrics;
mod operation;
mod safe_ref;
pub mod scheduler;
mod table;
mod tracing;

pub use error::{FutureError, OperationError, ScheduleError};
pub use future::{Completion, Future};
pub use metrics::SchedulerMetrics;
pub use operation::spawn_operation;
pub use safe_ref::{SafeReference, SafeReferenceLock};
pub use scheduler::{Scheduler, SchedulerConfig, TaskHandle, WorkerState};
pub use table::{CellView, FutureHandle, FutureStatus, FutureTable, SafeFutureHandle};
