//! Tests for the structured events emitted by the scheduler and the table.
#![cfg(feature = "tracing")]

use std::fmt;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ferrule::{spawn_operation, FutureStatus, FutureTable, SafeReference, Scheduler};
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<String>>>);

struct MessageVisitor(Option<String>);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = MessageVisitor(None);
        event.record(&mut visitor);
        if let Some(message) = visitor.0 {
            self.0.lock().push(message);
        }
    }
}

/// Worker, completion and abandonment events all reach a global subscriber.
#[test]
fn test_lifecycle_events_are_emitted() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry()
        .with(capture.clone())
        .with(tracing_subscriber::fmt::layer().with_test_writer());
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let scheduler = Scheduler::new();
    let table = FutureTable::new();

    let owner = SafeReference::new(1_u8);
    let handle = table.alloc::<u8>(4);
    let future = handle.future();
    spawn_operation(&scheduler, &owner, handle, |value| Ok(*value)).unwrap();
    assert_eq!(future.wait(Duration::from_secs(5)), FutureStatus::Complete);

    let (gate_tx, gate_rx) = mpsc::channel::<()>();
    scheduler.schedule(move || drop(gate_rx.recv())).unwrap();
    let gone = SafeReference::new(2_u8);
    spawn_operation(&scheduler, &gone, table.alloc::<u8>(4), |value| Ok(*value)).unwrap();
    gone.clear();
    drop(gate_tx);

    scheduler.schedule(|| panic!("traced failure")).unwrap();
    let (done_tx, done_rx) = mpsc::channel();
    scheduler.schedule(move || done_tx.send(()).unwrap()).unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    scheduler
        .schedule_after(|| {}, Duration::from_secs(3600))
        .unwrap();
    scheduler.stop();

    let events = capture.0.lock();
    for expected in [
        "task_scheduled",
        "task_executed",
        "future_completed",
        "operation_abandoned",
        "task_panicked",
        "worker_state",
        "tasks_discarded",
    ] {
        assert!(
            events.iter().any(|event| event == expected),
            "missing {expected} in {events:?}"
        );
    }
}
