//! Integration tests for the serial scheduler.
//!
//! These tests verify ordering across producers, delayed and repeating
//! tasks, panic isolation and shutdown behavior.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use ferrule::{ScheduleError, Scheduler, SchedulerConfig, WorkerState};
use parking_lot::Mutex;

const TIMEOUT: Duration = Duration::from_secs(5);

fn barrier(scheduler: &Scheduler) {
    let (tx, rx) = mpsc::channel();
    scheduler.schedule(move || tx.send(()).unwrap()).unwrap();
    rx.recv_timeout(TIMEOUT).unwrap();
}

/// Each task observes the shared counter exactly as its predecessor left it.
#[test]
fn test_tasks_run_one_at_a_time_in_order() {
    let scheduler = Scheduler::new();
    let counter = Arc::new(AtomicUsize::new(0));
    let mismatches = Arc::new(AtomicUsize::new(0));

    for expected in 0..500 {
        let counter = Arc::clone(&counter);
        let mismatches = Arc::clone(&mismatches);
        scheduler
            .schedule(move || {
                let seen = counter.load(Ordering::SeqCst);
                if seen != expected {
                    mismatches.fetch_add(1, Ordering::SeqCst);
                }
                thread::yield_now();
                counter.store(seen + 1, Ordering::SeqCst);
            })
            .unwrap();
    }
    barrier(&scheduler);

    assert_eq!(counter.load(Ordering::SeqCst), 500);
    assert_eq!(mismatches.load(Ordering::SeqCst), 0);
}

/// Submissions from several threads keep each thread's own order.
#[test]
fn test_per_producer_order_is_preserved() {
    let scheduler = Scheduler::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let scheduler = scheduler.clone();
            let log = Arc::clone(&log);
            thread::spawn(move || {
                for i in 0..100 {
                    let log = Arc::clone(&log);
                    scheduler
                        .schedule(move || log.lock().push((producer, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    barrier(&scheduler);

    let log = log.lock();
    assert_eq!(log.len(), 400);
    for producer in 0..4 {
        let seen: Vec<_> = log
            .iter()
            .filter(|(p, _)| *p == producer)
            .map(|(_, i)| *i)
            .collect();
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }
}

/// Delayed tasks run by due time, not submission order.
#[test]
fn test_delays_order_execution() {
    let scheduler = Scheduler::new();
    let (tx, rx) = mpsc::channel();
    for (label, delay_ms) in [("c", 60), ("a", 0), ("b", 30)] {
        let tx = tx.clone();
        scheduler
            .schedule_after(
                move || tx.send(label).unwrap(),
                Duration::from_millis(delay_ms),
            )
            .unwrap();
    }

    let order: Vec<_> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    assert_eq!(order, ["a", "b", "c"]);
}

/// A repeating task keeps running on its period until cancelled.
#[test]
fn test_repeating_task_respects_period() {
    let scheduler = Scheduler::new();
    let (tx, rx) = mpsc::channel();
    let started = Instant::now();
    let handle = scheduler
        .schedule_repeating(
            move || {
                let _ = tx.send(Instant::now());
            },
            Duration::from_millis(10),
            Duration::from_millis(20),
        )
        .unwrap();

    let runs: Vec<Instant> = (0..3).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
    handle.cancel();

    assert!(runs[0] - started >= Duration::from_millis(10));
    assert!(runs[1] - runs[0] >= Duration::from_millis(20));
    assert!(runs[2] - runs[1] >= Duration::from_millis(20));
}

/// A panicking repeating task is not re-armed.
#[test]
fn test_panicking_repeating_task_stops() {
    let scheduler = Scheduler::new();
    let runs = Arc::new(AtomicUsize::new(0));
    let handle = scheduler
        .schedule_repeating(
            {
                let runs = Arc::clone(&runs);
                move || {
                    runs.fetch_add(1, Ordering::SeqCst);
                    panic!("repeating failure");
                }
            },
            Duration::ZERO,
            Duration::from_millis(1),
        )
        .unwrap();

    thread::sleep(Duration::from_millis(50));
    barrier(&scheduler);

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(handle.is_triggered());
    assert_eq!(scheduler.metrics().tasks_panicked, 1);
}

/// Worker panics are contained and later tasks still run.
#[test]
fn test_worker_survives_many_panics() {
    let scheduler = Scheduler::new();
    for i in 0..10 {
        scheduler.schedule(move || panic!("task {i} failed")).unwrap();
    }
    barrier(&scheduler);
    scheduler.stop();

    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_panicked, 10);
    assert_eq!(metrics.tasks_executed, 1);
    assert_eq!(metrics.tasks_scheduled, 11);
    assert_eq!(metrics.tasks_discarded, 0);
}

/// Dropping the last clone stops the worker and drops queued closures.
#[test]
fn test_drop_discards_pending_tasks() {
    let marker = Arc::new(());
    {
        let scheduler = Scheduler::new();
        let marker = Arc::clone(&marker);
        scheduler
            .schedule_after(move || drop(marker), Duration::from_secs(3600))
            .unwrap();
    }
    assert_eq!(Arc::strong_count(&marker), 1);
}

/// Stop from any clone is seen by every clone.
#[test]
fn test_stop_is_shared_between_clones() {
    let scheduler = Scheduler::with_config(SchedulerConfig::default()).unwrap();
    let other = scheduler.clone();

    scheduler.stop();
    scheduler.stop();

    assert_eq!(other.state(), WorkerState::Stopped);
    assert_eq!(
        other.schedule_after(|| {}, Duration::ZERO).unwrap_err(),
        ScheduleError::Stopped
    );
    assert_eq!(
        other
            .schedule_repeating(|| {}, Duration::ZERO, Duration::from_millis(1))
            .unwrap_err(),
        ScheduleError::Stopped
    );
}

/// A stop issued by a task and a stop from another thread both return.
#[test]
fn test_stop_from_task_and_caller_concurrently() {
    let scheduler = Scheduler::new();
    let (started_tx, started_rx) = mpsc::channel();
    scheduler
        .schedule({
            let scheduler = scheduler.clone();
            move || {
                started_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(100));
                scheduler.stop();
            }
        })
        .unwrap();
    started_rx.recv_timeout(TIMEOUT).unwrap();

    let (done_tx, done_rx) = mpsc::channel();
    let external = scheduler.clone();
    thread::spawn(move || {
        external.stop();
        done_tx.send(external.state()).unwrap();
    });

    assert_eq!(
        done_rx.recv_timeout(Duration::from_secs(3)).unwrap(),
        WorkerState::Stopped
    );
}

/// Submissions racing a stop are either rejected, run, or counted as
/// discarded; none is accepted and then silently lost.
#[test]
fn test_submissions_racing_stop_are_accounted_for() {
    for _ in 0..20 {
        let scheduler = Scheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let submitters: Vec<_> = (0..4)
            .map(|_| {
                let scheduler = scheduler.clone();
                let ran = Arc::clone(&ran);
                thread::spawn(move || {
                    let mut accepted = 0_u64;
                    for _ in 0..200 {
                        let ran = Arc::clone(&ran);
                        let submitted = scheduler.schedule(move || {
                            ran.fetch_add(1, Ordering::SeqCst);
                        });
                        match submitted {
                            Ok(_) => accepted += 1,
                            Err(err) => assert_eq!(err, ScheduleError::Stopped),
                        }
                    }
                    accepted
                })
            })
            .collect();

        thread::yield_now();
        scheduler.stop();
        let accepted: u64 = submitters
            .into_iter()
            .map(|submitter| submitter.join().unwrap())
            .sum();

        let metrics = scheduler.metrics();
        assert_eq!(metrics.tasks_scheduled, accepted);
        assert_eq!(
            ran.load(Ordering::SeqCst) as u64 + metrics.tasks_discarded,
            accepted
        );
    }
}
