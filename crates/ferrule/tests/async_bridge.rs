//! Integration tests for awaiting futures from async code.

use std::time::Duration;

use ferrule::{
    spawn_operation, FutureError, FutureTable, OperationError, SafeReference, Scheduler,
};

/// Awaiting a future resolves once the scheduler completes it.
#[tokio::test]
async fn test_await_scheduled_operation() {
    let scheduler = Scheduler::new();
    let table = FutureTable::new();
    let owner = SafeReference::new(20_u32);

    let handle = table.alloc::<u32>(0);
    let future = handle.future();
    spawn_operation(&scheduler, &owner, handle, |value| Ok(value * 2)).unwrap();

    assert_eq!(future.await, Ok(40));
}

/// Errors surface as `FutureError::OperationFailed`.
#[tokio::test]
async fn test_await_failed_operation() {
    let table = FutureTable::new();
    let handle = table.alloc::<String>(0);
    let completion = handle.future().completion();
    handle.complete(Err(OperationError::new(3, "missing")));

    assert_eq!(
        completion.await,
        Err(FutureError::OperationFailed {
            code: 3,
            message: "missing".to_string()
        })
    );
}

/// A pending future can be raced against a timeout without completing it.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_await_with_timeout_leaves_cell_pending() {
    let table = FutureTable::new();
    let handle = table.alloc::<u8>(0);
    let future = handle.future();

    let timed_out = tokio::time::timeout(Duration::from_millis(20), future.completion()).await;
    assert!(timed_out.is_err());

    let scheduler = Scheduler::new();
    scheduler
        .schedule_after(move || handle.complete(Ok(1)), Duration::from_millis(10))
        .unwrap();
    assert_eq!(future.completion().await, Ok(1));
}
