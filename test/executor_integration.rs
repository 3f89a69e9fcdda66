//! Shutdown and ordering behavior of the executor pool under load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rtbridge::{Executor, ExecutorPool, ExecutorPoolBuilder, ExecutorState, SubmitError};

#[test]
fn graceful_stop_runs_every_queued_task() {
    let executor = Executor::new(0);
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let completed = Arc::clone(&completed);
        executor
            .submit(Box::new(move || {
                std::thread::sleep(Duration::from_millis(10));
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }

    executor.stop(true);
    executor.join();

    assert_eq!(executor.state(), ExecutorState::Closed);
    assert_eq!(completed.load(Ordering::SeqCst), 5);
}

#[test]
fn immediate_stop_may_abandon_queued_tasks() {
    let executor = Executor::new(0);
    let completed = Arc::new(AtomicUsize::new(0));
    let (started_tx, started_rx) = crossbeam_channel::bounded(1);

    {
        let completed = Arc::clone(&completed);
        executor
            .submit(Box::new(move || {
                let _ = started_tx.send(());
                std::thread::sleep(Duration::from_millis(30));
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }
    for _ in 0..4 {
        let completed = Arc::clone(&completed);
        executor
            .submit(Box::new(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }

    // Stop while the first task is mid-flight; abandoning the rest is
    // permitted but not required.
    started_rx.recv().unwrap();
    executor.stop(false);
    executor.join();

    assert_eq!(executor.state(), ExecutorState::Closed);
    assert!(completed.load(Ordering::SeqCst) <= 5);
}

#[test]
fn fifo_order_survives_pool_routing_to_one_executor() {
    let pool = ExecutorPool::new(4);
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let log = Arc::clone(&log);
        pool.submit_to(2, Box::new(move || log.lock().push(i)))
            .unwrap();
    }

    pool.release(true);
    assert_eq!(*log.lock(), (0..50).collect::<Vec<_>>());
}

#[test]
fn panic_in_one_task_does_not_starve_the_pool() {
    let panics = Arc::new(AtomicUsize::new(0));
    let panics2 = Arc::clone(&panics);
    let pool = ExecutorPoolBuilder::new(2)
        .panic_handler(move |_| {
            panics2.fetch_add(1, Ordering::SeqCst);
        })
        .build();

    let completed = Arc::new(AtomicUsize::new(0));
    for i in 0..20 {
        if i % 5 == 0 {
            pool.submit(Box::new(|| panic!("bad task"))).unwrap();
        } else {
            let completed = Arc::clone(&completed);
            pool.submit(Box::new(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }
    }

    pool.release(true);
    assert_eq!(panics.load(Ordering::SeqCst), 4);
    assert_eq!(completed.load(Ordering::SeqCst), 16);
}

#[test]
fn closed_pool_reports_distinct_error() {
    let pool = ExecutorPool::new(2);
    pool.release(true);

    assert_eq!(
        pool.submit(Box::new(|| {})).unwrap_err(),
        SubmitError::PoolClosed
    );

    // A single racing executor reports the narrower error.
    let executor = Executor::new(0);
    executor.stop(true);
    assert_eq!(
        executor.submit(Box::new(|| {})).unwrap_err(),
        SubmitError::ExecutorClosed
    );
    executor.join();
}

#[test]
fn bounded_queue_backpressure_resolves() {
    let pool = ExecutorPoolBuilder::new(1).queue_bound(2).build();
    let completed = Arc::new(AtomicUsize::new(0));

    // More submissions than queue slots; submitters block until the
    // consumer catches up, and every task still runs.
    for _ in 0..10 {
        let completed = Arc::clone(&completed);
        pool.submit(Box::new(move || {
            std::thread::sleep(Duration::from_millis(1));
            completed.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
    }

    pool.release(true);
    assert_eq!(completed.load(Ordering::SeqCst), 10);
}
