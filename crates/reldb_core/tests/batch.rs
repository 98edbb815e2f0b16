//! Write batching and failure isolation.

use reldb_core::{Config, IteratingOpts, Store};
use reldb_testkit::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Flushes only when three calls are queued.
fn three_call_config(retry: bool) -> Config {
    task_config()
        .max_batch_calls(3)
        .max_batch_duration(Duration::from_secs(30))
        .retry_batch_fail(retry)
}

fn titles(store: &Store<Task>) -> Vec<String> {
    let (tasks, _) = store.get_filtered(IteratingOpts::new()).unwrap();
    let mut titles: Vec<String> = tasks.into_iter().map(|t| t.title).collect();
    titles.sort();
    titles
}

/// Queues `c0` (ok), `c1` (fails), `c2` (ok) in that order and returns
/// their results.
fn run_ok_fail_ok(store: &Store<Task>) -> [reldb_core::CoreResult<()>; 3] {
    thread::scope(|scope| {
        let c0 = scope.spawn(|| {
            store.batch(&Context::background(), |tx| {
                tx.new(Task::new("c0"))?;
                Ok(())
            })
        });
        thread::sleep(Duration::from_millis(100));
        let c1 = scope.spawn(|| {
            store.batch(&Context::background(), |tx| {
                tx.new(Task::new("c1"))?;
                Err(CoreError::invalid_operation("c1 refuses"))
            })
        });
        thread::sleep(Duration::from_millis(100));
        let c2 = scope.spawn(|| {
            store.batch(&Context::background(), |tx| {
                tx.new(Task::new("c2"))?;
                Ok(())
            })
        });
        [c0.join().unwrap(), c1.join().unwrap(), c2.join().unwrap()]
    })
}

#[test]
fn failed_call_with_retry() {
    init_test_logging();
    let store = TestStore::memory_with(three_call_config(true), None);
    let [c0, c1, c2] = run_ok_fail_ok(&store);

    assert!(c0.is_ok());
    assert!(matches!(c1, Err(CoreError::InvalidOperation { .. })));
    assert!(c2.is_ok());
    assert_eq!(titles(&store), ["c0", "c2"]);
}

#[test]
fn failed_call_without_retry() {
    let store = TestStore::memory_with(three_call_config(false), None);
    let [c0, c1, c2] = run_ok_fail_ok(&store);

    assert!(matches!(c0, Err(CoreError::BatchGroupFailed)));
    assert!(matches!(c1, Err(CoreError::InvalidOperation { .. })));
    assert!(c2.is_ok());
    assert_eq!(titles(&store), ["c2"]);
}

#[test]
fn timer_flushes_a_partial_batch() {
    let store = TestStore::memory_with(
        task_config().max_batch_calls(100).max_batch_duration(Duration::from_millis(20)),
        None,
    );
    store
        .batch(&Context::background(), |tx| {
            tx.new(Task::new("alone").user("ana"))?;
            Ok(())
        })
        .unwrap();
    assert_eq!(store.get_by_relationship("users", "ana").unwrap().len(), 1);
}

#[test]
fn concurrent_calls_all_land() {
    let store = TestStore::memory_with(
        task_config().max_batch_calls(8).max_batch_duration(Duration::from_millis(5)),
        None,
    );
    thread::scope(|scope| {
        for i in 0..24 {
            let store = &store;
            scope.spawn(move || {
                store
                    .batch(&Context::background(), move |tx| {
                        tx.new(Task::new(format!("t{i:02}")).tag("batched"))?;
                        Ok(())
                    })
                    .unwrap();
            });
        }
    });
    let stats = store.stats().unwrap();
    assert_eq!(stats.entries, 24);
    assert_eq!(stats.next_index, 24);
    assert_eq!(store.get_by_relationship("tags", "batched").unwrap().len(), 24);
}

#[test]
fn panicking_call_is_isolated() {
    let store = TestStore::memory_with(three_call_config(true), None);
    let results = thread::scope(|scope| {
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let store = &store;
                let handle = scope.spawn(move || {
                    store.batch(&Context::background(), move |tx| {
                        if i == 1 {
                            panic!("call {i} blew up");
                        }
                        tx.new(Task::new(format!("p{i}")))?;
                        Ok(())
                    })
                });
                thread::sleep(Duration::from_millis(100));
                handle
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });
    assert!(results[0].is_ok());
    assert!(matches!(&results[1], Err(CoreError::Panicked { message }) if message == "call 1 blew up"));
    assert!(results[2].is_ok());
    assert_eq!(titles(&store), ["p0", "p2"]);
}

#[test]
fn cancelled_call_fails_alone() {
    let store = TestStore::memory_with(three_call_config(false), None);
    let (done_tx, done_rx) = mpsc::channel();
    thread::scope(|scope| {
        for i in 0..3 {
            let store = &store;
            let done_tx = done_tx.clone();
            scope.spawn(move || {
                let ctx = Context::with_cancel(&Context::background());
                if i == 2 {
                    ctx.cancel();
                }
                let result = store.batch(&ctx, move |tx| {
                    tx.new(Task::new(format!("k{i}")))?;
                    Ok(())
                });
                done_tx.send((i, result)).unwrap();
            });
            thread::sleep(Duration::from_millis(100));
        }
    });
    drop(done_tx);
    let mut results: Vec<_> = done_rx.iter().collect();
    results.sort_by_key(|(i, _)| *i);
    assert!(results[0].1.is_err(), "earlier calls share the failed group");
    assert!(matches!(results[2].1, Err(CoreError::Cancelled)));
    assert!(titles(&store).iter().all(|t| t != "k2"));
}

#[test]
fn close_flushes_queued_calls() {
    let store = TestStore::memory_with(
        task_config().max_batch_calls(100).max_batch_duration(Duration::from_secs(30)),
        None,
    );
    thread::scope(|scope| {
        let waiter = scope.spawn(|| {
            store.batch(&Context::background(), |tx| {
                tx.new(Task::new("queued"))?;
                Ok(())
            })
        });
        thread::sleep(Duration::from_millis(100));
        store.close().unwrap();
        assert!(waiter.join().unwrap().is_ok());
    });
}

#[test]
fn mirror_rejects_batches() {
    let store = TestStore::memory_with(task_config().mirror(true), None);
    let err = store
        .batch(&Context::background(), |tx| {
            tx.new(Task::new("x"))?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, CoreError::MirrorWriteAttempted));
}
