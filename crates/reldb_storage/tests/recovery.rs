//! Replay tests: a reopened store must match the store that wrote the log.

use proptest::prelude::*;
use reldb_storage::{Bucket, FileLog, MemoryLog, Store, StoreOptions, StorageError, View};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Op {
    Put(u8, u8, u8),
    Delete(u8, u8),
    DropBucket(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0u8..4, 0u8..16, any::<u8>()).prop_map(|(b, k, v)| Op::Put(b, k, v)),
        2 => (0u8..4, 0u8..16).prop_map(|(b, k)| Op::Delete(b, k)),
        1 => (0u8..4).prop_map(Op::DropBucket),
    ]
}

fn apply(store: &Store, batch: &[Op]) {
    store
        .transaction::<_, StorageError, _>(|tx| {
            for op in batch {
                match *op {
                    Op::Put(b, k, v) => {
                        tx.create_bucket_if_missing(&[vec![b'b', b]])?.put(&[b'k', k], &[v])?;
                    }
                    Op::Delete(b, k) => {
                        if let Some(mut bucket) = tx.bucket_mut(&[vec![b'b', b]])? {
                            bucket.delete(&[b'k', k])?;
                        }
                    }
                    Op::DropBucket(b) => {
                        tx.delete_bucket(&[vec![b'b', b]])?;
                    }
                }
            }
            Ok(())
        })
        .unwrap();
}

fn root(store: &Store) -> Arc<Bucket> {
    Arc::clone(store.begin_read().unwrap().root())
}

proptest! {
    #[test]
    fn reopen_matches_committed_tree(batches in prop::collection::vec(prop::collection::vec(op_strategy(), 1..8), 1..12)) {
        let log = MemoryLog::new();
        let store = Store::open(Box::new(log.clone()), StoreOptions::default()).unwrap();
        for batch in &batches {
            apply(&store, batch);
        }
        let expected = root(&store);
        store.close().unwrap();

        let reopened = Store::open(Box::new(log), StoreOptions::default()).unwrap();
        prop_assert_eq!(&*root(&reopened), &*expected);
    }
}

#[test]
fn file_log_round_trips_through_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("commit.log");

    {
        let store = Store::open(Box::new(FileLog::open(&path).unwrap()), StoreOptions::default()).unwrap();
        apply(&store, &[Op::Put(1, 1, 10), Op::Put(1, 2, 20), Op::Put(2, 1, 30)]);
        apply(&store, &[Op::Delete(1, 1), Op::DropBucket(2)]);
        store.checkpoint().unwrap();
        apply(&store, &[Op::Put(3, 3, 33)]);
        store.close().unwrap();
    }

    let store = Store::open(Box::new(FileLog::open(&path).unwrap()), StoreOptions::default()).unwrap();
    let tx = store.begin_read().unwrap();
    let one = tx.bucket(&[vec![b'b', 1]]).unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one.get(&[b'k', 2]), Some(&[20u8][..]));
    assert!(tx.bucket(&[vec![b'b', 2]]).is_none());
    assert!(tx.bucket(&[vec![b'b', 3]]).is_some());
}
