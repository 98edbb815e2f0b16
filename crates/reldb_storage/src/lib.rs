//! # reldb Storage
//!
//! Ordered bucket store underneath reldb.
//!
//! The store holds a tree of **buckets**: each bucket maps byte keys, in
//! lexicographic order, to either a value or a nested bucket. It knows
//! nothing about entries, relationships or codecs.
//!
//! ## Design Principles
//!
//! - Single writer, many readers; readers see the tree as of their start
//! - Writes are staged in a private copy and published on commit
//! - Committed transactions are appended to a checksummed commit log
//! - The log backend is pluggable: [`MemoryLog`] or [`FileLog`]
//!
//! ## Example
//!
//! ```rust
//! use reldb_storage::{Store, StorageError, View};
//!
//! let store = Store::in_memory();
//! store
//!     .transaction::<_, StorageError, _>(|tx| {
//!         tx.create_bucket_if_missing(&["fruit"])?.put(b"apple", b"red")
//!     })
//!     .unwrap();
//!
//! let tx = store.begin_read().unwrap();
//! let fruit = tx.bucket(&["fruit"]).unwrap();
//! assert_eq!(fruit.get(b"apple"), Some(&b"red"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod cursor;
mod error;
mod frame;
mod log;
mod store;

pub use bucket::{Bucket, Node};
pub use cursor::{Cursor, CursorItem};
pub use error::{StorageError, StorageResult};
pub use frame::{decode_frames, encode_frame, snapshot_ops, DecodedLog, LogOp, FRAME_HEADER_SIZE};
pub use log::{FileLog, LogBackend, MemoryLog};
pub use store::{BucketMut, ReadTx, Store, StoreOptions, View, WriteTx};
