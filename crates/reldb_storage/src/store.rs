//! Ordered store with single-writer, multi-reader transactions.

use crate::bucket::Bucket;
use crate::error::{display_path, StorageError, StorageResult};
use crate::frame::{decode_frames, encode_frame, snapshot_ops, LogOp};
use crate::log::{LogBackend, MemoryLog};
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Options for opening a [`Store`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Whether to sync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
        }
    }
}

struct StoreInner {
    root: RwLock<Arc<Bucket>>,
    log: Mutex<Box<dyn LogBackend>>,
    write_lock: Arc<Mutex<()>>,
    options: StoreOptions,
    closed: AtomicBool,
}

/// An ordered key-value store of nested buckets.
///
/// The whole tree lives in memory; committed write transactions are appended
/// to a [`LogBackend`] and replayed on open.
///
/// ## Concurrency
///
/// - Any number of read transactions, each pinned to the root it started with
/// - One write transaction at a time: `begin_write` blocks while another
///   writer is active
///
/// Cloning a `Store` yields another handle to the same store.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

impl Store {
    /// Opens a store over a log, replaying every committed frame.
    ///
    /// A torn trailing frame is cut off; a corrupted frame fails the open.
    pub fn open(mut log: Box<dyn LogBackend>, options: StoreOptions) -> StorageResult<Self> {
        let bytes = log.read_all()?;
        let decoded = decode_frames(&bytes)?;

        let mut root = Bucket::new();
        for ops in &decoded.frames {
            for op in ops {
                op.apply(&mut root)?;
            }
        }

        if decoded.valid_len < bytes.len() as u64 {
            warn!(
                valid_len = decoded.valid_len,
                log_len = bytes.len(),
                "discarding torn commit log tail"
            );
            log.truncate(decoded.valid_len)?;
        }

        info!(frames = decoded.frames.len(), "store opened");

        Ok(Self {
            inner: Arc::new(StoreInner {
                root: RwLock::new(Arc::new(root)),
                log: Mutex::new(log),
                write_lock: Arc::new(Mutex::new(())),
                options,
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Opens an empty, non-persistent store.
    #[must_use]
    pub fn in_memory() -> Self {
        let options = StoreOptions {
            sync_on_commit: false,
        };
        Self {
            inner: Arc::new(StoreInner {
                root: RwLock::new(Arc::new(Bucket::new())),
                log: Mutex::new(Box::new(MemoryLog::new())),
                write_lock: Arc::new(Mutex::new(())),
                options,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Begins a read transaction over the current committed tree.
    pub fn begin_read(&self) -> StorageResult<ReadTx> {
        self.ensure_open()?;
        Ok(ReadTx {
            root: Arc::clone(&self.inner.root.read()),
        })
    }

    /// Begins a write transaction, waiting for any active writer to finish.
    pub fn begin_write(&self) -> StorageResult<WriteTx> {
        self.ensure_open()?;
        let guard = self.inner.write_lock.lock_arc();
        // Re-check: the store may have closed while we waited.
        self.ensure_open()?;
        let root = Bucket::clone(&self.inner.root.read());
        Ok(WriteTx {
            store: Arc::clone(&self.inner),
            root,
            ops: Vec::new(),
            committed: false,
            _guard: guard,
        })
    }

    /// Runs `f` in a read transaction.
    pub fn read_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let tx = self.begin_read()?;
        f(&tx)
    }

    /// Runs `f` in a write transaction.
    ///
    /// The transaction commits if `f` returns `Ok` and rolls back otherwise.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut WriteTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut tx = self.begin_write()?;
        let value = f(&mut tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Rewrites the commit log as a single snapshot frame.
    ///
    /// The snapshot replaces the log atomically, so a crash mid-checkpoint
    /// reopens to the same tree.
    pub fn checkpoint(&self) -> StorageResult<()> {
        self.ensure_open()?;
        let _writer = self.inner.write_lock.lock();
        let root = Arc::clone(&self.inner.root.read());
        let frame = encode_frame(&snapshot_ops(&root))?;

        let mut log = self.inner.log.lock();
        let before = log.len()?;
        log.replace(&frame)?;
        info!(before, after = frame.len(), "commit log checkpointed");
        Ok(())
    }

    /// Returns the commit log length in bytes.
    pub fn log_len(&self) -> StorageResult<u64> {
        self.inner.log.lock().len()
    }

    /// Closes the store. Later transactions fail with [`StorageError::Closed`].
    pub fn close(&self) -> StorageResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // Wait for an in-flight writer so its commit is not cut short.
        let _writer = self.inner.write_lock.lock();
        self.inner.log.lock().sync()
    }

    /// Returns true until [`close`](Self::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StorageError::Closed)
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("is_open", &self.is_open())
            .field("sync_on_commit", &self.inner.options.sync_on_commit)
            .finish_non_exhaustive()
    }
}

/// Read access shared by read and write transactions.
pub trait View {
    /// Returns a snapshot of the bucket at `path`.
    fn bucket<P: AsRef<[u8]>>(&self, path: &[P]) -> Option<Arc<Bucket>>;
}

/// A read-only transaction pinned to one committed tree.
#[derive(Debug, Clone)]
pub struct ReadTx {
    root: Arc<Bucket>,
}

impl ReadTx {
    /// Returns the root bucket.
    #[must_use]
    pub fn root(&self) -> &Arc<Bucket> {
        &self.root
    }
}

impl View for ReadTx {
    fn bucket<P: AsRef<[u8]>>(&self, path: &[P]) -> Option<Arc<Bucket>> {
        self.root.descend(&owned_path(path))
    }
}

/// An exclusive write transaction.
///
/// Mutations apply to a private copy of the tree and are published on
/// [`commit`](Self::commit). Dropping the transaction without committing
/// discards them. The transaction owns its writer lock, so it may be moved to
/// another thread.
pub struct WriteTx {
    store: Arc<StoreInner>,
    root: Bucket,
    ops: Vec<LogOp>,
    committed: bool,
    _guard: ArcMutexGuard<RawMutex, ()>,
}

impl WriteTx {
    /// Returns a mutable handle on the bucket at `path`, if it exists.
    pub fn bucket_mut<P: AsRef<[u8]>>(&mut self, path: &[P]) -> StorageResult<Option<BucketMut<'_>>> {
        let path = owned_path(path);
        let Self { root, ops, .. } = self;
        Ok(root
            .descend_mut(&path, false)?
            .map(|bucket| BucketMut { bucket, path, ops }))
    }

    /// Returns a mutable handle on the bucket at `path`, creating it and any
    /// missing parents.
    pub fn create_bucket_if_missing<P: AsRef<[u8]>>(&mut self, path: &[P]) -> StorageResult<BucketMut<'_>> {
        let path = owned_path(path);
        let Self { root, ops, .. } = self;
        if root.descend_mut(&path, false)?.is_none() {
            ops.push(LogOp::CreateBucket { path: path.clone() });
        }
        let bucket = root
            .descend_mut(&path, true)?
            .ok_or_else(|| StorageError::bucket_not_found(&path))?;
        Ok(BucketMut { bucket, path, ops })
    }

    /// Deletes the bucket at `path` with everything inside it.
    ///
    /// Returns false if it did not exist.
    pub fn delete_bucket<P: AsRef<[u8]>>(&mut self, path: &[P]) -> StorageResult<bool> {
        let mut path = owned_path(path);
        let Some(key) = path.pop() else {
            return Err(StorageError::incompatible(&path, "cannot delete the root bucket"));
        };
        match self.bucket_mut(&path)? {
            Some(mut parent) => parent.delete_bucket(&key),
            None => Ok(false),
        }
    }

    /// Returns the number of mutations recorded so far.
    #[must_use]
    pub fn pending_ops(&self) -> usize {
        self.ops.len()
    }

    /// Commits the transaction: appends its frame to the log, then publishes
    /// the new tree to readers.
    pub fn commit(mut self) -> StorageResult<()> {
        if self.store.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        if !self.ops.is_empty() {
            let frame = encode_frame(&self.ops)?;
            let mut log = self.store.log.lock();
            log.append(&frame)?;
            if self.store.options.sync_on_commit {
                log.sync()?;
            }
        }
        let root = std::mem::take(&mut self.root);
        *self.store.root.write() = Arc::new(root);
        debug!(ops = self.ops.len(), "write transaction committed");
        self.committed = true;
        Ok(())
    }

    /// Discards the transaction.
    pub fn rollback(self) {
        drop(self);
    }
}

impl View for WriteTx {
    fn bucket<P: AsRef<[u8]>>(&self, path: &[P]) -> Option<Arc<Bucket>> {
        let path = owned_path(path);
        match path.split_first() {
            None => Some(Arc::new(self.root.clone())),
            Some((head, rest)) => self.root.bucket(head)?.descend(rest),
        }
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if !self.committed && !self.ops.is_empty() {
            debug!(ops = self.ops.len(), "write transaction rolled back");
        }
    }
}

impl std::fmt::Debug for WriteTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteTx")
            .field("pending_ops", &self.ops.len())
            .field("committed", &self.committed)
            .finish_non_exhaustive()
    }
}

/// A mutable handle on one bucket of a write transaction.
pub struct BucketMut<'a> {
    bucket: &'a mut Bucket,
    path: Vec<Vec<u8>>,
    ops: &'a mut Vec<LogOp>,
}

impl BucketMut<'_> {
    /// Returns the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.bucket.get(key)
    }

    /// Returns true if `key` exists as a value or nested bucket.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.bucket.contains_key(key)
    }

    /// Stores `value` under `key`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.bucket.put(&self.path, key, value)?;
        self.ops.push(LogOp::Put {
            path: self.path.clone(),
            key: key.to_vec(),
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Removes `key`. Returns false if it was not present.
    pub fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        let removed = self.bucket.delete(&self.path, key)?;
        if removed {
            self.ops.push(LogOp::Delete {
                path: self.path.clone(),
                key: key.to_vec(),
            });
        }
        Ok(removed)
    }

    /// Returns a handle on the nested bucket `key`, creating it if missing.
    pub fn create_bucket_if_missing(&mut self, key: &[u8]) -> StorageResult<BucketMut<'_>> {
        let mut path = self.path.clone();
        path.push(key.to_vec());
        let existed = self.bucket.contains_key(key);
        let bucket = self
            .bucket
            .child_mut(&self.path, key, true)?
            .ok_or_else(|| StorageError::bucket_not_found(&path))?;
        if !existed {
            self.ops.push(LogOp::CreateBucket { path: path.clone() });
        }
        Ok(BucketMut {
            bucket,
            path,
            ops: &mut *self.ops,
        })
    }

    /// Returns a handle on the nested bucket `key`, if it exists.
    pub fn bucket_mut(&mut self, key: &[u8]) -> StorageResult<Option<BucketMut<'_>>> {
        let mut path = self.path.clone();
        path.push(key.to_vec());
        let ops = &mut *self.ops;
        Ok(self
            .bucket
            .child_mut(&self.path, key, false)?
            .map(|bucket| BucketMut { bucket, path, ops }))
    }

    /// Removes the nested bucket `key`. Returns false if it was not present.
    pub fn delete_bucket(&mut self, key: &[u8]) -> StorageResult<bool> {
        let removed = self.bucket.delete_bucket(&self.path, key)?;
        if removed {
            self.ops.push(LogOp::DeleteBucket {
                path: self.path.clone(),
                key: key.to_vec(),
            });
        }
        Ok(removed)
    }

    /// Returns the number of keys in the bucket.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bucket.len()
    }

    /// Returns true if the bucket has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bucket.is_empty()
    }
}

impl std::fmt::Debug for BucketMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketMut")
            .field("path", &display_path(&self.path))
            .field("len", &self.bucket.len())
            .finish()
    }
}

fn owned_path<P: AsRef<[u8]>>(path: &[P]) -> Vec<Vec<u8>> {
    path.iter().map(|segment| segment.as_ref().to_vec()).collect()
}
