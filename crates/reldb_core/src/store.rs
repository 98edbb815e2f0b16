//! The store facade.

use crate::batch::Batcher;
use crate::config::Config;
use crate::context::{run_raced, Context, ContextContainer};
use crate::cursor::key_bucket;
#[cfg(feature = "std")]
use crate::dir::StoreDir;
use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::history::{apply_block, Ledger};
use crate::meta::{self, ENTRIES};
use crate::query::IteratingOpts;
use crate::relationships::RelationshipIndex;
use crate::transaction::{Shared, Transaction};
#[cfg(feature = "std")]
use parking_lot::Mutex;
use reldb_codec::{Codec, JsonCodec};
#[cfg(feature = "std")]
use reldb_codec::EncryptedCodec;
#[cfg(feature = "std")]
use reldb_storage::FileLog;
use reldb_storage::{LogBackend, MemoryLog, StoreOptions, View};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
#[cfg(feature = "std")]
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Store statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    /// Number of stored entries.
    pub entries: usize,
    /// Number of relationship IDs in use, per relationship key.
    pub relationships: BTreeMap<String, usize>,
    /// Counter value the next [`Transaction::new`] will use.
    pub next_index: u64,
}

/// A relationship-indexed store of entries of type `T`, encoded with `C`.
///
/// # Example
///
/// ```rust
/// use reldb_core::{Config, Context, Entry, EntryMeta, Filter, IteratingOpts, Relationships, Store};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Note {
///     #[serde(flatten)]
///     meta: EntryMeta,
///     owner: String,
/// }
///
/// impl Entry for Note {
///     fn id(&self) -> &str { &self.meta.id }
///     fn set_id(&mut self, id: String) { self.meta.id = id }
///     fn created_at(&self) -> i64 { self.meta.created_at }
///     fn set_created_at(&mut self, at: i64) { self.meta.created_at = at }
///     fn updated_at(&self) -> i64 { self.meta.updated_at }
///     fn set_updated_at(&mut self, at: i64) { self.meta.updated_at = at }
///     fn relationships(&self) -> Relationships {
///         Relationships::new().slot([self.owner.clone()])
///     }
/// }
///
/// let store: Store<Note> = Store::open_in_memory(Config::new().relationships(["owners"])).unwrap();
/// store
///     .transaction(&Context::background(), |tx| {
///         tx.new(Note { owner: "ana".into(), ..Note::default() })?;
///         tx.new(Note { owner: "bo".into(), ..Note::default() })
///     })
///     .unwrap();
///
/// let opts = IteratingOpts::new().filter(Filter::matching("owners", "ana"));
/// let (notes, _) = store.get_filtered(opts).unwrap();
/// assert_eq!(notes.len(), 1);
/// assert_eq!(notes[0].owner, "ana");
/// ```
pub struct Store<T, C = JsonCodec> {
    shared: Arc<Shared<C>>,
    batcher: Arc<Batcher<T, C>>,
    #[cfg(feature = "std")]
    dir: Mutex<Option<StoreDir>>,
}

#[cfg(feature = "std")]
impl<T: Entry> Store<T, JsonCodec> {
    /// Opens or creates a JSON-encoded store in directory `path`.
    pub fn open(path: impl AsRef<Path>, config: Config) -> CoreResult<Self> {
        Self::open_with_codec(path, config, JsonCodec)
    }
}

#[cfg(feature = "std")]
impl<T: Entry> Store<T, EncryptedCodec> {
    /// Opens or creates a store whose entries are sealed with `key`.
    ///
    /// Fails with [`CoreError::InvalidKeySize`] unless `key` is 32 bytes.
    pub fn open_encrypted(path: impl AsRef<Path>, config: Config, key: &[u8]) -> CoreResult<Self> {
        let codec: EncryptedCodec = EncryptedCodec::new(key).map_err(CoreError::from_key_error)?;
        Self::open_with_codec(path, config, codec)
    }
}

impl<T: Entry> Store<T, JsonCodec> {
    /// Opens a JSON-encoded store that lives in memory.
    pub fn open_in_memory(config: Config) -> CoreResult<Self> {
        let backend = Box::new(MemoryLog::new());
        Self::open_with_backend(config, backend, JsonCodec, None)
    }
}

impl<T: Entry, C: Codec> Store<T, C> {
    /// Opens or creates a store in directory `path` with a custom codec.
    #[cfg(feature = "std")]
    pub fn open_with_codec(path: impl AsRef<Path>, config: Config, codec: C) -> CoreResult<Self> {
        Self::open_dir(path.as_ref(), config, codec, None)
    }

    /// Opens or creates a store in directory `path` that records its
    /// commits in `ledger` and catches up from it.
    #[cfg(feature = "std")]
    pub fn open_with_ledger(
        path: impl AsRef<Path>,
        config: Config,
        codec: C,
        ledger: Arc<dyn Ledger>,
    ) -> CoreResult<Self> {
        Self::open_dir(path.as_ref(), config, codec, Some(ledger))
    }

    #[cfg(feature = "std")]
    fn open_dir(path: &Path, config: Config, codec: C, ledger: Option<Arc<dyn Ledger>>) -> CoreResult<Self> {
        config.validate()?;
        let dir = StoreDir::open(path, config.create_if_missing)?;
        let log = FileLog::open(&dir.log_path())?;
        let store = Self::assemble(config, Box::new(log), codec, ledger)?;
        info!(path = %dir.path().display(), "store opened");
        *store.dir.lock() = Some(dir);
        Ok(store)
    }

    /// Opens a store over an arbitrary commit log backend.
    pub fn open_with_backend(
        config: Config,
        backend: Box<dyn LogBackend>,
        codec: C,
        ledger: Option<Arc<dyn Ledger>>,
    ) -> CoreResult<Self> {
        config.validate()?;
        Self::assemble(config, backend, codec, ledger)
    }

    fn assemble(
        config: Config,
        backend: Box<dyn LogBackend>,
        codec: C,
        ledger: Option<Arc<dyn Ledger>>,
    ) -> CoreResult<Self> {
        let options = StoreOptions {
            sync_on_commit: config.sync_on_commit,
        };
        let storage = reldb_storage::Store::open(backend, options)?;
        storage.transaction(|tx| meta::initialize(tx, &config.relationships))?;

        let shared = Arc::new(Shared {
            storage,
            codec,
            index: RelationshipIndex::new(config.relationships.clone()),
            config,
            ledger,
        });
        let store = Self {
            batcher: Batcher::new(Arc::clone(&shared)),
            shared,
            #[cfg(feature = "std")]
            dir: Mutex::new(None),
        };
        if store.shared.ledger.is_some() {
            store.sync()?;
        }
        debug!(
            codec = store.shared.codec.name(),
            mirror = store.shared.config.mirror,
            keys = store.shared.config.relationships.len(),
            "store ready"
        );
        Ok(store)
    }

    /// Returns the configuration the store was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Returns true for a read-only replica.
    #[must_use]
    pub fn is_mirror(&self) -> bool {
        self.shared.config.mirror
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.shared.storage.is_open() {
            Ok(())
        } else {
            Err(CoreError::Closed)
        }
    }

    fn ensure_writable(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.shared.config.mirror {
            return Err(CoreError::MirrorWriteAttempted);
        }
        Ok(())
    }

    // ---- transactions ----

    /// Runs `f` in a write transaction raced against `ctx`.
    ///
    /// The transaction commits when `f` returns `Ok` before `ctx` is done.
    /// Otherwise it rolls back and the error, or the context's
    /// cancellation error, is returned.
    pub fn transaction<R, F>(&self, ctx: &Context, f: F) -> CoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Transaction<T, C>) -> CoreResult<R> + Send + 'static,
    {
        self.ensure_writable()?;
        let shared = Arc::clone(&self.shared);
        let (tx, value) = run_raced(ctx, move |container| Transaction::begin_write(shared, container), f)?;
        tx.commit()?;
        Ok(value)
    }

    /// Runs `f` in a read transaction raced against `ctx`.
    pub fn read_transaction<R, F>(&self, ctx: &Context, f: F) -> CoreResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Transaction<T, C>) -> CoreResult<R> + Send + 'static,
    {
        self.ensure_open()?;
        let shared = Arc::clone(&self.shared);
        let (_tx, value) = run_raced(ctx, move |container| Transaction::begin_read(shared, container), f)?;
        Ok(value)
    }

    /// Queues `f` to run in a shared write transaction with other batched
    /// calls and waits for its result.
    ///
    /// `f` may run more than once when another call of its batch fails.
    /// Calling this from inside a transaction of the same store deadlocks.
    pub fn batch<F>(&self, ctx: &Context, f: F) -> CoreResult<()>
    where
        F: Fn(&mut Transaction<T, C>) -> CoreResult<()> + Send + Sync + 'static,
    {
        self.ensure_writable()?;
        let receiver = self.batcher.append(ctx.clone(), Arc::new(f));
        receiver.recv().unwrap_or(Err(CoreError::Closed))
    }

    // ---- one-shot operations ----

    /// Stores a new entry in its own transaction.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(&self, entry: T) -> CoreResult<T> {
        self.transaction(&Context::background(), move |tx| tx.new(entry))
    }

    /// Stores `entry` under `id` in its own transaction.
    pub fn put(&self, id: &str, entry: T) -> CoreResult<T> {
        let id = id.to_string();
        self.transaction(&Context::background(), move |tx| tx.put(&id, entry))
    }

    /// Replaces entry `id` in its own transaction.
    pub fn edit(&self, id: &str, entry: T) -> CoreResult<T> {
        let id = id.to_string();
        self.transaction(&Context::background(), move |tx| tx.edit(&id, entry))
    }

    /// Changes entry `id` with `f` in its own transaction.
    pub fn update<F>(&self, id: &str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut T) -> CoreResult<()> + Send + 'static,
    {
        let id = id.to_string();
        self.transaction(&Context::background(), move |tx| tx.update(&id, f))
    }

    /// Deletes entry `id` in its own transaction.
    pub fn delete(&self, id: &str) -> CoreResult<T> {
        let id = id.to_string();
        self.transaction(&Context::background(), move |tx| tx.delete(&id))
    }

    /// Returns entry `id`.
    pub fn get(&self, id: &str) -> CoreResult<T> {
        let id = id.to_string();
        self.read_transaction(&Context::background(), move |tx| tx.get(&id))
    }

    /// Returns true if entry `id` exists.
    pub fn exists(&self, id: &str) -> CoreResult<bool> {
        let id = id.to_string();
        self.read_transaction(&Context::background(), move |tx| tx.exists(&id))
    }

    /// Calls `f` with every entry selected by `opts`.
    pub fn for_each<F>(&self, opts: IteratingOpts, f: F) -> CoreResult<()>
    where
        F: FnMut(&str, T) -> CoreResult<ControlFlow<()>> + Send + 'static,
    {
        self.read_transaction(&Context::background(), move |tx| tx.for_each(&opts, f))
    }

    /// Calls `f` with the ID of every entry selected by `opts`.
    pub fn for_each_id<F>(&self, opts: IteratingOpts, f: F) -> CoreResult<()>
    where
        F: FnMut(&str) -> CoreResult<ControlFlow<()>> + Send + 'static,
    {
        self.read_transaction(&Context::background(), move |tx| tx.for_each_id(&opts, f))
    }

    /// Returns one page of entries and the position of the next page.
    pub fn get_filtered(&self, opts: IteratingOpts) -> CoreResult<(Vec<T>, Option<String>)> {
        self.read_transaction(&Context::background(), move |tx| tx.get_filtered(&opts))
    }

    /// Returns one page of entry IDs and the position of the next page.
    pub fn get_filtered_ids(&self, opts: IteratingOpts) -> CoreResult<(Vec<String>, Option<String>)> {
        self.read_transaction(&Context::background(), move |tx| tx.get_filtered_ids(&opts))
    }

    /// Returns the first entry matching `filters`.
    pub fn get_first(&self, filters: Vec<Filter>) -> CoreResult<T> {
        self.read_transaction(&Context::background(), move |tx| tx.get_first(&filters))
    }

    /// Returns the last entry matching `filters`.
    pub fn get_last(&self, filters: Vec<Filter>) -> CoreResult<T> {
        self.read_transaction(&Context::background(), move |tx| tx.get_last(&filters))
    }

    /// Returns the entries indexed under relationship `id` of `key`.
    pub fn get_by_relationship(&self, key: &str, id: &str) -> CoreResult<Vec<T>> {
        let (key, id) = (key.to_string(), id.to_string());
        self.read_transaction(&Context::background(), move |tx| tx.get_by_relationship(&key, &id))
    }

    /// Returns the relationship IDs in use under `key`.
    pub fn relationship_ids(&self, key: &str, last_id: Option<&str>, limit: usize) -> CoreResult<Vec<String>> {
        let key = key.to_string();
        let last_id = last_id.map(str::to_string);
        self.read_transaction(&Context::background(), move |tx| {
            tx.relationship_ids(&key, last_id.as_deref(), limit)
        })
    }

    // ---- maintenance ----

    /// Applies ledger blocks this store has not seen yet and returns how
    /// many were applied. A store without a ledger has nothing to apply.
    pub fn sync(&self) -> CoreResult<usize> {
        self.ensure_open()?;
        let Some(ledger) = self.shared.ledger.as_ref() else {
            return Ok(0);
        };
        let last = meta::last_block(&self.shared.storage.begin_read()?)?;
        let blocks = ledger.blocks_after(last)?;

        let mut applied = 0;
        for (index, block) in &blocks {
            let container = ContextContainer::new(Context::background());
            let mut tx = Transaction::<T, C>::begin_write(Arc::clone(&self.shared), Arc::clone(&container))?;
            if apply_block(&mut tx, *index, block)? {
                applied += 1;
            }
            container.close();
            tx.commit()?;
        }
        if applied > 0 {
            info!(applied, last = ?blocks.last().map(|(index, _)| index), "caught up from ledger");
        }
        Ok(applied)
    }

    /// Compacts the commit log into a single snapshot.
    pub fn checkpoint(&self) -> CoreResult<()> {
        self.ensure_open()?;
        self.shared.storage.checkpoint()?;
        Ok(())
    }

    /// Returns entry and relationship counts.
    pub fn stats(&self) -> CoreResult<Stats> {
        self.ensure_open()?;
        let tx = self.shared.storage.begin_read()?;
        let entries = tx
            .bucket(&[ENTRIES])
            .ok_or_else(|| CoreError::not_initialized(ENTRIES))?
            .len();
        let mut relationships = BTreeMap::new();
        for key in &self.shared.config.relationships {
            relationships.insert(key.clone(), key_bucket(&tx, key)?.len());
        }
        Ok(Stats {
            entries,
            relationships,
            next_index: meta::next_index(&tx)?,
        })
    }

    /// Flushes queued batch calls, syncs the commit log and releases the
    /// directory lock. Later operations fail with [`CoreError::Closed`].
    pub fn close(&self) -> CoreResult<()> {
        if !self.shared.storage.is_open() {
            return Ok(());
        }
        self.batcher.flush("close");
        self.shared.storage.close()?;
        #[cfg(feature = "std")]
        self.dir.lock().take();
        info!("store closed");
        Ok(())
    }
}

impl<T, C> Drop for Store<T, C> {
    fn drop(&mut self) {
        if self.shared.storage.is_open() {
            if let Err(err) = self.shared.storage.close() {
                warn!(error = %err, "closing store on drop failed");
            }
        }
    }
}

impl<T, C: Codec> std::fmt::Debug for Store<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("codec", &self.shared.codec.name())
            .field("relationships", &self.shared.config.relationships)
            .field("mirror", &self.shared.config.mirror)
            .field("open", &self.shared.storage.is_open())
            .finish()
    }
}
