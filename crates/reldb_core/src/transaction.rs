//! Typed transactions over a store.
//!
//! A [`Transaction`] is handed to the closures given to
//! [`Store::transaction`](crate::Store::transaction),
//! [`Store::read_transaction`](crate::Store::read_transaction) and
//! [`Store::batch`](crate::Store::batch). Writes keep the relationship index
//! in step with the entries; reads go through the filter cursors.

use crate::config::Config;
use crate::context::{Context, ContextContainer};
use crate::cursor::{key_bucket, key_string, new_multi_cursor};
use crate::entry::{format_id, parse_id, unix_now, Entry, Relationships};
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::history::{Action, Block, Ledger};
use crate::meta::{self, ENTRIES};
use crate::query::{position_of, start, Cursor, IdCursor, IteratingOpts};
use crate::relationships::RelationshipIndex;
use reldb_codec::{Codec, JsonCodec};
use reldb_storage::{Bucket, ReadTx, View, WriteTx};
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::debug;

/// State shared by every transaction of one store.
pub(crate) struct Shared<C> {
    pub(crate) storage: reldb_storage::Store,
    pub(crate) codec: C,
    pub(crate) config: Config,
    pub(crate) index: RelationshipIndex,
    pub(crate) ledger: Option<Arc<dyn Ledger>>,
}

enum Access {
    Read(ReadTx),
    Write(WriteTx),
}

impl View for Access {
    fn bucket<P: AsRef<[u8]>>(&self, path: &[P]) -> Option<Arc<Bucket>> {
        match self {
            Self::Read(tx) => tx.bucket(path),
            Self::Write(tx) => tx.bucket(path),
        }
    }
}

/// A read or write transaction over entries of type `T`.
///
/// Every operation first checks the transaction's context and fails with
/// its cancellation error once the context is done. Writes on a read
/// transaction fail with [`CoreError::InvalidOperation`].
pub struct Transaction<T, C = JsonCodec> {
    access: Access,
    shared: Arc<Shared<C>>,
    container: Arc<ContextContainer>,
    actions: Vec<Action>,
    record_history: bool,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Entry, C: Codec> Transaction<T, C> {
    pub(crate) fn begin_read(shared: Arc<Shared<C>>, container: Arc<ContextContainer>) -> CoreResult<Self> {
        let tx = shared.storage.begin_read()?;
        Ok(Self::with_access(Access::Read(tx), shared, container))
    }

    pub(crate) fn begin_write(shared: Arc<Shared<C>>, container: Arc<ContextContainer>) -> CoreResult<Self> {
        let tx = shared.storage.begin_write()?;
        Ok(Self::with_access(Access::Write(tx), shared, container))
    }

    fn with_access(access: Access, shared: Arc<Shared<C>>, container: Arc<ContextContainer>) -> Self {
        Self {
            access,
            shared,
            container,
            actions: Vec::new(),
            record_history: true,
            _entry: PhantomData,
        }
    }

    /// Returns true for a write transaction.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        matches!(self.access, Access::Write(_))
    }

    /// Returns the context the transaction currently runs under.
    #[must_use]
    pub fn context(&self) -> Context {
        self.container.context()
    }

    /// Turns history recording on or off, returning the previous setting.
    pub(crate) fn set_record_history(&mut self, record: bool) -> bool {
        std::mem::replace(&mut self.record_history, record)
    }

    // ---- writes ----

    /// Stores `entry` under the next ID and returns it with its ID and
    /// timestamps set.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(&mut self, mut entry: T) -> CoreResult<T> {
        self.container.check()?;
        let (tx, shared) = self.write_parts()?;
        let index = meta::next_index(&*tx)?;
        meta::set_next_index(tx, index + 1)?;
        let id = format_id(index, shared.config.id_width);

        let now = unix_now();
        entry.set_id(id.clone());
        entry.set_created_at(now);
        entry.set_updated_at(now);
        self.store(&id, &Relationships::new(), &entry)?;
        Ok(entry)
    }

    /// Stores `entry` under `id`, replacing any entry already there.
    ///
    /// Zero timestamps are filled in: the creation time from the replaced
    /// entry (or now), the update time with now. A numeric `id` at or past
    /// the ID counter moves the counter beyond it.
    pub fn put(&mut self, id: &str, mut entry: T) -> CoreResult<T> {
        self.container.check()?;
        if id.is_empty() {
            return Err(CoreError::invalid_operation("put requires an entry ID"));
        }
        let old = self.load(id)?;
        let (tx, _) = self.write_parts()?;
        if let Some(index) = parse_id(id) {
            if index >= meta::next_index(&*tx)? {
                meta::set_next_index(tx, index.saturating_add(1))?;
            }
        }

        let now = unix_now();
        entry.set_id(id.to_string());
        if entry.created_at() == 0 {
            entry.set_created_at(old.as_ref().map_or(now, Entry::created_at));
        }
        if entry.updated_at() == 0 {
            entry.set_updated_at(now);
        }
        let previous = old.as_ref().map(Entry::relationships).unwrap_or_default();
        self.store(id, &previous, &entry)?;
        Ok(entry)
    }

    /// Replaces the existing entry `id`, keeping its creation time.
    pub fn edit(&mut self, id: &str, mut entry: T) -> CoreResult<T> {
        self.container.check()?;
        let old = self.load(id)?.ok_or_else(|| CoreError::entry_not_found(id))?;
        entry.set_id(id.to_string());
        entry.set_created_at(old.created_at());
        entry.set_updated_at(unix_now());
        self.store(id, &old.relationships(), &entry)?;
        Ok(entry)
    }

    /// Loads entry `id`, lets `f` change it and stores the result.
    pub fn update<F>(&mut self, id: &str, f: F) -> CoreResult<T>
    where
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        self.container.check()?;
        let mut entry = self.load(id)?.ok_or_else(|| CoreError::entry_not_found(id))?;
        let previous = entry.relationships();
        let created_at = entry.created_at();
        f(&mut entry)?;
        entry.set_id(id.to_string());
        entry.set_created_at(created_at);
        entry.set_updated_at(unix_now());
        self.store(id, &previous, &entry)?;
        Ok(entry)
    }

    /// Removes entry `id` and its relationship index keys, returning it.
    pub fn delete(&mut self, id: &str) -> CoreResult<T> {
        self.container.check()?;
        let old = self.load(id)?.ok_or_else(|| CoreError::entry_not_found(id))?;
        self.remove(id, &old)?;
        Ok(old)
    }

    fn store(&mut self, id: &str, previous: &Relationships, entry: &T) -> CoreResult<()> {
        let relationships = entry.relationships();
        self.shared.index.validate(&relationships)?;
        let value = self.shared.codec.marshal(entry)?;

        let (tx, shared) = self.write_parts()?;
        entries_mut(tx)?.put(id.as_bytes(), &value)?;
        shared.index.apply(tx, id, previous, &relationships)?;
        self.record(Action::write(id, value));
        Ok(())
    }

    fn remove(&mut self, id: &str, old: &T) -> CoreResult<()> {
        let (tx, shared) = self.write_parts()?;
        entries_mut(tx)?.delete(id.as_bytes())?;
        shared.index.apply(tx, id, &old.relationships(), &Relationships::new())?;
        self.record(Action::delete(id));
        Ok(())
    }

    fn record(&mut self, action: Action) {
        if self.record_history && self.shared.ledger.is_some() {
            self.actions.push(action);
        }
    }

    /// Applies an encoded entry from a ledger block.
    pub(crate) fn replay_write(&mut self, id: &str, value: &[u8]) -> CoreResult<()> {
        let entry: T = self.shared.codec.unmarshal(value)?;
        let old = self.load(id)?;
        let (tx, _) = self.write_parts()?;
        if let Some(index) = parse_id(id) {
            if index >= meta::next_index(&*tx)? {
                meta::set_next_index(tx, index.saturating_add(1))?;
            }
        }
        let previous = old.as_ref().map(Entry::relationships).unwrap_or_default();
        self.store(id, &previous, &entry)
    }

    /// Applies a delete from a ledger block; missing entries are skipped.
    pub(crate) fn replay_delete(&mut self, id: &str) -> CoreResult<()> {
        match self.load(id)? {
            Some(old) => self.remove(id, &old),
            None => Ok(()),
        }
    }

    pub(crate) fn last_block(&self) -> CoreResult<Option<u64>> {
        meta::last_block(&self.access)
    }

    pub(crate) fn mark_block(&mut self, index: u64) -> CoreResult<()> {
        let (tx, _) = self.write_parts()?;
        meta::store_meta(tx, index)
    }

    fn write_parts(&mut self) -> CoreResult<(&mut WriteTx, &Shared<C>)> {
        match &mut self.access {
            Access::Write(tx) => Ok((tx, &*self.shared)),
            Access::Read(_) => Err(CoreError::invalid_operation("write in a read transaction")),
        }
    }

    // ---- point reads ----

    /// Returns entry `id`, or [`CoreError::EntryNotFound`].
    pub fn get(&self, id: &str) -> CoreResult<T> {
        self.container.check()?;
        self.load(id)?.ok_or_else(|| CoreError::entry_not_found(id))
    }

    /// Returns true if entry `id` exists.
    pub fn exists(&self, id: &str) -> CoreResult<bool> {
        self.container.check()?;
        Ok(self.entries()?.contains_key(id.as_bytes()))
    }

    fn load(&self, id: &str) -> CoreResult<Option<T>> {
        match self.entries()?.get(id.as_bytes()) {
            Some(raw) => Ok(Some(self.shared.codec.unmarshal(raw)?)),
            None => Ok(None),
        }
    }

    fn entries(&self) -> CoreResult<Arc<Bucket>> {
        self.access
            .bucket(&[ENTRIES])
            .ok_or_else(|| CoreError::not_initialized(ENTRIES))
    }

    // ---- iteration ----

    /// Calls `f` with every entry selected by `opts`, in cursor order, until
    /// it returns [`ControlFlow::Break`] or the selection ends.
    pub fn for_each<F>(&self, opts: &IteratingOpts, mut f: F) -> CoreResult<()>
    where
        F: FnMut(&str, T) -> CoreResult<ControlFlow<()>>,
    {
        let entries = self.entries()?;
        self.walk(opts, |id, _| {
            let raw = entries
                .get(id.as_bytes())
                .ok_or_else(|| CoreError::entry_not_found(id))?;
            f(id, self.shared.codec.unmarshal(raw)?)
        })
    }

    /// Like [`for_each`](Self::for_each), without decoding entries.
    pub fn for_each_id<F>(&self, opts: &IteratingOpts, mut f: F) -> CoreResult<()>
    where
        F: FnMut(&str) -> CoreResult<ControlFlow<()>>,
    {
        self.walk(opts, |id, _| f(id))
    }

    /// Returns one page of entries and, when the page is full, the position
    /// to pass as `last_id` for the next page.
    pub fn get_filtered(&self, opts: &IteratingOpts) -> CoreResult<(Vec<T>, Option<String>)> {
        let entries = self.entries()?;
        let mut page: Vec<T> = Vec::new();
        let mut last = None;
        self.walk(opts, |id, position| {
            let raw = entries
                .get(id.as_bytes())
                .ok_or_else(|| CoreError::entry_not_found(id))?;
            page.push(self.shared.codec.unmarshal(raw)?);
            last = Some(position);
            Ok(ControlFlow::Continue(()))
        })?;
        let next = page_token(opts, page.len(), last);
        Ok((page, next))
    }

    /// Like [`get_filtered`](Self::get_filtered), returning entry IDs.
    pub fn get_filtered_ids(&self, opts: &IteratingOpts) -> CoreResult<(Vec<String>, Option<String>)> {
        let mut page = Vec::new();
        let mut last = None;
        self.walk(opts, |id, position| {
            page.push(id.to_string());
            last = Some(position);
            Ok(ControlFlow::Continue(()))
        })?;
        let next = page_token(opts, page.len(), last);
        Ok((page, next))
    }

    /// Returns the first entry matching `filters`, or
    /// [`CoreError::EntryNotFound`].
    pub fn get_first(&self, filters: &[Filter]) -> CoreResult<T> {
        self.extreme(filters, false)
    }

    /// Returns the last entry matching `filters`, or
    /// [`CoreError::EntryNotFound`].
    pub fn get_last(&self, filters: &[Filter]) -> CoreResult<T> {
        self.extreme(filters, true)
    }

    fn extreme(&self, filters: &[Filter], reverse: bool) -> CoreResult<T> {
        let opts = IteratingOpts {
            filters: filters.to_vec(),
            last_id: None,
            reverse,
            limit: 1,
        };
        let mut found = None;
        self.for_each(&opts, |_, entry| {
            found = Some(entry);
            Ok(ControlFlow::Break(()))
        })?;
        found.ok_or_else(CoreError::no_match)
    }

    /// Returns every entry indexed under relationship `id` of `key`.
    pub fn get_by_relationship(&self, key: &str, id: &str) -> CoreResult<Vec<T>> {
        let opts = IteratingOpts::new().filter(Filter::matching(key, id));
        let mut out = Vec::new();
        self.for_each(&opts, |_, entry| {
            out.push(entry);
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(out)
    }

    /// Returns the relationship IDs in use under `key`, ascending, starting
    /// after `last_id` and stopping after `limit` IDs (0 is unlimited).
    pub fn relationship_ids(&self, key: &str, last_id: Option<&str>, limit: usize) -> CoreResult<Vec<String>> {
        self.container.check()?;
        let bucket = key_bucket(&self.access, key)?;
        let mut cursor = bucket.cursor();
        let mut item = match last_id {
            Some(last) => match cursor.seek(last.as_bytes()) {
                Some((k, _)) if k == last.as_bytes() => cursor.next(),
                other => other,
            },
            None => cursor.first(),
        };
        let mut out = Vec::new();
        while let Some((k, value)) = item {
            if value.is_none() {
                out.push(key_string(k)?);
                if limit > 0 && out.len() >= limit {
                    break;
                }
            }
            item = cursor.next();
        }
        Ok(out)
    }

    /// Opens a cursor over the entries matching `filters`.
    pub fn cursor(&self, filters: &[Filter]) -> CoreResult<Cursor<T, C>> {
        let ids = self.id_cursor(filters)?;
        Ok(Cursor::new(ids, self.entries()?, Arc::clone(&self.shared)))
    }

    /// Opens a cursor over the entries indexed under relationship `id` of `key`.
    pub fn cursor_relationship(&self, key: &str, id: &str) -> CoreResult<Cursor<T, C>> {
        self.cursor(&[Filter::matching(key, id)])
    }

    /// Opens a cursor over the IDs of the entries matching `filters`.
    pub fn id_cursor(&self, filters: &[Filter]) -> CoreResult<IdCursor> {
        self.container.check()?;
        let inner = new_multi_cursor(&self.access, filters)?;
        Ok(IdCursor::new(inner, Arc::clone(&self.container)))
    }

    /// Drives a filter cursor over `opts`, passing each ID and its position.
    fn walk<F>(&self, opts: &IteratingOpts, mut visit: F) -> CoreResult<()>
    where
        F: FnMut(&str, String) -> CoreResult<ControlFlow<()>>,
    {
        self.container.check()?;
        let mut cursor = new_multi_cursor(&self.access, &opts.filters)?;
        let mut step = start(cursor.as_mut(), opts);
        let mut visited = 0;
        loop {
            let id = match step {
                Ok(id) => id,
                Err(CoreError::Exhausted) => return Ok(()),
                Err(err) => return Err(err),
            };
            self.container.check()?;
            let position = position_of(cursor.as_ref(), &id);
            if visit(&id, position)?.is_break() {
                return Ok(());
            }
            visited += 1;
            if opts.limit > 0 && visited >= opts.limit {
                return Ok(());
            }
            step = if opts.reverse { cursor.prev() } else { cursor.next() };
        }
    }

    // ---- completion ----

    /// Commits a write transaction; a read transaction just ends.
    ///
    /// With a ledger attached, the recorded actions are appended as one
    /// block first and the block index is stored with the commit.
    pub(crate) fn commit(self) -> CoreResult<()> {
        let Self {
            access,
            shared,
            actions,
            ..
        } = self;
        let Access::Write(mut tx) = access else {
            return Ok(());
        };
        let mut block_index = None;
        if let Some(ledger) = shared.ledger.as_ref().filter(|_| !actions.is_empty()) {
            let index = ledger.append(&Block { actions })?;
            meta::store_meta(&mut tx, index)?;
            block_index = Some(index);
        }
        let ops = tx.pending_ops();
        tx.commit()?;
        debug!(ops, block = ?block_index, "transaction committed");
        Ok(())
    }
}

impl<T, C> std::fmt::Debug for Transaction<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("writable", &matches!(self.access, Access::Write(_)))
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}

fn entries_mut(tx: &mut WriteTx) -> CoreResult<reldb_storage::BucketMut<'_>> {
    tx.bucket_mut(&[ENTRIES])?
        .ok_or_else(|| CoreError::not_initialized(ENTRIES))
}

fn page_token(opts: &IteratingOpts, len: usize, last: Option<String>) -> Option<String> {
    (opts.limit > 0 && len == opts.limit).then_some(last).flatten()
}
