//! Iteration options and record cursors.

use crate::context::ContextContainer;
use crate::cursor::{FilterCursor, SeekToken};
use crate::entry::Entry;
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::transaction::Shared;
use reldb_codec::{Codec, JsonCodec};
use reldb_storage::Bucket;
use std::marker::PhantomData;
use std::sync::Arc;

/// Options for filtered iteration.
///
/// ```rust
/// use reldb_core::{Filter, IteratingOpts};
///
/// let opts = IteratingOpts::new()
///     .filter(Filter::matching("users", "alice"))
///     .reverse(true)
///     .limit(20);
/// assert_eq!(opts.limit, 20);
/// ```
#[derive(Debug, Clone, Default)]
pub struct IteratingOpts {
    /// Conjunction of filters; empty iterates every entry.
    pub filters: Vec<Filter>,
    /// Resume after this position (exclusive). Accepts a bare entry ID or a
    /// token from [`Cursor::position`] or a previous page.
    pub last_id: Option<String>,
    /// Iterate in descending order.
    pub reverse: bool,
    /// Maximum number of entries visited; 0 is unlimited.
    pub limit: usize,
}

impl IteratingOpts {
    /// Creates options that visit every entry in ascending order.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Adds several filters.
    #[must_use]
    pub fn filters<I: IntoIterator<Item = Filter>>(mut self, filters: I) -> Self {
        self.filters.extend(filters);
        self
    }

    /// Sets the resume position.
    #[must_use]
    pub fn last_id(mut self, last_id: impl Into<String>) -> Self {
        self.last_id = Some(last_id.into());
        self
    }

    /// Sets the direction.
    #[must_use]
    pub const fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Sets the limit.
    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Moves `cursor` to the first position of an iteration described by `opts`.
///
/// With a resume position, the entry at that position is skipped.
pub(crate) fn start(cursor: &mut dyn FilterCursor, opts: &IteratingOpts) -> CoreResult<String> {
    let Some(last_id) = opts.last_id.as_deref() else {
        return if opts.reverse { cursor.last() } else { cursor.first() };
    };
    let token = SeekToken::parse(last_id);
    let landed = if opts.reverse {
        cursor.seek_reverse(&token.relationship_id, &token.id)?
    } else {
        cursor.seek_forward(&token.relationship_id, &token.id)?
    };
    let same_bucket = token.relationship_id.is_empty()
        || cursor
            .relationship_id()
            .map_or(true, |current| current == token.relationship_id);
    if landed == token.id && same_bucket {
        if opts.reverse {
            cursor.prev()
        } else {
            cursor.next()
        }
    } else {
        Ok(landed)
    }
}

/// Renders the position of `cursor` at entry `id`.
pub(crate) fn position_of(cursor: &dyn FilterCursor, id: &str) -> String {
    SeekToken::new(cursor.relationship_id().unwrap_or_default(), id).to_string()
}

/// A cursor over the IDs of the entries matching a set of filters.
///
/// Moves return [`CoreError::Exhausted`] at either end. Every move checks
/// the transaction's context first, so a cursor fails with the
/// cancellation error once its transaction is cancelled and with
/// [`CoreError::Closed`] once it has finished.
pub struct IdCursor {
    inner: Box<dyn FilterCursor>,
    container: Arc<ContextContainer>,
    current: Option<String>,
}

impl IdCursor {
    pub(crate) fn new(inner: Box<dyn FilterCursor>, container: Arc<ContextContainer>) -> Self {
        Self {
            inner,
            container,
            current: None,
        }
    }

    /// Moves to the first matching entry.
    pub fn first(&mut self) -> CoreResult<String> {
        self.step(|c| c.first())
    }

    /// Moves to the last matching entry.
    pub fn last(&mut self) -> CoreResult<String> {
        self.step(|c| c.last())
    }

    /// Moves to the next matching entry.
    pub fn next(&mut self) -> CoreResult<String> {
        self.step(|c| c.next())
    }

    /// Moves to the previous matching entry.
    pub fn prev(&mut self) -> CoreResult<String> {
        self.step(|c| c.prev())
    }

    /// Moves to the first matching entry at or after `position`.
    pub fn seek(&mut self, position: &str) -> CoreResult<String> {
        let token = SeekToken::parse(position);
        self.step(|c| c.seek_forward(&token.relationship_id, &token.id))
    }

    /// Moves to the last matching entry at or before `position`.
    pub fn seek_reverse(&mut self, position: &str) -> CoreResult<String> {
        let token = SeekToken::parse(position);
        self.step(|c| c.seek_reverse(&token.relationship_id, &token.id))
    }

    /// Returns the resumable position of the current entry.
    #[must_use]
    pub fn position(&self) -> Option<String> {
        self.current
            .as_deref()
            .map(|id| position_of(self.inner.as_ref(), id))
    }

    fn step<F>(&mut self, move_to: F) -> CoreResult<String>
    where
        F: FnOnce(&mut dyn FilterCursor) -> CoreResult<String>,
    {
        self.container.check()?;
        match move_to(self.inner.as_mut()) {
            Ok(id) => {
                self.current = Some(id.clone());
                Ok(id)
            }
            Err(err) => {
                if err.is_exhausted() {
                    self.current = None;
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for IdCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdCursor").field("current", &self.current).finish()
    }
}

/// A cursor that decodes the entries it moves over.
///
/// The entries are those visible when the cursor was opened.
pub struct Cursor<T, C = JsonCodec> {
    ids: IdCursor,
    entries: Arc<Bucket>,
    shared: Arc<Shared<C>>,
    _entry: PhantomData<fn() -> T>,
}

impl<T: Entry, C: Codec> Cursor<T, C> {
    pub(crate) fn new(ids: IdCursor, entries: Arc<Bucket>, shared: Arc<Shared<C>>) -> Self {
        Self {
            ids,
            entries,
            shared,
            _entry: PhantomData,
        }
    }

    /// Moves to the first matching entry.
    pub fn first(&mut self) -> CoreResult<T> {
        let id = self.ids.first()?;
        self.load(&id)
    }

    /// Moves to the last matching entry.
    pub fn last(&mut self) -> CoreResult<T> {
        let id = self.ids.last()?;
        self.load(&id)
    }

    /// Moves to the next matching entry.
    pub fn next(&mut self) -> CoreResult<T> {
        let id = self.ids.next()?;
        self.load(&id)
    }

    /// Moves to the previous matching entry.
    pub fn prev(&mut self) -> CoreResult<T> {
        let id = self.ids.prev()?;
        self.load(&id)
    }

    /// Moves to the first matching entry at or after `position`.
    pub fn seek(&mut self, position: &str) -> CoreResult<T> {
        let id = self.ids.seek(position)?;
        self.load(&id)
    }

    /// Moves to the last matching entry at or before `position`.
    pub fn seek_reverse(&mut self, position: &str) -> CoreResult<T> {
        let id = self.ids.seek_reverse(position)?;
        self.load(&id)
    }

    /// Returns the resumable position of the current entry.
    #[must_use]
    pub fn position(&self) -> Option<String> {
        self.ids.position()
    }

    fn load(&self, id: &str) -> CoreResult<T> {
        let raw = self
            .entries
            .get(id.as_bytes())
            .ok_or_else(|| CoreError::entry_not_found(id))?;
        Ok(self.shared.codec.unmarshal(raw)?)
    }
}

impl<T, C> std::fmt::Debug for Cursor<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").field("ids", &self.ids).finish()
    }
}
