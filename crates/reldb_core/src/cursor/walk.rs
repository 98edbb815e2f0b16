//! Entry-ID walks over a single bucket.

use super::key_string;
use crate::error::{CoreError, CoreResult};
use reldb_storage::{Bucket, Cursor, CursorItem};
use std::sync::Arc;

/// Moves to the last key less than or equal to `key`.
pub(crate) fn seek_le(cursor: &mut Cursor, key: &[u8]) -> Option<CursorItem> {
    match cursor.seek(key) {
        Some(item) if item.0 == key => Some(item),
        Some(_) => cursor.prev(),
        None => cursor.last(),
    }
}

/// Converts a cursor result to an entry ID, `None` being exhaustion.
pub(crate) fn id_of(item: Option<CursorItem>) -> CoreResult<String> {
    match item {
        Some((key, _)) => key_string(key),
        None => Err(CoreError::Exhausted),
    }
}

/// Walks the keys of one bucket. A missing bucket walks as empty.
#[derive(Debug)]
pub(crate) struct Walk {
    cursor: Option<Cursor>,
}

impl Walk {
    pub(crate) fn new(bucket: Option<Arc<Bucket>>) -> Self {
        Self {
            cursor: bucket.map(|b| b.cursor()),
        }
    }

    fn step(&mut self, f: impl FnOnce(&mut Cursor) -> Option<CursorItem>) -> CoreResult<String> {
        id_of(self.cursor.as_mut().and_then(f))
    }

    pub(crate) fn first(&mut self) -> CoreResult<String> {
        self.step(Cursor::first)
    }

    pub(crate) fn last(&mut self) -> CoreResult<String> {
        self.step(Cursor::last)
    }

    pub(crate) fn next(&mut self) -> CoreResult<String> {
        self.step(Cursor::next)
    }

    pub(crate) fn prev(&mut self) -> CoreResult<String> {
        self.step(Cursor::prev)
    }

    /// First ID at or after `id`; an empty `id` means the first ID.
    pub(crate) fn seek_forward(&mut self, id: &str) -> CoreResult<String> {
        if id.is_empty() {
            return self.first();
        }
        self.step(|c| c.seek(id.as_bytes()))
    }

    /// Last ID at or before `id`; an empty `id` means the last ID.
    pub(crate) fn seek_reverse(&mut self, id: &str) -> CoreResult<String> {
        if id.is_empty() {
            return self.last();
        }
        self.step(|c| seek_le(c, id.as_bytes()))
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.cursor
            .as_ref()
            .is_some_and(|c| c.bucket().contains_key(id.as_bytes()))
    }
}
