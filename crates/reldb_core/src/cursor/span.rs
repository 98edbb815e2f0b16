//! Traversal across the relationship buckets of one key.
//!
//! A span walks `(relationship id, entry id)` pairs in bucket order, then
//! entry order. An entry that sits in several eligible buckets is reported
//! only from the lowest one, which keeps reverse traversal the exact mirror
//! of forward traversal.
//!
//! The lowest bucket of every reachable entry is resolved once per span, on
//! first use, with a single pass over the eligible buckets.

use super::key_string;
use super::walk::seek_le;
use crate::error::{CoreError, CoreResult};
use reldb_storage::{Bucket, Cursor, CursorItem, StorageError};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Decides which buckets and entries a span visits.
pub(crate) trait SpanRule: Send {
    /// Inclusive lower bound on bucket names.
    fn lower(&self) -> Option<&[u8]> {
        None
    }

    /// Inclusive upper bound on bucket names.
    fn upper(&self) -> Option<&[u8]> {
        None
    }

    fn bucket_eligible(&self, relationship_id: &str) -> bool;

    fn entry_eligible(&self, _entry_id: &[u8]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Edge {
    Unpositioned,
    BeforeFirst,
    AfterLast,
}

struct Inner {
    relationship_id: String,
    cursor: Cursor,
}

/// Eligible bucket names in ascending order, and the position in `names` of
/// the bucket each reachable entry is reported from.
struct Homes {
    names: Vec<String>,
    by_entry: HashMap<Vec<u8>, usize>,
}

impl Homes {
    fn of(&self, entry: &[u8]) -> Option<&str> {
        self.by_entry.get(entry).map(|&at| self.names[at].as_str())
    }
}

pub(crate) struct Span<R> {
    rule: R,
    key_bucket: Arc<Bucket>,
    outer: Cursor,
    inner: Option<Inner>,
    edge: Edge,
    homes: OnceCell<Homes>,
}

fn name_str(name: &[u8]) -> CoreResult<&str> {
    std::str::from_utf8(name)
        .map_err(|e| StorageError::Encoding(format!("relationship bucket name: {e}")).into())
}

impl<R: SpanRule> Span<R> {
    pub(crate) fn new(key_bucket: Arc<Bucket>, rule: R) -> Self {
        Self {
            outer: key_bucket.cursor(),
            rule,
            key_bucket,
            inner: None,
            edge: Edge::Unpositioned,
            homes: OnceCell::new(),
        }
    }

    fn above_upper(&self, name: &[u8]) -> bool {
        self.rule.upper().is_some_and(|upper| name > upper)
    }

    fn below_lower(&self, name: &[u8]) -> bool {
        self.rule.lower().is_some_and(|lower| name < lower)
    }

    fn eligible(&self, (name, value): &CursorItem) -> CoreResult<Option<String>> {
        // Values directly under a key bucket are not relationship buckets.
        if value.is_some() {
            return Ok(None);
        }
        let name = name_str(name)?;
        Ok(self.rule.bucket_eligible(name).then(|| name.to_string()))
    }

    fn forward_from(&mut self, mut item: Option<CursorItem>) -> CoreResult<Option<String>> {
        while let Some(found) = item {
            if self.above_upper(&found.0) {
                break;
            }
            if let Some(name) = self.eligible(&found)? {
                return Ok(Some(name));
            }
            item = self.outer.next();
        }
        Ok(None)
    }

    fn backward_from(&mut self, mut item: Option<CursorItem>) -> CoreResult<Option<String>> {
        while let Some(found) = item {
            if self.below_lower(&found.0) {
                break;
            }
            if let Some(name) = self.eligible(&found)? {
                return Ok(Some(name));
            }
            item = self.outer.prev();
        }
        Ok(None)
    }

    fn outer_first(&mut self) -> CoreResult<Option<String>> {
        let item = match self.rule.lower() {
            Some(lower) => self.outer.seek(lower),
            None => self.outer.first(),
        };
        self.forward_from(item)
    }

    fn outer_last(&mut self) -> CoreResult<Option<String>> {
        let item = match self.rule.upper() {
            Some(upper) => seek_le(&mut self.outer, upper),
            None => self.outer.last(),
        };
        self.backward_from(item)
    }

    fn outer_seek_forward(&mut self, relationship_id: &str) -> CoreResult<Option<String>> {
        let target = match self.rule.lower() {
            Some(lower) if lower > relationship_id.as_bytes() => lower.to_vec(),
            _ => relationship_id.as_bytes().to_vec(),
        };
        let item = self.outer.seek(&target);
        self.forward_from(item)
    }

    fn outer_seek_reverse(&mut self, relationship_id: &str) -> CoreResult<Option<String>> {
        let target = match self.rule.upper() {
            Some(upper) if upper < relationship_id.as_bytes() => upper.to_vec(),
            _ => relationship_id.as_bytes().to_vec(),
        };
        let item = seek_le(&mut self.outer, &target);
        self.backward_from(item)
    }

    /// Eligible bucket names in ascending order.
    fn eligible_names(&self) -> CoreResult<Vec<String>> {
        let mut names = Vec::new();
        let mut cursor = self.key_bucket.cursor();
        let mut item = match self.rule.lower() {
            Some(lower) => cursor.seek(lower),
            None => cursor.first(),
        };
        while let Some(found) = item {
            if self.above_upper(&found.0) {
                break;
            }
            if let Some(name) = self.eligible(&found)? {
                names.push(name);
            }
            item = cursor.next();
        }
        Ok(names)
    }

    fn build_homes(&self) -> CoreResult<Homes> {
        let names = self.eligible_names()?;
        let mut by_entry = HashMap::new();
        for (at, name) in names.iter().enumerate() {
            let Some(bucket) = self.key_bucket.bucket(name.as_bytes()) else {
                continue;
            };
            let mut cursor = bucket.cursor();
            let mut item = cursor.first();
            while let Some((entry, _)) = item {
                if self.rule.entry_eligible(&entry) {
                    by_entry.entry(entry).or_insert(at);
                }
                item = cursor.next();
            }
        }
        Ok(Homes { names, by_entry })
    }

    fn homes(&self) -> CoreResult<&Homes> {
        if let Some(homes) = self.homes.get() {
            return Ok(homes);
        }
        let built = self.build_homes()?;
        Ok(self.homes.get_or_init(|| built))
    }

    /// The bucket an entry is reported from, if the span reaches it at all.
    fn home_of(&self, entry: &[u8]) -> CoreResult<Option<String>> {
        Ok(self.homes()?.of(entry).map(str::to_owned))
    }

    fn accepts(&self, relationship_id: &str, entry: &[u8]) -> CoreResult<bool> {
        Ok(self.homes()?.of(entry) == Some(relationship_id))
    }

    fn open(&mut self, relationship_id: String) -> CoreResult<&mut Cursor> {
        let bucket = self
            .key_bucket
            .bucket(relationship_id.as_bytes())
            .ok_or_else(|| CoreError::not_initialized(relationship_id.clone()))?;
        let cursor = bucket.cursor();
        let inner = self.inner.insert(Inner {
            relationship_id,
            cursor,
        });
        Ok(&mut inner.cursor)
    }

    fn inner_cursor(&mut self) -> CoreResult<&mut Cursor> {
        self.inner
            .as_mut()
            .map(|inner| &mut inner.cursor)
            .ok_or(CoreError::Exhausted)
    }

    fn exhaust(&mut self, edge: Edge) -> CoreResult<String> {
        self.inner = None;
        self.edge = edge;
        Err(CoreError::Exhausted)
    }

    fn settle_forward(&mut self, mut item: Option<CursorItem>) -> CoreResult<String> {
        loop {
            while let Some((entry, _)) = item {
                let accepted = match &self.inner {
                    Some(inner) => self.accepts(&inner.relationship_id, &entry)?,
                    None => false,
                };
                if accepted {
                    return key_string(entry);
                }
                item = self.inner_cursor()?.next();
            }
            let next = self.outer.next();
            match self.forward_from(next)? {
                Some(name) => item = self.open(name)?.first(),
                None => return self.exhaust(Edge::AfterLast),
            }
        }
    }

    fn settle_backward(&mut self, mut item: Option<CursorItem>) -> CoreResult<String> {
        loop {
            while let Some((entry, _)) = item {
                let accepted = match &self.inner {
                    Some(inner) => self.accepts(&inner.relationship_id, &entry)?,
                    None => false,
                };
                if accepted {
                    return key_string(entry);
                }
                item = self.inner_cursor()?.prev();
            }
            let prev = self.outer.prev();
            match self.backward_from(prev)? {
                Some(name) => item = self.open(name)?.last(),
                None => return self.exhaust(Edge::BeforeFirst),
            }
        }
    }

    pub(crate) fn first(&mut self) -> CoreResult<String> {
        match self.outer_first()? {
            Some(name) => {
                let item = self.open(name)?.first();
                self.settle_forward(item)
            }
            None => self.exhaust(Edge::AfterLast),
        }
    }

    pub(crate) fn last(&mut self) -> CoreResult<String> {
        match self.outer_last()? {
            Some(name) => {
                let item = self.open(name)?.last();
                self.settle_backward(item)
            }
            None => self.exhaust(Edge::BeforeFirst),
        }
    }

    pub(crate) fn next(&mut self) -> CoreResult<String> {
        if self.inner.is_none() {
            return match self.edge {
                Edge::Unpositioned | Edge::BeforeFirst => self.first(),
                Edge::AfterLast => Err(CoreError::Exhausted),
            };
        }
        let item = self.inner_cursor()?.next();
        self.settle_forward(item)
    }

    pub(crate) fn prev(&mut self) -> CoreResult<String> {
        if self.inner.is_none() {
            return match self.edge {
                Edge::Unpositioned | Edge::AfterLast => self.last(),
                Edge::BeforeFirst => Err(CoreError::Exhausted),
            };
        }
        let item = self.inner_cursor()?.prev();
        self.settle_backward(item)
    }

    pub(crate) fn seek_forward(&mut self, relationship_id: &str, id: &str) -> CoreResult<String> {
        if relationship_id.is_empty() {
            if id.is_empty() {
                return self.first();
            }
            return match self.home_of(id.as_bytes())? {
                Some(name) => {
                    let _ = self.outer.seek(name.as_bytes());
                    let item = self.open(name)?.seek(id.as_bytes());
                    self.settle_forward(item)
                }
                None => self.first(),
            };
        }
        let Some(name) = self.outer_seek_forward(relationship_id)? else {
            return self.exhaust(Edge::AfterLast);
        };
        let exact = name == relationship_id && !id.is_empty();
        let cursor = self.open(name)?;
        let item = if exact {
            cursor.seek(id.as_bytes())
        } else {
            cursor.first()
        };
        self.settle_forward(item)
    }

    pub(crate) fn seek_reverse(&mut self, relationship_id: &str, id: &str) -> CoreResult<String> {
        if relationship_id.is_empty() {
            if id.is_empty() {
                return self.last();
            }
            return match self.home_of(id.as_bytes())? {
                Some(name) => {
                    let _ = self.outer.seek(name.as_bytes());
                    let item = seek_le(self.open(name)?, id.as_bytes());
                    self.settle_backward(item)
                }
                None => self.last(),
            };
        }
        let Some(name) = self.outer_seek_reverse(relationship_id)? else {
            return self.exhaust(Edge::BeforeFirst);
        };
        let exact = name == relationship_id && !id.is_empty();
        let cursor = self.open(name)?;
        let item = if exact {
            seek_le(cursor, id.as_bytes())
        } else {
            cursor.last()
        };
        self.settle_backward(item)
    }

    pub(crate) fn contains(&self, id: &str) -> CoreResult<bool> {
        Ok(self.homes()?.of(id.as_bytes()).is_some())
    }

    pub(crate) fn relationship_id(&self) -> Option<&str> {
        self.inner.as_ref().map(|inner| inner.relationship_id.as_str())
    }
}

/// Implements [`FilterCursor`](super::FilterCursor) for a newtype over a [`Span`].
macro_rules! span_cursor {
    ($cursor:ty) => {
        impl $crate::cursor::FilterCursor for $cursor {
            fn seek_forward(&mut self, relationship_id: &str, id: &str) -> $crate::error::CoreResult<String> {
                self.span.seek_forward(relationship_id, id)
            }

            fn seek_reverse(&mut self, relationship_id: &str, id: &str) -> $crate::error::CoreResult<String> {
                self.span.seek_reverse(relationship_id, id)
            }

            fn first(&mut self) -> $crate::error::CoreResult<String> {
                self.span.first()
            }

            fn last(&mut self) -> $crate::error::CoreResult<String> {
                self.span.last()
            }

            fn next(&mut self) -> $crate::error::CoreResult<String> {
                self.span.next()
            }

            fn prev(&mut self) -> $crate::error::CoreResult<String> {
                self.span.prev()
            }

            fn has_forward(&self, id: &str) -> $crate::error::CoreResult<bool> {
                self.span.contains(id)
            }

            fn has_reverse(&self, id: &str) -> $crate::error::CoreResult<bool> {
                self.span.contains(id)
            }

            fn relationship_id(&self) -> Option<&str> {
                self.span.relationship_id()
            }
        }
    };
}

pub(crate) use span_cursor;
