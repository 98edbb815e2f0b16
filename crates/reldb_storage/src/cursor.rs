//! Bucket cursors.

use crate::bucket::{Bucket, Node};
use std::ops::Bound;
use std::sync::Arc;

/// A key and its value; nested buckets have no value.
pub type CursorItem = (Vec<u8>, Option<Vec<u8>>);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Unpositioned,
    BeforeFirst,
    At(Vec<u8>),
    AfterLast,
}

/// A bidirectional cursor over a bucket snapshot.
///
/// Every positioning method returns `None` once the cursor runs off either
/// end of the bucket. Stepping back from the far end re-enters the bucket at
/// the last (or first) key, so `seek` past the end followed by `prev` lands
/// on the last key.
///
/// The cursor owns its snapshot: writes made after it was opened are not
/// visible through it.
#[derive(Debug, Clone)]
pub struct Cursor {
    bucket: Arc<Bucket>,
    position: Position,
}

impl Cursor {
    pub(crate) fn new(bucket: Arc<Bucket>) -> Self {
        Self {
            bucket,
            position: Position::Unpositioned,
        }
    }

    /// Moves to the first key.
    pub fn first(&mut self) -> Option<CursorItem> {
        let found = self.bucket.entries().iter().next().map(item);
        self.settle(found, Position::AfterLast)
    }

    /// Moves to the last key.
    pub fn last(&mut self) -> Option<CursorItem> {
        let found = self.bucket.entries().iter().next_back().map(item);
        self.settle(found, Position::BeforeFirst)
    }

    /// Moves to the first key greater than or equal to `key`.
    pub fn seek(&mut self, key: &[u8]) -> Option<CursorItem> {
        let found = self
            .bucket
            .entries()
            .range::<_, [u8]>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(item);
        self.settle(found, Position::AfterLast)
    }

    /// Moves to the next key.
    pub fn next(&mut self) -> Option<CursorItem> {
        match &self.position {
            Position::Unpositioned | Position::BeforeFirst => self.first(),
            Position::AfterLast => None,
            Position::At(current) => {
                let found = self
                    .bucket
                    .entries()
                    .range::<_, [u8]>((Bound::Excluded(current.as_slice()), Bound::Unbounded))
                    .next()
                    .map(item);
                self.settle(found, Position::AfterLast)
            }
        }
    }

    /// Moves to the previous key.
    pub fn prev(&mut self) -> Option<CursorItem> {
        match &self.position {
            Position::Unpositioned | Position::AfterLast => self.last(),
            Position::BeforeFirst => None,
            Position::At(current) => {
                let found = self
                    .bucket
                    .entries()
                    .range::<_, [u8]>((Bound::Unbounded, Bound::Excluded(current.as_slice())))
                    .next_back()
                    .map(item);
                self.settle(found, Position::BeforeFirst)
            }
        }
    }

    /// Returns the key the cursor is positioned on.
    #[must_use]
    pub fn key(&self) -> Option<&[u8]> {
        match &self.position {
            Position::At(key) => Some(key),
            _ => None,
        }
    }

    /// Returns the bucket snapshot this cursor walks.
    #[must_use]
    pub fn bucket(&self) -> &Arc<Bucket> {
        &self.bucket
    }

    fn settle(&mut self, found: Option<CursorItem>, exhausted: Position) -> Option<CursorItem> {
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => exhausted,
        };
        found
    }
}

fn item((key, node): (&Vec<u8>, &Node)) -> CursorItem {
    match node {
        Node::Value(value) => (key.clone(), Some(value.clone())),
        Node::Bucket(_) => (key.clone(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket_with(keys: &[&str]) -> Arc<Bucket> {
        let mut bucket = Bucket::new();
        for key in keys {
            bucket.put(&[], key.as_bytes(), b"").unwrap();
        }
        Arc::new(bucket)
    }

    fn key_of(item: Option<CursorItem>) -> Option<String> {
        item.map(|(k, _)| String::from_utf8(k).unwrap())
    }

    #[test]
    fn forward_walk() {
        let mut cursor = bucket_with(&["b", "a", "c"]).cursor();
        assert_eq!(key_of(cursor.first()).as_deref(), Some("a"));
        assert_eq!(key_of(cursor.next()).as_deref(), Some("b"));
        assert_eq!(key_of(cursor.next()).as_deref(), Some("c"));
        assert_eq!(key_of(cursor.next()), None);
        assert_eq!(key_of(cursor.next()), None);
    }

    #[test]
    fn reverse_walk() {
        let mut cursor = bucket_with(&["a", "b", "c"]).cursor();
        assert_eq!(key_of(cursor.last()).as_deref(), Some("c"));
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("b"));
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("a"));
        assert_eq!(key_of(cursor.prev()), None);
    }

    #[test]
    fn seek_lands_on_next_greater_key() {
        let mut cursor = bucket_with(&["a", "c", "e"]).cursor();
        assert_eq!(key_of(cursor.seek(b"b")).as_deref(), Some("c"));
        assert_eq!(key_of(cursor.seek(b"c")).as_deref(), Some("c"));
        assert_eq!(key_of(cursor.seek(b"f")), None);
    }

    #[test]
    fn prev_after_seek_past_end_returns_last() {
        let mut cursor = bucket_with(&["a", "c"]).cursor();
        assert_eq!(key_of(cursor.seek(b"z")), None);
        assert_eq!(key_of(cursor.prev()).as_deref(), Some("c"));
    }

    #[test]
    fn empty_bucket_is_exhausted() {
        let mut cursor = Arc::new(Bucket::new()).cursor();
        assert!(cursor.first().is_none());
        assert!(cursor.last().is_none());
        assert!(cursor.seek(b"a").is_none());
        assert!(cursor.key().is_none());
    }

    #[test]
    fn nested_bucket_has_no_value() {
        let mut bucket = Bucket::new();
        bucket.child_mut(&[], b"child", true).unwrap();
        let mut cursor = Arc::new(bucket).cursor();
        assert_eq!(cursor.first(), Some((b"child".to_vec(), None)));
    }
}
