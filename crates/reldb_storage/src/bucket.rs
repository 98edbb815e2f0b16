//! Nested ordered buckets.
//!
//! A [`Bucket`] is an ordered map from byte keys to either a value or a
//! nested bucket. Keys live in a persistent B-tree ([`OrdMap`]) and nested
//! buckets behind [`Arc`], so a whole tree is snapshotted by cloning its root
//! in constant time. A write copies only the B-tree nodes on the path to the
//! key it touches; readers keep seeing the tree they started with.

use crate::cursor::Cursor;
use crate::error::{StorageError, StorageResult};
use im::OrdMap;
use std::sync::Arc;

/// A node stored under a bucket key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A plain value.
    Value(Vec<u8>),
    /// A nested bucket.
    Bucket(Arc<Bucket>),
}

/// An ordered bucket of keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bucket {
    entries: OrdMap<Vec<u8>, Node>,
}

impl Bucket {
    /// Creates an empty bucket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value stored under `key`.
    ///
    /// Returns `None` when the key is missing or holds a nested bucket.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Node::Value(value)) => Some(value.as_slice()),
            _ => None,
        }
    }

    /// Returns the nested bucket stored under `key`.
    #[must_use]
    pub fn bucket(&self, key: &[u8]) -> Option<&Arc<Bucket>> {
        match self.entries.get(key) {
            Some(Node::Bucket(bucket)) => Some(bucket),
            _ => None,
        }
    }

    /// Returns true if `key` exists, either as a value or a nested bucket.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.entries.contains_key(key)
    }

    /// Returns the number of keys in this bucket (values and nested buckets).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the bucket has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Walks the bucket in key order.
    ///
    /// Nested buckets are reported with a `None` value.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&[u8], Option<&[u8]>) -> Result<(), E>,
    {
        for (key, node) in self.entries.iter() {
            match node {
                Node::Value(value) => f(key, Some(value))?,
                Node::Bucket(_) => f(key, None)?,
            }
        }
        Ok(())
    }

    /// Opens a cursor over a snapshot of this bucket.
    #[must_use]
    pub fn cursor(self: &Arc<Self>) -> Cursor {
        Cursor::new(Arc::clone(self))
    }

    /// Follows `path` from this bucket and returns the bucket at its end.
    #[must_use]
    pub fn descend(self: &Arc<Self>, path: &[Vec<u8>]) -> Option<Arc<Bucket>> {
        let mut current = Arc::clone(self);
        for segment in path {
            let next = Arc::clone(current.bucket(segment)?);
            current = next;
        }
        Some(current)
    }

    pub(crate) fn entries(&self) -> &OrdMap<Vec<u8>, Node> {
        &self.entries
    }

    pub(crate) fn put(&mut self, path: &[Vec<u8>], key: &[u8], value: &[u8]) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        if let Some(Node::Bucket(_)) = self.entries.get(key) {
            return Err(StorageError::incompatible(path, "cannot overwrite a bucket with a value"));
        }
        self.entries.insert(key.to_vec(), Node::Value(value.to_vec()));
        Ok(())
    }

    pub(crate) fn delete(&mut self, path: &[Vec<u8>], key: &[u8]) -> StorageResult<bool> {
        match self.entries.get(key) {
            None => Ok(false),
            Some(Node::Bucket(_)) => Err(StorageError::incompatible(
                path,
                "cannot delete a bucket as a value",
            )),
            Some(Node::Value(_)) => {
                self.entries.remove(key);
                Ok(true)
            }
        }
    }

    pub(crate) fn delete_bucket(&mut self, path: &[Vec<u8>], key: &[u8]) -> StorageResult<bool> {
        match self.entries.get(key) {
            None => Ok(false),
            Some(Node::Value(_)) => Err(StorageError::incompatible(path, "key holds a value, not a bucket")),
            Some(Node::Bucket(_)) => {
                self.entries.remove(key);
                Ok(true)
            }
        }
    }

    /// Returns a mutable handle on the child bucket, creating it when asked to.
    ///
    /// The returned bucket is unshared: if a reader still holds the old
    /// version it is copied first.
    pub(crate) fn child_mut(
        &mut self,
        path: &[Vec<u8>],
        key: &[u8],
        create: bool,
    ) -> StorageResult<Option<&mut Bucket>> {
        if key.is_empty() {
            return Err(StorageError::EmptyKey);
        }
        if !self.entries.contains_key(key) {
            if !create {
                return Ok(None);
            }
            self.entries
                .insert(key.to_vec(), Node::Bucket(Arc::new(Bucket::new())));
        }
        match self.entries.get_mut(key) {
            Some(Node::Bucket(bucket)) => Ok(Some(Arc::make_mut(bucket))),
            Some(Node::Value(_)) => Err(StorageError::incompatible(path, "key holds a value, not a bucket")),
            None => Ok(None),
        }
    }

    /// Follows `path` mutably, creating missing buckets when `create` is set.
    pub(crate) fn descend_mut(
        &mut self,
        path: &[Vec<u8>],
        create: bool,
    ) -> StorageResult<Option<&mut Bucket>> {
        let mut current = self;
        for (depth, segment) in path.iter().enumerate() {
            match current.child_mut(&path[..depth], segment, create)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<Vec<u8>> {
        segments.iter().map(|s| s.as_bytes().to_vec()).collect()
    }

    #[test]
    fn put_and_get_value() {
        let mut bucket = Bucket::new();
        bucket.put(&[], b"a", b"1").unwrap();
        assert_eq!(bucket.get(b"a"), Some(&b"1"[..]));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn empty_key_rejected() {
        let mut bucket = Bucket::new();
        assert!(matches!(bucket.put(&[], b"", b"1"), Err(StorageError::EmptyKey)));
    }

    #[test]
    fn value_cannot_replace_bucket() {
        let mut bucket = Bucket::new();
        bucket.child_mut(&[], b"child", true).unwrap();
        let result = bucket.put(&[], b"child", b"1");
        assert!(matches!(result, Err(StorageError::IncompatibleValue { .. })));
    }

    #[test]
    fn descend_mut_creates_path() {
        let mut root = Bucket::new();
        let leaf = root
            .descend_mut(&path(&["relationships", "users", "u1"]), true)
            .unwrap()
            .unwrap();
        leaf.put(&[], b"000000000001", b"").unwrap();

        let root = Arc::new(root);
        let leaf = root.descend(&path(&["relationships", "users", "u1"])).unwrap();
        assert!(leaf.contains_key(b"000000000001"));
    }

    #[test]
    fn descend_mut_without_create_stops() {
        let mut root = Bucket::new();
        assert!(root.descend_mut(&path(&["missing"]), false).unwrap().is_none());
        assert!(root.is_empty());
    }

    #[test]
    fn snapshot_is_not_affected_by_later_writes() {
        let mut root = Bucket::new();
        root.descend_mut(&path(&["entries"]), true)
            .unwrap()
            .unwrap()
            .put(&[], b"k", b"v1")
            .unwrap();
        let snapshot = Arc::new(root.clone());

        root.descend_mut(&path(&["entries"]), false)
            .unwrap()
            .unwrap()
            .put(&[], b"k", b"v2")
            .unwrap();

        let old = snapshot.descend(&path(&["entries"])).unwrap();
        assert_eq!(old.get(b"k"), Some(&b"v1"[..]));
    }

    #[test]
    fn write_after_snapshot_leaves_untouched_subtrees_shared() {
        let mut root = Bucket::new();
        let entries = root.descend_mut(&path(&["entries"]), true).unwrap().unwrap();
        for i in 0..1000u32 {
            entries.put(&[], &i.to_be_bytes(), b"record").unwrap();
        }
        root.child_mut(&[], b"meta", true).unwrap();
        let snapshot = Arc::new(root.clone());

        root.descend_mut(&path(&["meta"]), false)
            .unwrap()
            .unwrap()
            .put(&[], b"index", b"1")
            .unwrap();
        root.descend_mut(&path(&["entries"]), false)
            .unwrap()
            .unwrap()
            .put(&[], &7u32.to_be_bytes(), b"changed")
            .unwrap();

        let old = snapshot.descend(&path(&["entries"])).unwrap();
        let new = Arc::new(root).descend(&path(&["entries"])).unwrap();
        assert_eq!(old.get(&7u32.to_be_bytes()), Some(&b"record"[..]));
        assert_eq!(new.get(&7u32.to_be_bytes()), Some(&b"changed"[..]));
        assert_eq!(new.get(&999u32.to_be_bytes()), Some(&b"record"[..]));
        assert!(snapshot.descend(&path(&["meta"])).unwrap().is_empty());
    }

    #[test]
    fn delete_bucket_removes_child() {
        let mut root = Bucket::new();
        root.child_mut(&[], b"child", true).unwrap();
        assert!(root.delete_bucket(&[], b"child").unwrap());
        assert!(!root.delete_bucket(&[], b"child").unwrap());
    }

    #[test]
    fn for_each_reports_buckets_without_value() {
        let mut root = Bucket::new();
        root.put(&[], b"a", b"1").unwrap();
        root.child_mut(&[], b"b", true).unwrap();

        let mut seen = Vec::new();
        root.for_each::<(), _>(|key, value| {
            seen.push((key.to_vec(), value.map(<[u8]>::to_vec)));
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![(b"a".to_vec(), Some(b"1".to_vec())), (b"b".to_vec(), None)]);
    }
}
