//! Relationship index maintenance.
//!
//! Every non-empty relationship ID of an entry is recorded as a presence key
//! `relationships/<key>/<relationship id>/<entry id>`. Writes apply only the
//! difference between the entry's previous and new relationship sets.

use crate::entry::Relationships;
use crate::error::{CoreError, CoreResult};
use crate::meta::RELATIONSHIPS;
use reldb_storage::WriteTx;
use std::collections::HashSet;
use tracing::trace;

/// Counts of presence keys written and removed by one [`RelationshipIndex::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexDelta {
    /// Presence keys added.
    pub added: usize,
    /// Presence keys removed.
    pub removed: usize,
}

/// Keeps the relationship index buckets in step with the entries.
#[derive(Debug, Clone)]
pub struct RelationshipIndex {
    keys: Vec<String>,
}

impl RelationshipIndex {
    /// Creates a maintainer for the given ordered relationship keys.
    #[must_use]
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// Returns the configured keys.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Checks that `relationships` has exactly one slot per key.
    pub fn validate(&self, relationships: &Relationships) -> CoreResult<()> {
        if relationships.len() == self.keys.len() {
            Ok(())
        } else {
            Err(CoreError::InvalidRelationships {
                expected: self.keys.len(),
                actual: relationships.len(),
            })
        }
    }

    /// Moves the index for `entry_id` from `old` to `new`.
    ///
    /// Creation passes an empty `old`, deletion an empty `new`. Slots are
    /// compared by membership, so reordering IDs within a slot is a no-op.
    pub fn apply(
        &self,
        tx: &mut WriteTx,
        entry_id: &str,
        old: &Relationships,
        new: &Relationships,
    ) -> CoreResult<IndexDelta> {
        let mut delta = IndexDelta::default();
        for (slot, key) in self.keys.iter().enumerate() {
            let before = id_set(old.get(slot));
            let after = id_set(new.get(slot));

            for id in ordered(new.get(slot)).filter(|id| !before.contains(id)) {
                set(tx, key, id, entry_id)?;
                delta.added += 1;
            }
            for id in ordered(old.get(slot)).filter(|id| !after.contains(id)) {
                unset(tx, key, id, entry_id)?;
                delta.removed += 1;
            }
        }
        trace!(entry_id, added = delta.added, removed = delta.removed, "relationship index updated");
        Ok(delta)
    }
}

fn id_set(ids: &[String]) -> HashSet<&str> {
    ids.iter().map(String::as_str).filter(|id| !id.is_empty()).collect()
}

/// Non-empty IDs in slot order, each once.
fn ordered(ids: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(String::as_str)
        .filter(move |id| !id.is_empty() && seen.insert(*id))
}

fn set(tx: &mut WriteTx, key: &str, relationship_id: &str, entry_id: &str) -> CoreResult<()> {
    tx.create_bucket_if_missing(&[RELATIONSHIPS, key, relationship_id])?
        .put(entry_id.as_bytes(), b"")?;
    Ok(())
}

fn unset(tx: &mut WriteTx, key: &str, relationship_id: &str, entry_id: &str) -> CoreResult<()> {
    let path = [RELATIONSHIPS, key, relationship_id];
    let now_empty = match tx.bucket_mut(&path)? {
        Some(mut bucket) => {
            bucket.delete(entry_id.as_bytes())?;
            bucket.is_empty()
        }
        None => false,
    };
    if now_empty {
        tx.delete_bucket(&path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta;
    use reldb_storage::{Store, View};

    fn setup() -> (Store, RelationshipIndex) {
        let store = Store::in_memory();
        let keys = vec!["users".to_string(), "groups".to_string()];
        let mut tx = store.begin_write().unwrap();
        meta::initialize(&mut tx, &keys).unwrap();
        tx.commit().unwrap();
        (store, RelationshipIndex::new(keys))
    }

    fn indexed<V: View>(view: &V, key: &str, id: &str, entry: &str) -> bool {
        view.bucket(&[RELATIONSHIPS, key, id])
            .is_some_and(|b| b.contains_key(entry.as_bytes()))
    }

    #[test]
    fn create_indexes_every_id() {
        let (store, index) = setup();
        let mut tx = store.begin_write().unwrap();
        let rels = Relationships::new().slot(["u1", "u2"]).slot(["g1"]);
        let delta = index.apply(&mut tx, "000000000000", &Relationships::new(), &rels).unwrap();
        assert_eq!(delta, IndexDelta { added: 3, removed: 0 });
        assert!(indexed(&tx, "users", "u1", "000000000000"));
        assert!(indexed(&tx, "users", "u2", "000000000000"));
        assert!(indexed(&tx, "groups", "g1", "000000000000"));
    }

    #[test]
    fn edit_applies_only_the_difference() {
        let (store, index) = setup();
        let mut tx = store.begin_write().unwrap();
        let old = Relationships::new().slot(["u1", "u2"]).slot(["g1"]);
        let new = Relationships::new().slot(["u2", "u3"]).slot(["g1"]);
        index.apply(&mut tx, "000000000000", &Relationships::new(), &old).unwrap();

        let delta = index.apply(&mut tx, "000000000000", &old, &new).unwrap();
        assert_eq!(delta, IndexDelta { added: 1, removed: 1 });
        assert!(!indexed(&tx, "users", "u1", "000000000000"));
        assert!(indexed(&tx, "users", "u2", "000000000000"));
        assert!(indexed(&tx, "users", "u3", "000000000000"));
        assert!(indexed(&tx, "groups", "g1", "000000000000"));
    }

    #[test]
    fn empty_and_duplicate_ids_are_ignored() {
        let (store, index) = setup();
        let mut tx = store.begin_write().unwrap();
        let rels = Relationships::new().slot(["", "u1", "u1"]).slot([""]);
        let delta = index.apply(&mut tx, "000000000000", &Relationships::new(), &rels).unwrap();
        assert_eq!(delta.added, 1);
        let groups = tx.bucket(&[RELATIONSHIPS, "groups"]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn delete_prunes_empty_buckets() {
        let (store, index) = setup();
        let mut tx = store.begin_write().unwrap();
        let a = Relationships::new().slot(["u1"]).slot(["g1"]);
        let b = Relationships::new().slot(["u1"]).slot(Vec::<String>::new());
        index.apply(&mut tx, "000000000000", &Relationships::new(), &a).unwrap();
        index.apply(&mut tx, "000000000001", &Relationships::new(), &b).unwrap();

        index.apply(&mut tx, "000000000000", &a, &Relationships::new()).unwrap();
        assert!(tx.bucket(&[RELATIONSHIPS, "groups", "g1"]).is_none());
        assert!(indexed(&tx, "users", "u1", "000000000001"));
        assert!(!indexed(&tx, "users", "u1", "000000000000"));

        index.apply(&mut tx, "000000000001", &b, &Relationships::new()).unwrap();
        assert!(tx.bucket(&[RELATIONSHIPS, "users", "u1"]).is_none());
        assert!(tx.bucket(&[RELATIONSHIPS, "users"]).is_some());
    }

    #[test]
    fn slot_count_is_validated() {
        let (_store, index) = setup();
        let err = index.validate(&Relationships::new().slot(["u1"])).unwrap_err();
        assert!(matches!(err, CoreError::InvalidRelationships { expected: 2, actual: 1 }));
    }
}
