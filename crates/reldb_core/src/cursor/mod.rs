//! Filter cursors over entry IDs.
//!
//! Every filter kind compiles to a [`FilterCursor`]. All positioning methods
//! return the entry ID they land on, or [`CoreError::Exhausted`] when the
//! cursor runs out in that direction.
//!
//! | Filter | Cursor | Order |
//! |--------|--------|-------|
//! | none | [`UnfilteredCursor`] | entry ID |
//! | [`Filter::Match`] | [`MatchCursor`] | entry ID |
//! | [`Filter::InverseMatch`] | [`InverseMatchCursor`] | relationship ID, then entry ID |
//! | [`Filter::Comparison`] | [`ComparisonCursor`] | relationship ID, then entry ID |
//! | several | [`MultiCursor`] | that of the first filter |

mod comparison;
mod inverse;
mod matching;
mod multi;
mod seek;
mod span;
mod unfiltered;
mod walk;

pub use comparison::ComparisonCursor;
pub use inverse::InverseMatchCursor;
pub use matching::MatchCursor;
pub use multi::MultiCursor;
pub use seek::{SeekToken, SEEK_SEPARATOR};
pub use unfiltered::UnfilteredCursor;

use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use crate::meta::RELATIONSHIPS;
use reldb_storage::{Bucket, StorageError, View};
use std::sync::Arc;

/// Movement over entry IDs selected by a filter.
pub trait FilterCursor: Send {
    /// Moves to the first position at or after `(relationship_id, id)`.
    ///
    /// Cursors bound to a single bucket ignore `relationship_id`. An empty
    /// `relationship_id` seeks by entry ID alone.
    fn seek_forward(&mut self, relationship_id: &str, id: &str) -> CoreResult<String>;

    /// Moves to the last position at or before `(relationship_id, id)`.
    fn seek_reverse(&mut self, relationship_id: &str, id: &str) -> CoreResult<String>;

    /// Moves to the first entry.
    fn first(&mut self) -> CoreResult<String>;

    /// Moves to the last entry.
    fn last(&mut self) -> CoreResult<String>;

    /// Moves to the next entry.
    fn next(&mut self) -> CoreResult<String>;

    /// Moves to the previous entry.
    fn prev(&mut self) -> CoreResult<String>;

    /// Returns true if a forward walk of this cursor would reach `id`.
    fn has_forward(&self, id: &str) -> CoreResult<bool>;

    /// Returns true if a reverse walk of this cursor would reach `id`.
    fn has_reverse(&self, id: &str) -> CoreResult<bool>;

    /// Returns the relationship bucket of the current position, if the
    /// cursor walks relationship buckets.
    fn relationship_id(&self) -> Option<&str>;
}

/// Opens the cursor for one filter, or the unfiltered cursor for `None`.
pub fn new_filter_cursor<V: View>(view: &V, filter: Option<&Filter>) -> CoreResult<Box<dyn FilterCursor>> {
    Ok(match filter {
        None => Box::new(UnfilteredCursor::new(view)?),
        Some(Filter::Match { key, id }) => Box::new(MatchCursor::new(view, key, id)?),
        Some(Filter::InverseMatch { key, id }) => Box::new(InverseMatchCursor::new(view, key, id)?),
        Some(Filter::Comparison {
            key,
            range_start,
            range_end,
            predicate,
        }) => Box::new(ComparisonCursor::new(
            view,
            key,
            range_start,
            range_end,
            Arc::clone(predicate),
        )?),
    })
}

/// Opens the cursor for a conjunction of filters.
///
/// No filters walks every entry; one filter uses its own cursor.
pub fn new_multi_cursor<V: View>(view: &V, filters: &[Filter]) -> CoreResult<Box<dyn FilterCursor>> {
    match filters {
        [] => new_filter_cursor(view, None),
        [only] => new_filter_cursor(view, Some(only)),
        _ => Ok(Box::new(MultiCursor::new(view, filters)?)),
    }
}

/// Returns the `relationships/<key>` bucket.
pub(crate) fn key_bucket<V: View>(view: &V, key: &str) -> CoreResult<Arc<Bucket>> {
    if key.is_empty() {
        return Err(CoreError::invalid_filters("relationship key must not be empty"));
    }
    view.bucket(&[RELATIONSHIPS, key])
        .ok_or_else(|| CoreError::relationship_not_found(key))
}

pub(crate) fn key_string(key: Vec<u8>) -> CoreResult<String> {
    String::from_utf8(key).map_err(|e| StorageError::Encoding(format!("entry key: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{format_id, Relationships};
    use crate::meta::{self, ENTRIES};
    use crate::relationships::RelationshipIndex;
    use reldb_storage::Store;

    /// Entries 0..n; entry `i` is related to the users and tags given by `rels(i)`.
    fn fixture(n: u64, rels: impl Fn(u64) -> (Vec<&'static str>, Vec<&'static str>)) -> Store {
        let store = Store::in_memory();
        let keys = vec!["users".to_string(), "tags".to_string()];
        let index = RelationshipIndex::new(keys.clone());
        let mut tx = store.begin_write().unwrap();
        meta::initialize(&mut tx, &keys).unwrap();
        for i in 0..n {
            let id = format_id(i, 3);
            tx.bucket_mut(&[ENTRIES]).unwrap().unwrap().put(id.as_bytes(), b"{}").unwrap();
            let (users, tags) = rels(i);
            let new = Relationships::new().slot(users).slot(tags);
            index.apply(&mut tx, &id, &Relationships::new(), &new).unwrap();
        }
        tx.commit().unwrap();
        store
    }

    fn collect_forward(cursor: &mut dyn FilterCursor) -> Vec<String> {
        let mut out = Vec::new();
        let mut step = cursor.first();
        while let Ok(id) = step {
            out.push(id);
            step = cursor.next();
        }
        assert!(step.unwrap_err().is_exhausted());
        out
    }

    fn collect_reverse(cursor: &mut dyn FilterCursor) -> Vec<String> {
        let mut out = Vec::new();
        let mut step = cursor.last();
        while let Ok(id) = step {
            out.push(id);
            step = cursor.prev();
        }
        assert!(step.unwrap_err().is_exhausted());
        out
    }

    fn ids(list: &[u64]) -> Vec<String> {
        list.iter().map(|i| format_id(*i, 3)).collect()
    }

    /// Users: even entries -> "a", odd -> "b", multiples of 3 also "c".
    fn users_fixture() -> Store {
        fixture(7, |i| {
            let mut users = vec![if i % 2 == 0 { "a" } else { "b" }];
            if i % 3 == 0 {
                users.push("c");
            }
            (users, vec![])
        })
    }

    #[test]
    fn unfiltered_walks_all_entries() {
        let store = fixture(4, |_| (vec![], vec![]));
        let tx = store.begin_read().unwrap();
        let mut cursor = new_multi_cursor(&tx, &[]).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[0, 1, 2, 3]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[3, 2, 1, 0]));
        assert_eq!(cursor.relationship_id(), None);
    }

    #[test]
    fn match_cursor_walks_one_bucket() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::matching("users", "a"))).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[0, 2, 4, 6]));
        assert!(cursor.has_forward("002").unwrap());
        assert!(!cursor.has_forward("001").unwrap());
        assert_eq!(cursor.seek_forward("", "003").unwrap(), "004");
        assert_eq!(cursor.seek_reverse("", "003").unwrap(), "002");
        assert_eq!(cursor.relationship_id(), Some("a"));
    }

    #[test]
    fn match_on_unrelated_id_is_empty() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::matching("users", "zzz"))).unwrap();
        assert!(cursor.first().unwrap_err().is_exhausted());
        assert!(cursor.last().unwrap_err().is_exhausted());
    }

    #[test]
    fn unknown_key_is_not_found() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let err = new_filter_cursor(&tx, Some(&Filter::matching("nope", "a"))).err().unwrap();
        assert!(matches!(err, CoreError::RelationshipNotFound { .. }));
    }

    #[test]
    fn inverse_excludes_designated_members() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        // Not related to "a": odd entries. 3 is in "b" and "c" but reported once.
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::inverse("users", "a"))).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[1, 3, 5]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[5, 3, 1]));
        assert!(cursor.has_forward("003").unwrap());
        assert!(!cursor.has_forward("006").unwrap());
    }

    #[test]
    fn inverse_deduplicates_across_buckets() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        // Not related to "b": even entries; 0 and 6 sit in both "a" and "c".
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::inverse("users", "b"))).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[0, 2, 4, 6]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[6, 4, 2, 0]));
    }

    #[test]
    fn comparison_applies_predicate_to_bucket_names() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let filter = Filter::comparison("users", |id| id != "a");
        let mut cursor = new_filter_cursor(&tx, Some(&filter)).unwrap();
        // "b": 1,3,5 then "c": 0,3(dup),6
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[1, 3, 5, 0, 6]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[6, 0, 5, 3, 1]));
    }

    #[test]
    fn comparison_range_is_inclusive() {
        let store = fixture(5, |i| (vec![], vec![["t1", "t2", "t3", "t4", "t5"][i as usize]]));
        let tx = store.begin_read().unwrap();
        let filter = Filter::range("tags", "t2", "t4", |_| true);
        let mut cursor = new_filter_cursor(&tx, Some(&filter)).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[1, 2, 3]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[3, 2, 1]));
        assert!(cursor.has_forward("001").unwrap());
        assert!(!cursor.has_forward("000").unwrap());
        assert!(!cursor.has_forward("004").unwrap());
    }

    #[test]
    fn comparison_seek_crosses_buckets() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::comparison("users", |_| true))).unwrap();
        // a: 0,2,4,6 | b: 1,3,5 | c: (0),(3),(6) all reported earlier
        assert_eq!(cursor.seek_forward("a", "005").unwrap(), "006");
        assert_eq!(cursor.next().unwrap(), "001");
        assert_eq!(cursor.relationship_id(), Some("b"));
        assert!(cursor.seek_forward("b", "006").unwrap_err().is_exhausted());
        assert_eq!(cursor.seek_reverse("b", "002").unwrap(), "001");
        assert_eq!(cursor.prev().unwrap(), "006");
        assert_eq!(cursor.relationship_id(), Some("a"));
    }

    #[test]
    fn bare_seek_finds_reporting_bucket() {
        let store = users_fixture();
        let tx = store.begin_read().unwrap();
        let mut cursor = new_filter_cursor(&tx, Some(&Filter::comparison("users", |_| true))).unwrap();
        assert_eq!(cursor.seek_forward("", "003").unwrap(), "003");
        assert_eq!(cursor.relationship_id(), Some("b"));
        assert_eq!(cursor.next().unwrap(), "005");
    }

    #[test]
    fn wide_range_reports_each_entry_once() {
        // Entry i sits under its own user and under "shared"; every third
        // entry also under the next entry's user.
        let n = 600u64;
        let store = Store::in_memory();
        let keys = vec!["users".to_string(), "tags".to_string()];
        let index = RelationshipIndex::new(keys.clone());
        let mut tx = store.begin_write().unwrap();
        meta::initialize(&mut tx, &keys).unwrap();
        for i in 0..n {
            let id = format_id(i, 4);
            tx.bucket_mut(&[ENTRIES]).unwrap().unwrap().put(id.as_bytes(), b"{}").unwrap();
            let mut users = vec![format!("u{i:05}"), "shared".to_string()];
            if i % 3 == 0 {
                users.push(format!("u{:05}", i + 1));
            }
            let new = Relationships::new().slot(users).slot(Vec::<String>::new());
            index.apply(&mut tx, &id, &Relationships::new(), &new).unwrap();
        }
        tx.commit().unwrap();

        let tx = store.begin_read().unwrap();
        let filter = Filter::range("users", "u00000", "u99999", |_| true);
        let mut cursor = new_filter_cursor(&tx, Some(&filter)).unwrap();
        let forward = collect_forward(cursor.as_mut());
        let expected: Vec<String> = (0..n).map(|i| format_id(i, 4)).collect();
        assert_eq!(forward, expected);

        let mut reverse = collect_reverse(cursor.as_mut());
        reverse.reverse();
        assert_eq!(reverse, expected);

        // u00001 holds 0000 too, but 0000 is reported from u00000.
        assert_eq!(cursor.seek_forward("u00001", "").unwrap(), "0001");
        assert_eq!(cursor.next().unwrap(), "0002");
        assert!(cursor.has_forward("0599").unwrap());
        assert!(!cursor.has_forward("0600").unwrap());

        let mut cursor = new_filter_cursor(&tx, Some(&Filter::inverse("users", "shared"))).unwrap();
        assert!(cursor.first().unwrap_err().is_exhausted());
    }

    #[test]
    fn multi_cursor_intersects() {
        let store = fixture(8, |i| {
            let user = if i < 4 { "u1" } else { "u2" };
            let tag = if i % 2 == 0 { "even" } else { "odd" };
            (vec![user], vec![tag])
        });
        let tx = store.begin_read().unwrap();
        let filters = [Filter::matching("users", "u2"), Filter::matching("tags", "odd")];
        let mut cursor = new_multi_cursor(&tx, &filters).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[5, 7]));
        assert_eq!(collect_reverse(cursor.as_mut()), ids(&[7, 5]));
        assert_eq!(cursor.seek_forward("", "006").unwrap(), "007");

        let filters = [Filter::matching("tags", "odd"), Filter::inverse("users", "u2")];
        let mut cursor = new_multi_cursor(&tx, &filters).unwrap();
        assert_eq!(collect_forward(cursor.as_mut()), ids(&[1, 3]));
    }

    #[test]
    fn multi_cursor_requires_filters() {
        let store = fixture(1, |_| (vec![], vec![]));
        let tx = store.begin_read().unwrap();
        let err = MultiCursor::new(&tx, &[]).err().unwrap();
        assert!(matches!(err, CoreError::InvalidFilters { .. }));
    }
}
