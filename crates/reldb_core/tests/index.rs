//! Relationship index maintenance through the public API.

use proptest::prelude::*;
use reldb_core::{CoreError, Entry, RelationshipIndex, Relationships};
use reldb_storage::View;
use reldb_testkit::prelude::*;
use std::collections::BTreeSet;

fn ids_of(tasks: &[Task]) -> BTreeSet<String> {
    tasks.iter().map(|t| t.id().to_string()).collect()
}

#[test]
fn new_entries_are_indexed_under_every_relationship() {
    let store = TestStore::memory();
    let first = store.new(Task::new("a").user("ana").tag("bug")).unwrap();
    let second = store.new(Task::new("b").user("ana").user("bo")).unwrap();

    assert_eq!(first.id(), "000000000000");
    assert_eq!(second.id(), "000000000001");
    assert_eq!(
        ids_of(&store.get_by_relationship("users", "ana").unwrap()),
        ids_of(&[first.clone(), second.clone()])
    );
    assert_eq!(ids_of(&store.get_by_relationship("users", "bo").unwrap()), ids_of(&[second]));
    assert_eq!(ids_of(&store.get_by_relationship("tags", "bug").unwrap()), ids_of(&[first]));
}

#[test]
fn empty_relationship_ids_are_not_indexed() {
    let store = TestStore::memory();
    store.new(Task::new("blank").user("").user("ana")).unwrap();
    assert_eq!(store.relationship_ids("users", None, 0).unwrap(), ["ana"]);
}

#[test]
fn edit_moves_only_the_changed_relationships() {
    let store = TestStore::memory();
    let task = store.new(Task::new("t").user("ana").user("bo")).unwrap();
    let created_at = task.created_at();

    let edited = store
        .edit(task.id(), Task::new("t2").user("bo").user("cy"))
        .unwrap();
    assert_eq!(edited.created_at(), created_at);
    assert!(store.get_by_relationship("users", "ana").unwrap().is_empty());
    assert_eq!(store.get_by_relationship("users", "bo").unwrap().len(), 1);
    assert_eq!(store.get_by_relationship("users", "cy").unwrap().len(), 1);
    assert_eq!(store.relationship_ids("users", None, 0).unwrap(), ["bo", "cy"]);
}

#[test]
fn index_delta_touches_only_the_difference() {
    let storage = reldb_storage::Store::in_memory();
    let index = RelationshipIndex::new(vec!["users".into()]);
    let old = Relationships::new().slot(["ana", "bo"]);
    let new = Relationships::new().slot(["bo", "cy"]);

    let mut tx = storage.begin_write().unwrap();
    index.apply(&mut tx, "000000000001", &Relationships::new(), &old).unwrap();
    let delta = index.apply(&mut tx, "000000000001", &old, &new).unwrap();
    assert_eq!((delta.added, delta.removed), (1, 1));
    assert!(tx.bucket(&["relationships", "users", "ana"]).is_none());
    assert!(tx
        .bucket(&["relationships", "users", "bo"])
        .unwrap()
        .contains_key(b"000000000001"));

    let reordered = Relationships::new().slot(["cy", "bo"]);
    let delta = index.apply(&mut tx, "000000000001", &new, &reordered).unwrap();
    assert_eq!((delta.added, delta.removed), (0, 0));
}

#[test]
fn delete_prunes_emptied_buckets() {
    let store = TestStore::memory();
    let lone = store.new(Task::new("lone").user("ana").tag("solo")).unwrap();
    store.new(Task::new("other").user("ana")).unwrap();

    let removed = store.delete(lone.id()).unwrap();
    assert_eq!(removed.title, "lone");
    assert!(!store.exists(lone.id()).unwrap());
    assert!(store.relationship_ids("tags", None, 0).unwrap().is_empty());
    assert_eq!(store.relationship_ids("users", None, 0).unwrap(), ["ana"]);

    let stats = store.stats().unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.relationships["tags"], 0);
    assert_eq!(stats.relationships["users"], 1);
}

#[test]
fn missing_entries_are_not_found() {
    let store = TestStore::memory();
    assert!(store.get("000000000042").unwrap_err().is_not_found());
    assert!(store.delete("000000000042").unwrap_err().is_not_found());
    assert!(store.edit("000000000042", Task::new("x")).unwrap_err().is_not_found());
    assert!(!store.exists("000000000042").unwrap());
}

#[test]
fn wrong_slot_count_is_rejected() {
    let store: reldb_core::Store<Task> =
        reldb_core::Store::open_in_memory(reldb_core::Config::new().relationships(["users"])).unwrap();
    let err = store.new(Task::new("t")).unwrap_err();
    assert!(matches!(err, CoreError::InvalidRelationships { expected: 1, actual: 2 }));
    assert_eq!(store.stats().unwrap().entries, 0);
}

#[test]
fn update_applies_closure() {
    let store = TestStore::memory();
    let task = store.new(Task::new("t").tag("bug")).unwrap();
    let updated = store
        .update(task.id(), |t| {
            t.tags = vec!["feat".into()];
            Ok(())
        })
        .unwrap();
    assert_eq!(updated.tags, ["feat"]);
    assert!(store.get_by_relationship("tags", "bug").unwrap().is_empty());
    assert_eq!(store.get_by_relationship("tags", "feat").unwrap().len(), 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn index_matches_entries_after_random_writes(
        tasks in tasks_strategy(12),
        edits in prop::collection::vec((any::<prop::sample::Index>(), task_strategy()), 0..6),
        deletes in prop::collection::vec(any::<prop::sample::Index>(), 0..4),
    ) {
        let store = TestStore::memory();
        let mut live: Vec<Task> = tasks.into_iter().map(|t| store.new(t).unwrap()).collect();

        if !live.is_empty() {
            for (pick, replacement) in edits {
                let at = pick.index(live.len());
                live[at] = store.edit(&live[at].meta.id.clone(), replacement).unwrap();
            }
        }
        for pick in deletes {
            if live.is_empty() {
                break;
            }
            let victim = live.remove(pick.index(live.len()));
            store.delete(victim.id()).unwrap();
        }

        for (slot, key) in TASK_KEYS.iter().enumerate() {
            let alphabet = if slot == 0 { USERS } else { TAGS };
            for rid in alphabet.iter().filter(|r| !r.is_empty()) {
                let expected: BTreeSet<String> = live
                    .iter()
                    .filter(|t| t.relationships().get(slot).iter().any(|r| r == rid))
                    .map(|t| t.id().to_string())
                    .collect();
                let actual = ids_of(&store.get_by_relationship(key, rid).unwrap());
                prop_assert_eq!(actual, expected);
            }
            let in_use: BTreeSet<String> = live
                .iter()
                .flat_map(|t| t.relationships().get(slot).to_vec())
                .filter(|r| !r.is_empty())
                .collect();
            let listed: BTreeSet<String> = store.relationship_ids(key, None, 0).unwrap().into_iter().collect();
            prop_assert_eq!(listed, in_use);
        }
    }
}
