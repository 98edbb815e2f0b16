//! Property-based test generators using proptest.

use crate::fixtures::Task;
use proptest::prelude::*;

/// Strategy for a relationship slot drawn from a small alphabet, so that
/// generated tasks share relationship IDs. May contain duplicates and
/// empty IDs.
pub fn slot_strategy(alphabet: &'static [&'static str]) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(prop::sample::select(alphabet), 0..4)
        .prop_map(|ids| ids.into_iter().map(str::to_string).collect())
}

/// User IDs used by [`task_strategy`].
pub const USERS: &[&str] = &["ana", "bo", "cy", "dee", ""];

/// Tags used by [`task_strategy`].
pub const TAGS: &[&str] = &["bug", "chore", "feat", "urgent"];

/// Strategy for an unsaved [`Task`].
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (
        prop::string::string_regex("[a-z ]{1,16}").expect("Invalid regex"),
        slot_strategy(USERS),
        slot_strategy(TAGS),
    )
        .prop_map(|(title, users, tags)| Task {
            title,
            users,
            tags,
            ..Task::default()
        })
}

/// Strategy for a list of unsaved tasks.
pub fn tasks_strategy(max: usize) -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(task_strategy(), 0..max)
}
