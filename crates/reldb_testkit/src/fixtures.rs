//! Test fixtures and store helpers.

use reldb_core::{Config, Entry, EntryMeta, JsonCodec, Ledger, Relationships, Store};
use reldb_storage::MemoryLog;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Relationship keys of [`Task`], in slot order.
pub const TASK_KEYS: [&str; 2] = ["users", "tags"];

/// Sample entry: a task assigned to users and labelled with tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identity and timestamps.
    #[serde(flatten)]
    pub meta: EntryMeta,
    /// Title.
    pub title: String,
    /// Assigned users (relationship slot 0).
    #[serde(default)]
    pub users: Vec<String>,
    /// Tags (relationship slot 1).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    /// Creates an unassigned, untagged task.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Adds an assigned user.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.users.push(user.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

impl Entry for Task {
    fn id(&self) -> &str {
        &self.meta.id
    }

    fn set_id(&mut self, id: String) {
        self.meta.id = id;
    }

    fn created_at(&self) -> i64 {
        self.meta.created_at
    }

    fn set_created_at(&mut self, at: i64) {
        self.meta.created_at = at;
    }

    fn updated_at(&self) -> i64 {
        self.meta.updated_at
    }

    fn set_updated_at(&mut self, at: i64) {
        self.meta.updated_at = at;
    }

    fn relationships(&self) -> Relationships {
        Relationships::new()
            .slot(self.users.iter().cloned())
            .slot(self.tags.iter().cloned())
    }
}

/// Configuration with the [`Task`] relationship keys.
pub fn task_config() -> Config {
    Config::new().relationships(TASK_KEYS).sync_on_commit(false)
}

enum Backing {
    Memory(MemoryLog),
    Dir(TempDir),
}

/// A [`Task`] store with automatic cleanup.
///
/// Dereferences to the underlying [`Store`].
pub struct TestStore {
    /// The store instance.
    pub store: Store<Task>,
    config: Config,
    ledger: Option<Arc<dyn Ledger>>,
    backing: Backing,
}

impl TestStore {
    /// Creates an in-memory store with [`task_config`].
    pub fn memory() -> Self {
        Self::memory_with(task_config(), None)
    }

    /// Creates an in-memory store with a custom configuration and ledger.
    pub fn memory_with(config: Config, ledger: Option<Arc<dyn Ledger>>) -> Self {
        let log = MemoryLog::new();
        let store = Store::open_with_backend(config.clone(), Box::new(log.clone()), JsonCodec, ledger.clone())
            .expect("Failed to open in-memory store");
        Self {
            store,
            config,
            ledger,
            backing: Backing::Memory(log),
        }
    }

    /// Creates a store in a temporary directory.
    pub fn dir() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = Store::open(temp_dir.path(), task_config()).expect("Failed to open directory store");
        Self {
            store,
            config: task_config(),
            ledger: None,
            backing: Backing::Dir(temp_dir),
        }
    }

    /// Returns the store directory, if directory-backed.
    pub fn path(&self) -> Option<PathBuf> {
        match &self.backing {
            Backing::Dir(dir) => Some(dir.path().to_path_buf()),
            Backing::Memory(_) => None,
        }
    }

    /// Closes the store and opens it again over the same data.
    pub fn reopen(self) -> Self {
        let Self {
            store,
            config,
            ledger,
            backing,
        } = self;
        store.close().expect("Failed to close store");
        drop(store);
        let store = match &backing {
            Backing::Memory(log) => {
                Store::open_with_backend(config.clone(), Box::new(log.clone()), JsonCodec, ledger.clone())
            }
            Backing::Dir(dir) => Store::open(dir.path(), config.clone()),
        }
        .expect("Failed to reopen store");
        Self {
            store,
            config,
            ledger,
            backing,
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store<Task>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Runs a test with a temporary in-memory [`Task`] store.
pub fn with_temp_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store<Task>) -> R,
{
    let store = TestStore::memory();
    f(&store)
}

/// Runs a test with a [`Task`] store in a temporary directory.
pub fn with_temp_dir_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store<Task>, &Path) -> R,
{
    let store = TestStore::dir();
    let path = store.path().expect("directory store has a path");
    f(&store, &path)
}
