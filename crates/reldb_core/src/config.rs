//! Store configuration.

use crate::error::{CoreError, CoreResult};
use std::collections::HashSet;
use std::time::Duration;

/// Configuration for opening a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered relationship keys. Slot `i` of every entry's relationships
    /// belongs to key `i`.
    pub relationships: Vec<String>,

    /// Whether to create the store directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the commit log on every commit (safer but slower).
    pub sync_on_commit: bool,

    /// Number of queued batch calls that forces an immediate flush.
    pub max_batch_calls: usize,

    /// Longest a batch call waits before its batch is flushed.
    pub max_batch_duration: Duration,

    /// Replay the successful calls of a failed batch instead of failing them
    /// with [`CoreError::BatchGroupFailed`].
    pub retry_batch_fail: bool,

    /// Open as a read-only replica that only follows its ledger.
    pub mirror: bool,

    /// Width that record IDs are zero-padded to.
    pub id_width: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relationships: Vec::new(),
            create_if_missing: true,
            sync_on_commit: true,
            max_batch_calls: 1000,
            max_batch_duration: Duration::from_millis(10),
            retry_batch_fail: false,
            mirror: false,
            id_width: 12,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the relationship keys.
    #[must_use]
    pub fn relationships<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationships = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets whether to create the store if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the commit log on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets the batch size that triggers a flush.
    #[must_use]
    pub const fn max_batch_calls(mut self, calls: usize) -> Self {
        self.max_batch_calls = calls;
        self
    }

    /// Sets the batch latency bound.
    #[must_use]
    pub const fn max_batch_duration(mut self, duration: Duration) -> Self {
        self.max_batch_duration = duration;
        self
    }

    /// Sets whether a failed batch replays its successful calls.
    #[must_use]
    pub const fn retry_batch_fail(mut self, value: bool) -> Self {
        self.retry_batch_fail = value;
        self
    }

    /// Sets mirror (read-only replica) mode.
    #[must_use]
    pub const fn mirror(mut self, value: bool) -> Self {
        self.mirror = value;
        self
    }

    /// Sets the zero-padding width of record IDs.
    #[must_use]
    pub const fn id_width(mut self, width: usize) -> Self {
        self.id_width = width;
        self
    }

    /// Checks the configuration for values the store cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        let mut seen = HashSet::new();
        for key in &self.relationships {
            if key.is_empty() {
                return Err(CoreError::invalid_operation("relationship key must not be empty"));
            }
            if !seen.insert(key.as_str()) {
                return Err(CoreError::invalid_operation(format!(
                    "duplicate relationship key: {key}"
                )));
            }
        }
        if self.max_batch_calls == 0 {
            return Err(CoreError::invalid_operation("max_batch_calls must be at least 1"));
        }
        if self.id_width == 0 {
            return Err(CoreError::invalid_operation("id_width must be at least 1"));
        }
        Ok(())
    }
}
