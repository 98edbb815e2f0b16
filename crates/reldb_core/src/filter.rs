//! Relationship filters.

use std::fmt;
use std::sync::Arc;

/// Predicate over relationship IDs used by [`Filter::Comparison`].
pub type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// A restriction on one relationship key.
///
/// A list of filters is a conjunction. The first filter drives iteration
/// order; the rest only prune.
#[derive(Clone)]
pub enum Filter {
    /// Entries indexed under `id` for `key`.
    Match {
        /// Relationship key.
        key: String,
        /// Relationship ID.
        id: String,
    },
    /// Entries indexed under `key`, but not under `id`.
    InverseMatch {
        /// Relationship key.
        key: String,
        /// Excluded relationship ID.
        id: String,
    },
    /// Entries indexed under any relationship ID of `key` that lies within
    /// `[range_start, range_end]` and satisfies `predicate`.
    ///
    /// Both bounds are inclusive; an empty bound is unconstrained.
    Comparison {
        /// Relationship key.
        key: String,
        /// Lowest relationship ID considered.
        range_start: String,
        /// Highest relationship ID considered.
        range_end: String,
        /// Test applied to each relationship ID.
        predicate: Predicate,
    },
}

impl Filter {
    /// Matches entries related to `id` under `key`.
    pub fn matching(key: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Match {
            key: key.into(),
            id: id.into(),
        }
    }

    /// Matches entries related to anything but `id` under `key`.
    pub fn inverse(key: impl Into<String>, id: impl Into<String>) -> Self {
        Self::InverseMatch {
            key: key.into(),
            id: id.into(),
        }
    }

    /// Matches entries related to any ID under `key` that passes `predicate`.
    pub fn comparison<F>(key: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Comparison {
            key: key.into(),
            range_start: String::new(),
            range_end: String::new(),
            predicate: Arc::new(predicate),
        }
    }

    /// Matches entries related to any ID under `key` within the inclusive
    /// range, further narrowed by `predicate`.
    pub fn range<F>(
        key: impl Into<String>,
        range_start: impl Into<String>,
        range_end: impl Into<String>,
        predicate: F,
    ) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Comparison {
            key: key.into(),
            range_start: range_start.into(),
            range_end: range_end.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Returns the relationship key this filter applies to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Match { key, .. } | Self::InverseMatch { key, .. } | Self::Comparison { key, .. } => key,
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match { key, id } => f.debug_struct("Match").field("key", key).field("id", id).finish(),
            Self::InverseMatch { key, id } => f
                .debug_struct("InverseMatch")
                .field("key", key)
                .field("id", id)
                .finish(),
            Self::Comparison {
                key,
                range_start,
                range_end,
                ..
            } => f
                .debug_struct("Comparison")
                .field("key", key)
                .field("range_start", range_start)
                .field("range_end", range_end)
                .finish_non_exhaustive(),
        }
    }
}
