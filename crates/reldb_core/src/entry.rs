//! Entry identity, timestamps and relationship slots.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A record type stored by a [`Store`](crate::Store).
///
/// The store only looks at the identity, the timestamps and the
/// relationships; everything else is opaque and goes through the codec.
///
/// Most implementations embed an [`EntryMeta`] with `#[serde(flatten)]`
/// and forward to it:
///
/// ```rust
/// use reldb_core::{Entry, EntryMeta, Relationships};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Default, Serialize, Deserialize)]
/// struct Post {
///     #[serde(flatten)]
///     meta: EntryMeta,
///     author: String,
///     tags: Vec<String>,
/// }
///
/// impl Entry for Post {
///     fn id(&self) -> &str { &self.meta.id }
///     fn set_id(&mut self, id: String) { self.meta.id = id }
///     fn created_at(&self) -> i64 { self.meta.created_at }
///     fn set_created_at(&mut self, at: i64) { self.meta.created_at = at }
///     fn updated_at(&self) -> i64 { self.meta.updated_at }
///     fn set_updated_at(&mut self, at: i64) { self.meta.updated_at = at }
///     fn relationships(&self) -> Relationships {
///         Relationships::new().slot([self.author.clone()]).slot(self.tags.clone())
///     }
/// }
/// ```
pub trait Entry: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Returns the entry ID, empty until the entry is stored.
    fn id(&self) -> &str;

    /// Sets the entry ID.
    fn set_id(&mut self, id: String);

    /// Returns the creation time in Unix seconds.
    fn created_at(&self) -> i64;

    /// Sets the creation time.
    fn set_created_at(&mut self, at: i64);

    /// Returns the last update time in Unix seconds.
    fn updated_at(&self) -> i64;

    /// Sets the last update time.
    fn set_updated_at(&mut self, at: i64);

    /// Returns the relationship IDs of this entry, one slot per configured key.
    fn relationships(&self) -> Relationships;
}

/// Identity and timestamps shared by most entry types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Entry ID.
    #[serde(default)]
    pub id: String,
    /// Creation time in Unix seconds.
    #[serde(default, rename = "createdAt")]
    pub created_at: i64,
    /// Last update time in Unix seconds.
    #[serde(default, rename = "updatedAt")]
    pub updated_at: i64,
}

/// Relationship IDs of one entry, positionally aligned with the configured keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationships(Vec<Vec<String>>);

impl Relationships {
    /// Creates an empty set with no slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slot holding `ids`.
    #[must_use]
    pub fn slot<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.push(ids);
        self
    }

    /// Appends a slot holding `ids`.
    pub fn push<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.push(ids.into_iter().map(Into::into).collect());
    }

    /// Returns the number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the IDs in slot `index`; missing slots are empty.
    #[must_use]
    pub fn get(&self, index: usize) -> &[String] {
        self.0.get(index).map_or(&[][..], Vec::as_slice)
    }

    /// Iterates over the slots.
    pub fn iter(&self) -> impl Iterator<Item = &[String]> {
        self.0.iter().map(Vec::as_slice)
    }
}

impl From<Vec<Vec<String>>> for Relationships {
    fn from(slots: Vec<Vec<String>>) -> Self {
        Self(slots)
    }
}

/// Formats a counter value as a zero-padded entry ID.
#[must_use]
pub fn format_id(index: u64, width: usize) -> String {
    format!("{index:0width$}")
}

/// Parses an entry ID produced by [`format_id`].
#[must_use]
pub fn parse_id(id: &str) -> Option<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

/// Returns the current time in Unix seconds.
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
