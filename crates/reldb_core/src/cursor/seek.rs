//! Resumable cursor positions.

use std::fmt;
use std::str::FromStr;

/// Separator between the relationship ID and entry ID of a [`SeekToken`].
pub const SEEK_SEPARATOR: &str = "::";

/// A cursor position: the relationship bucket (if any) and the entry ID.
///
/// Rendered as `relationship_id::entry_id`, or just `entry_id` when the
/// position is not tied to a relationship bucket. Parsing splits on the
/// last separator; entry IDs are decimal digits, so a relationship ID may
/// itself contain `::`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SeekToken {
    /// Relationship bucket, empty for a bare entry position.
    pub relationship_id: String,
    /// Entry ID.
    pub id: String,
}

impl SeekToken {
    /// Creates a token.
    pub fn new(relationship_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            relationship_id: relationship_id.into(),
            id: id.into(),
        }
    }

    /// Creates a token for a bare entry ID.
    pub fn entry(id: impl Into<String>) -> Self {
        Self::new(String::new(), id)
    }

    /// Parses a rendered token. Never fails: text without a separator is a
    /// bare entry ID.
    #[must_use]
    pub fn parse(token: &str) -> Self {
        match token.rfind(SEEK_SEPARATOR) {
            Some(at) => Self::new(&token[..at], &token[at + SEEK_SEPARATOR.len()..]),
            None => Self::entry(token),
        }
    }
}

impl fmt::Display for SeekToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.relationship_id.is_empty() {
            f.write_str(&self.id)
        } else {
            write!(f, "{}{SEEK_SEPARATOR}{}", self.relationship_id, self.id)
        }
    }
}

impl FromStr for SeekToken {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
