use super::key_bucket;
use super::span::{span_cursor, Span, SpanRule};
use crate::error::CoreResult;
use reldb_storage::{Bucket, View};
use std::sync::Arc;

struct ExceptRule {
    excluded: String,
    designated: Option<Arc<Bucket>>,
}

impl SpanRule for ExceptRule {
    fn bucket_eligible(&self, relationship_id: &str) -> bool {
        relationship_id != self.excluded
    }

    fn entry_eligible(&self, entry_id: &[u8]) -> bool {
        !self
            .designated
            .as_ref()
            .is_some_and(|bucket| bucket.contains_key(entry_id))
    }
}

/// Walks the entries indexed under a key but not under one designated
/// relationship ID.
///
/// Entries with no relationship under the key at all are not visited.
pub struct InverseMatchCursor {
    span: Span<ExceptRule>,
}

impl InverseMatchCursor {
    /// Opens a cursor over every bucket of `key` except `relationship_id`.
    pub fn new<V: View>(view: &V, key: &str, relationship_id: &str) -> CoreResult<Self> {
        let bucket = key_bucket(view, key)?;
        let rule = ExceptRule {
            excluded: relationship_id.to_string(),
            designated: bucket.bucket(relationship_id.as_bytes()).cloned(),
        };
        Ok(Self {
            span: Span::new(bucket, rule),
        })
    }
}

span_cursor!(InverseMatchCursor);
