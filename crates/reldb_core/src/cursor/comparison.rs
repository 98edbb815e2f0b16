use super::key_bucket;
use super::span::{span_cursor, Span, SpanRule};
use crate::error::CoreResult;
use crate::filter::Predicate;
use reldb_storage::View;

struct CompareRule {
    start: String,
    end: String,
    predicate: Predicate,
}

impl SpanRule for CompareRule {
    fn lower(&self) -> Option<&[u8]> {
        (!self.start.is_empty()).then(|| self.start.as_bytes())
    }

    fn upper(&self) -> Option<&[u8]> {
        (!self.end.is_empty()).then(|| self.end.as_bytes())
    }

    fn bucket_eligible(&self, relationship_id: &str) -> bool {
        (self.predicate)(relationship_id)
    }
}

/// Walks the entries of every relationship bucket under a key whose ID
/// lies in an inclusive range and passes a predicate.
pub struct ComparisonCursor {
    span: Span<CompareRule>,
}

impl ComparisonCursor {
    /// Opens a cursor over the buckets of `key` in `[range_start, range_end]`
    /// accepted by `predicate`. Empty bounds are unconstrained.
    pub fn new<V: View>(
        view: &V,
        key: &str,
        range_start: &str,
        range_end: &str,
        predicate: Predicate,
    ) -> CoreResult<Self> {
        let bucket = key_bucket(view, key)?;
        let rule = CompareRule {
            start: range_start.to_string(),
            end: range_end.to_string(),
            predicate,
        };
        Ok(Self {
            span: Span::new(bucket, rule),
        })
    }
}

span_cursor!(ComparisonCursor);
