use super::walk::Walk;
use super::{key_bucket, FilterCursor};
use crate::error::CoreResult;
use reldb_storage::View;

/// Walks the entries indexed under one relationship ID.
#[derive(Debug)]
pub struct MatchCursor {
    relationship_id: String,
    walk: Walk,
}

impl MatchCursor {
    /// Opens a cursor over `relationships/<key>/<relationship_id>`.
    ///
    /// An ID nothing is related to yields an empty cursor; an unknown key
    /// is an error.
    pub fn new<V: View>(view: &V, key: &str, relationship_id: &str) -> CoreResult<Self> {
        let bucket = key_bucket(view, key)?;
        let ids = bucket.bucket(relationship_id.as_bytes()).cloned();
        Ok(Self {
            relationship_id: relationship_id.to_string(),
            walk: Walk::new(ids),
        })
    }
}

impl FilterCursor for MatchCursor {
    fn seek_forward(&mut self, _relationship_id: &str, id: &str) -> CoreResult<String> {
        self.walk.seek_forward(id)
    }

    fn seek_reverse(&mut self, _relationship_id: &str, id: &str) -> CoreResult<String> {
        self.walk.seek_reverse(id)
    }

    fn first(&mut self) -> CoreResult<String> {
        self.walk.first()
    }

    fn last(&mut self) -> CoreResult<String> {
        self.walk.last()
    }

    fn next(&mut self) -> CoreResult<String> {
        self.walk.next()
    }

    fn prev(&mut self) -> CoreResult<String> {
        self.walk.prev()
    }

    fn has_forward(&self, id: &str) -> CoreResult<bool> {
        Ok(self.walk.contains(id))
    }

    fn has_reverse(&self, id: &str) -> CoreResult<bool> {
        Ok(self.walk.contains(id))
    }

    fn relationship_id(&self) -> Option<&str> {
        Some(&self.relationship_id)
    }
}
