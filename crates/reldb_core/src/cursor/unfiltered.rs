use super::walk::Walk;
use super::FilterCursor;
use crate::error::{CoreError, CoreResult};
use crate::meta::ENTRIES;
use reldb_storage::View;

/// Walks every entry in ID order.
#[derive(Debug)]
pub struct UnfilteredCursor {
    walk: Walk,
}

impl UnfilteredCursor {
    /// Opens a cursor over the entry bucket.
    pub fn new<V: View>(view: &V) -> CoreResult<Self> {
        let entries = view
            .bucket(&[ENTRIES])
            .ok_or_else(|| CoreError::not_initialized(ENTRIES))?;
        Ok(Self {
            walk: Walk::new(Some(entries)),
        })
    }
}

impl FilterCursor for UnfilteredCursor {
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
        None
    }
}
