use super::{new_filter_cursor, FilterCursor};
use crate::error::{CoreError, CoreResult};
use crate::filter::Filter;
use reldb_storage::View;

/// Intersects several filters.
///
/// The first filter is the primary: it drives movement and fixes the order.
/// The others are only asked whether they contain each candidate.
pub struct MultiCursor {
    primary: Box<dyn FilterCursor>,
    secondaries: Vec<Box<dyn FilterCursor>>,
}

impl MultiCursor {
    /// Builds the intersection of `filters`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFilters`] if `filters` is empty.
    pub fn new<V: View>(view: &V, filters: &[Filter]) -> CoreResult<Self> {
        let (first, rest) = filters
            .split_first()
            .ok_or_else(|| CoreError::invalid_filters("at least one filter is required"))?;
        Ok(Self {
            primary: new_filter_cursor(view, Some(first))?,
            secondaries: rest
                .iter()
                .map(|filter| new_filter_cursor(view, Some(filter)))
                .collect::<CoreResult<_>>()?,
        })
    }

    fn passes(&self, id: &str, forward: bool) -> CoreResult<bool> {
        for secondary in &self.secondaries {
            let has = if forward {
                secondary.has_forward(id)?
            } else {
                secondary.has_reverse(id)?
            };
            if !has {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn forward(&mut self, mut found: CoreResult<String>) -> CoreResult<String> {
        loop {
            let id = found?;
            if self.passes(&id, true)? {
                return Ok(id);
            }
            found = self.primary.next();
        }
    }

    fn backward(&mut self, mut found: CoreResult<String>) -> CoreResult<String> {
        loop {
            let id = found?;
            if self.passes(&id, false)? {
                return Ok(id);
            }
            found = self.primary.prev();
        }
    }
}

impl FilterCursor for MultiCursor {
    fn seek_forward(&mut self, relationship_id: &str, id: &str) -> CoreResult<String> {
        let found = self.primary.seek_forward(relationship_id, id);
        self.forward(found)
    }

    fn seek_reverse(&mut self, relationship_id: &str, id: &str) -> CoreResult<String> {
        let found = self.primary.seek_reverse(relationship_id, id);
        self.backward(found)
    }

    fn first(&mut self) -> CoreResult<String> {
        let found = self.primary.first();
        self.forward(found)
    }

    fn last(&mut self) -> CoreResult<String> {
        let found = self.primary.last();
        self.backward(found)
    }

    fn next(&mut self) -> CoreResult<String> {
        let found = self.primary.next();
        self.forward(found)
    }

    fn prev(&mut self) -> CoreResult<String> {
        let found = self.primary.prev();
        self.backward(found)
    }

    fn has_forward(&self, id: &str) -> CoreResult<bool> {
        Ok(self.primary.has_forward(id)? && self.passes(id, true)?)
    }

    fn has_reverse(&self, id: &str) -> CoreResult<bool> {
        Ok(self.primary.has_reverse(id)? && self.passes(id, false)?)
    }

    fn relationship_id(&self) -> Option<&str> {
        self.primary.relationship_id()
    }
}
