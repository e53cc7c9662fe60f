//! Paged reading of the staging table

use sdc_common::RawReading;
use std::sync::Arc;

use super::error::DrainError;
use super::store::StagingStore;

/// Walks the staging table in fixed-size pages, in insertion order.
///
/// The offset advances by the number of rows actually returned. A short or
/// empty page ends the traversal; once exhausted no further reads are issued.
pub struct PageTraversal<S: StagingStore + ?Sized> {
    store: Arc<S>,
    page_size: usize,
    offset: u64,
    pages: u64,
    exhausted: bool,
}

impl<S: StagingStore + ?Sized> PageTraversal<S> {
    pub fn new(store: Arc<S>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            offset: 0,
            pages: 0,
            exhausted: false,
        }
    }

    /// Next non-empty page, or `None` at the end of the table
    pub async fn next_page(&mut self) -> Result<Option<Vec<RawReading>>, DrainError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .store
            .fetch_page(self.offset, self.page_size)
            .await
            .map_err(|source| DrainError::Source {
                offset: self.offset,
                source,
            })?;

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        if page.is_empty() {
            return Ok(None);
        }

        self.offset += page.len() as u64;
        self.pages += 1;
        tracing::debug!(page = self.pages, rows = page.len(), offset = self.offset, "Staging page read");
        Ok(Some(page))
    }

    /// Non-empty pages returned so far
    pub fn pages(&self) -> u64 {
        self.pages
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}
