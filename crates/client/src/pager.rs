// Document Filter/Pager: path scope, tag filters and the page cursor for the
// active view.
//
// Changing the path or any filter sends the cursor back to page 1. Page and
// page size stay in memory; they are not part of the address.

use tracing::debug;

use strata_common::path::{normalize_path, PathError, ROOT_PATH};
use strata_common::protocol::rest::DocumentQuery;
use strata_common::types::{DocumentPage, FilterState};

use crate::config::clamp_page_size;

pub const FIRST_PAGE: u32 = 1;

/// Issued when a query is sent; presented when its page arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryTicket(u64);

#[derive(Debug, Clone)]
pub struct DocumentPager {
    path: String,
    filters: FilterState,
    page: u32,
    page_size: u32,
    issued: u64,
    applied: u64,
    results: Option<DocumentPage>,
}

impl DocumentPager {
    pub fn new(page_size: u32) -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            filters: FilterState::default(),
            page: FIRST_PAGE,
            page_size: clamp_page_size(page_size),
            issued: 0,
            applied: 0,
            results: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Scope the query to a new path. Returns whether anything changed.
    pub fn set_path(&mut self, path: &str) -> Result<bool, PathError> {
        let path = normalize_path(path)?;
        if path == self.path {
            return Ok(false);
        }
        self.path = path;
        self.reset_page();
        Ok(true)
    }

    /// Replace all filters. Returns whether anything changed.
    pub fn set_filters(&mut self, filters: FilterState) -> bool {
        if filters == self.filters {
            return false;
        }
        self.filters = filters;
        self.reset_page();
        true
    }

    /// Returns whether the feature is now active.
    pub fn toggle_feature(&mut self, feature: &str) -> bool {
        let active = self.filters.toggle_feature(feature);
        self.reset_page();
        active
    }

    /// Returns whether the filter is now active.
    pub fn toggle_filter(&mut self, filter: &str) -> bool {
        let active = self.filters.toggle_filter(filter);
        self.reset_page();
        active
    }

    pub fn clear_filters(&mut self) -> bool {
        self.set_filters(FilterState::default())
    }

    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(FIRST_PAGE);
    }

    /// Advance if the last result says there is another page.
    pub fn next_page(&mut self) -> bool {
        match self.total_pages() {
            Some(total) if u64::from(self.page) < total => {
                self.page += 1;
                true
            }
            _ => false,
        }
    }

    pub fn previous_page(&mut self) -> bool {
        if self.page > FIRST_PAGE {
            self.page -= 1;
            true
        } else {
            false
        }
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        let page_size = clamp_page_size(page_size);
        if page_size != self.page_size {
            self.page_size = page_size;
            self.reset_page();
        }
    }

    /// The query the current state describes.
    pub fn query(&self) -> DocumentQuery {
        DocumentQuery {
            path: self.path.clone(),
            features: self.filters.features.clone(),
            filters: self.filters.filters.clone(),
            page: self.page,
            page_size: self.page_size,
        }
    }

    pub fn begin_query(&mut self) -> (QueryTicket, DocumentQuery) {
        self.issued += 1;
        (QueryTicket(self.issued), self.query())
    }

    /// Keep a page unless a later query has already landed.
    pub fn accept(&mut self, ticket: QueryTicket, page: DocumentPage) -> bool {
        if ticket.0 < self.applied {
            debug!(ticket = ticket.0, applied = self.applied, "discarding stale document page");
            return false;
        }
        self.applied = ticket.0;
        self.results = Some(page);
        true
    }

    pub fn results(&self) -> Option<&DocumentPage> {
        self.results.as_ref()
    }

    pub fn results_mut(&mut self) -> Option<&mut DocumentPage> {
        self.results.as_mut()
    }

    pub fn total_pages(&self) -> Option<u64> {
        let total = self.results.as_ref()?.total_count;
        Some(total.div_ceil(u64::from(self.page_size)).max(1))
    }

    fn reset_page(&mut self) {
        self.page = FIRST_PAGE;
    }
}

impl Default for DocumentPager {
    fn default() -> Self {
        Self::new(50)
    }
}
