//! Offset pagination for data tables.

use serde::{Deserialize, Serialize};

/// A validated page request.
///
/// Pages are 1-based. Out-of-range inputs are clamped rather than rejected
/// so hand-edited query strings still render something sensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    page: u32,
    per_page: u32,
}

impl PageRequest {
    /// Rows per page when the request does not say.
    pub const DEFAULT_PER_PAGE: u32 = 20;
    /// Largest page size a client may ask for.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Build a request from optional query parameters.
    #[must_use]
    pub fn new(page: Option<u32>, per_page: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE),
        }
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Rows per page.
    #[must_use]
    pub const fn per_page(&self) -> u32 {
        self.per_page
    }

    /// SQL `LIMIT`.
    #[must_use]
    pub fn limit(&self) -> i64 {
        i64::from(self.per_page)
    }

    /// SQL `OFFSET`.
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows on this page.
    pub items: Vec<T>,
    /// Total rows matching the filters.
    pub total: i64,
    /// The request that produced this page.
    pub request: PageRequest,
}

impl<T> Page<T> {
    /// Assemble a page.
    #[must_use]
    pub const fn new(items: Vec<T>, total: i64, request: PageRequest) -> Self {
        Self {
            items,
            total,
            request,
        }
    }

    /// Current page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.request.page()
    }

    /// Number of pages (at least 1, so empty tables still show "page 1 of 1").
    #[must_use]
    pub fn page_count(&self) -> u32 {
        let per_page = i64::from(self.request.per_page());
        let pages = (self.total.max(0) + per_page - 1) / per_page;
        u32::try_from(pages.max(1)).unwrap_or(u32::MAX)
    }

    /// Whether a previous page exists.
    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.request.page() > 1
    }

    /// Whether a next page exists.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.request.page() < self.page_count()
    }

    /// 1-based index of the first row on this page (0 when empty).
    #[must_use]
    pub fn first_row(&self) -> i64 {
        if self.items.is_empty() {
            0
        } else {
            self.request.offset() + 1
        }
    }

    /// 1-based index of the last row on this page.
    #[must_use]
    pub fn last_row(&self) -> i64 {
        self.request.offset() + i64::try_from(self.items.len()).unwrap_or(0)
    }

    /// Transform the rows, keeping the paging metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            request: self.request,
        }
    }
}
