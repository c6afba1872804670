//! Fixed-size paging over a large in-memory item list.
//!
//! All operations are synchronous. Navigation outside the valid range is a
//! no-op rather than an error.

use std::ops::Range;

/// Default number of items per page.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Lifecycle of a [`Paginator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PaginationState {
    /// No items have been supplied yet.
    #[default]
    Idle,
    /// Items are loaded and a page is selected.
    Loaded,
}

/// Snapshot of the paging position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    /// Zero-based current page.
    pub current_page: usize,
    /// Items per page.
    pub page_size: usize,
    /// Number of pages; at least 1.
    pub total_pages: usize,
    /// Number of items in the backing list.
    pub total_items: usize,
}

impl PageWindow {
    /// Returns true if a later page exists.
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.current_page + 1 < self.total_pages
    }

    /// Returns true if an earlier page exists.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.current_page > 0
    }

    /// Item index range covered by the current page.
    #[must_use]
    pub fn range(&self) -> Range<usize> {
        let start = (self.current_page * self.page_size).min(self.total_items);
        let end = (start + self.page_size).min(self.total_items);
        start..end
    }
}

/// Owns the full item list and exposes one page at a time.
#[derive(Debug, Clone)]
pub struct Paginator<T> {
    items: Vec<T>,
    page_size: usize,
    current_page: usize,
    state: PaginationState,
}

impl<T> Default for Paginator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Paginator<T> {
    /// Creates an idle paginator with the default page size.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items: Vec::new(),
            page_size: DEFAULT_PAGE_SIZE,
            current_page: 0,
            state: PaginationState::Idle,
        }
    }

    /// Loads `items` and resets to the first page. A zero size is treated as 1.
    pub fn initialize(&mut self, items: Vec<T>, page_size: usize) {
        self.items = items;
        self.page_size = page_size.max(1);
        self.current_page = 0;
        self.state = PaginationState::Loaded;
    }

    /// Replaces the backing list wholesale, keeping the page when still valid.
    pub fn replace_items(&mut self, items: Vec<T>) {
        self.items = items;
        self.current_page = self.current_page.min(self.total_pages() - 1);
        self.state = PaginationState::Loaded;
    }

    /// Moves to the next page. Returns false at the last page.
    pub fn next_page(&mut self) -> bool {
        if !self.has_next() {
            return false;
        }
        self.current_page += 1;
        true
    }

    /// Moves to the previous page. Returns false at the first page.
    pub fn previous_page(&mut self) -> bool {
        if !self.has_previous() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    /// Jumps to `page`. Out-of-range pages leave the state unchanged.
    pub fn go_to_page(&mut self, page: usize) -> bool {
        if page >= self.total_pages() {
            return false;
        }
        self.current_page = page;
        true
    }

    /// Changes the page size, keeping the first visible item on screen.
    pub fn set_page_size(&mut self, page_size: usize) {
        let page_size = page_size.max(1);
        let offset = self.current_page * self.page_size;
        self.page_size = page_size;
        self.current_page = (offset / page_size).min(self.total_pages() - 1);
    }

    /// Items on the current page.
    #[must_use]
    pub fn current_items(&self) -> &[T] {
        &self.items[self.page_range()]
    }

    /// Index range of the current page within the full list.
    #[must_use]
    pub fn page_range(&self) -> Range<usize> {
        self.window().range()
    }

    /// Snapshot of the current position.
    #[must_use]
    pub fn window(&self) -> PageWindow {
        PageWindow {
            current_page: self.current_page,
            page_size: self.page_size,
            total_pages: self.total_pages(),
            total_items: self.items.len(),
        }
    }

    /// Number of pages; 1 for an empty list.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        self.items.len().div_ceil(self.page_size).max(1)
    }

    /// Page containing the item at `index`, if it exists.
    #[must_use]
    pub fn page_of(&self, index: usize) -> Option<usize> {
        (index < self.items.len()).then(|| index / self.page_size)
    }

    /// Returns true if a later page exists.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.window().has_next()
    }

    /// Returns true if an earlier page exists.
    #[must_use]
    pub const fn has_previous(&self) -> bool {
        self.current_page > 0
    }

    /// Zero-based current page.
    #[must_use]
    pub const fn current_page(&self) -> usize {
        self.current_page
    }

    /// Items per page.
    #[must_use]
    pub const fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of items across all pages.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PaginationState {
        self.state
    }
}
