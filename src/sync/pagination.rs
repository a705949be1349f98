//! Pagination, sort and filter state machine for one browsable category
//!
//! The cursor decides when a fetch is allowed, whether its results replace
//! or append, and when the end of the data has been reached. Changing sort
//! or filter always falls back to `Empty` with offset zero, so result lists
//! never mix orderings.

use crate::model::SortKey;

/// Fetch state of one category listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PageState {
    #[default]
    Empty,
    LoadingFirst,
    Idle,
    LoadingNext,
    Failed,
}

/// Offset/sort/filter triple plus fetch state for one category.
#[derive(Clone, Debug)]
pub struct PageCursor {
    pub offset: usize,
    pub page_size: usize,
    pub has_more: bool,
    pub sort: SortKey,
    pub filter: Option<String>,
    pub state: PageState,
}

impl PageCursor {
    pub fn new(page_size: usize) -> Self {
        Self {
            offset: 0,
            page_size,
            has_more: false,
            sort: SortKey::default(),
            filter: None,
            state: PageState::Empty,
        }
    }

    /// Discard accumulated progress and adopt a new sort key. Valid from any
    /// state.
    pub fn select_sort(&mut self, sort: SortKey) {
        self.sort = sort;
        self.reset();
    }

    /// Discard accumulated progress and adopt a new filter. Valid from any
    /// state.
    pub fn select_filter(&mut self, filter: Option<String>) {
        self.filter = filter;
        self.reset();
    }

    fn reset(&mut self) {
        self.offset = 0;
        self.has_more = false;
        self.state = PageState::Empty;
    }

    /// Move into `LoadingFirst`. Always allowed; a first-page fetch replaces
    /// whatever was loaded before.
    pub fn begin_first_page(&mut self) {
        self.offset = 0;
        self.state = PageState::LoadingFirst;
    }

    /// Try to move into `LoadingNext`. Only valid from `Idle` with more data
    /// available; duplicate calls while a page is already loading are no-ops.
    pub fn begin_next_page(&mut self) -> bool {
        if self.state == PageState::Idle && self.has_more {
            self.state = PageState::LoadingNext;
            true
        } else {
            false
        }
    }

    /// Record a fetched page. Returns true when the results replace the
    /// accumulated list (offset zero) rather than appending to it. A short
    /// page signals the end of the data.
    pub fn complete_page(&mut self, returned: usize) -> bool {
        let replace = self.offset == 0;
        self.has_more = returned == self.page_size;
        self.offset += returned;
        self.state = PageState::Idle;
        replace
    }

    pub fn fail_page(&mut self) {
        self.state = PageState::Failed;
    }

    /// Cache key for the page this cursor would fetch next.
    pub fn cache_key(&self, category: &str) -> String {
        format!(
            "{category}:{}:{}:{}",
            self.sort.as_str(),
            self.filter.as_deref().unwrap_or(""),
            self.offset
        )
    }
}
