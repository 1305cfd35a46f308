use std::ops::Range;

/// Number of pages needed for `count` rows. Never less than one.
pub fn total_pages(count: usize, page_size: usize) -> usize {
    count.div_ceil(page_size.max(1)).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageState {
    /// Current page (0-indexed)
    pub page_index: usize,
    /// Rows per page, at least one
    pub page_size: usize,
}

impl PageState {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_index: 0,
            page_size: page_size.max(1),
        }
    }

    pub fn can_go_prev(&self) -> bool {
        self.page_index > 0
    }

    pub fn can_go_next(&self, total_pages: usize) -> bool {
        self.page_index < total_pages.saturating_sub(1)
    }

    pub fn first(&mut self) {
        self.page_index = 0;
    }

    pub fn previous(&mut self) {
        if self.can_go_prev() {
            self.page_index -= 1;
        }
    }

    pub fn next(&mut self, total_pages: usize) {
        if self.can_go_next(total_pages) {
            self.page_index += 1;
        }
    }

    pub fn last(&mut self, total_pages: usize) {
        self.page_index = total_pages.saturating_sub(1);
    }

    /// Pull the page index back inside `0..total_pages` after the row set shrank.
    pub fn clamp(&mut self, total_pages: usize) {
        self.page_index = self.page_index.min(total_pages.saturating_sub(1));
    }

    /// Positions of the current page within a view of `count` rows.
    pub fn visible_range(&self, count: usize) -> Range<usize> {
        let start = self.page_index.saturating_mul(self.page_size).min(count);
        let end = start.saturating_add(self.page_size).min(count);
        start..end
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub rows: Vec<usize>,
    pub total_pages: usize,
}

/// Cut the current page out of `ordered`.
///
/// The page index is not clamped here; a stale index yields an empty page.
pub fn paginate(ordered: &[usize], state: &PageState) -> Page {
    Page {
        rows: ordered[state.visible_range(ordered.len())].to_vec(),
        total_pages: total_pages(ordered.len(), state.page_size),
    }
}
