//! Pagination for roster listings

/// Default rows per page when the request does not specify one
pub const DEFAULT_PAGE_SIZE: i64 = 100;

/// Hard ceiling on rows per page
pub const MAX_PAGE_SIZE: i64 = 500;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    /// Current page number (1-indexed), clamped into range
    pub page: i64,
    /// Effective rows per page
    pub page_size: i64,
    /// Total number of pages
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET
    pub offset: i64,
}

/// Calculate pagination from total results, requested page and page size.
///
/// Out-of-range pages are clamped into `[1, total_pages]`; the page size
/// is clamped into `[1, MAX_PAGE_SIZE]`.
pub fn paginate(total_results: i64, requested_page: i64, requested_size: Option<i64>) -> Pagination {
    let page_size = requested_size
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE);
    let total_pages = (total_results + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        page_size,
        total_pages,
        offset,
    }
}
