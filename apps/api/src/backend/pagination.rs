use serde::{Deserialize, Serialize};

use crate::config::MAX_PAGE_SIZE;

/// Raw `?page=&page_size=` query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

/// A resolved, 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn from_params(params: &PageParams, default_page_size: u32) -> Self {
        Self::new(
            params.page.unwrap_or(1),
            params.page_size.unwrap_or(default_page_size),
        )
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    /// True whenever the page came back full. A full last page over-reports;
    /// a short page never claims more.
    pub has_next_page: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
}

impl<T> Paginated<T> {
    /// Wraps one page fetched with `offset()`/`limit()`.
    pub fn from_page(items: Vec<T>, page: &PageRequest) -> Self {
        let has_next_page = items.len() == page.page_size as usize;
        Self {
            items,
            page: page.page,
            page_size: page.page_size,
            has_next_page,
            total: None,
        }
    }

    /// Pages an already-filtered in-memory list and reports the filtered total.
    pub fn from_slice(all: Vec<T>, page: &PageRequest) -> Self {
        let total = all.len();
        let items: Vec<T> = all
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect();
        Self {
            total: Some(total),
            ..Self::from_page(items, page)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_is_zero_based_from_one_based_page() {
        let p = PageRequest::new(3, 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(p.limit(), 10);
    }

    #[test]
    fn test_page_zero_and_oversized_are_clamped() {
        let p = PageRequest::new(0, 10_000);
        assert_eq!(p.page, 1);
        assert_eq!(p.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_short_page_reports_no_next_page() {
        let p = PageRequest::new(1, 10);
        let page = Paginated::from_page(vec![1, 2, 3], &p);
        assert!(!page.has_next_page);
    }

    #[test]
    fn test_full_page_reports_next_page() {
        let p = PageRequest::new(2, 3);
        let page = Paginated::from_page(vec![4, 5, 6], &p);
        assert!(page.has_next_page);
    }

    #[test]
    fn test_from_slice_pages_and_counts() {
        let p = PageRequest::new(2, 2);
        let page = Paginated::from_slice(vec!['a', 'b', 'c', 'd', 'e'], &p);
        assert_eq!(page.items, vec!['c', 'd']);
        assert_eq!(page.total, Some(5));
        assert!(page.has_next_page);

        let last = Paginated::from_slice(vec!['a', 'b', 'c', 'd', 'e'], &PageRequest::new(3, 2));
        assert_eq!(last.items, vec!['e']);
        assert!(!last.has_next_page);
    }

    #[test]
    fn test_defaults_applied_from_params() {
        let p = PageRequest::from_params(&PageParams::default(), 12);
        assert_eq!(p, PageRequest::new(1, 12));
    }
}
