//! Pagination helpers for admin list endpoints.

use serde::{Deserialize, Serialize};

/// Raw page parameters as supplied by a caller (`?page=&per_page=`).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
}

impl PageRequest {
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Normalise the request: page index starts at 1, a zero page size falls
    /// back to `default_size`, and any size is capped at `max_size`.
    pub fn clamp(self, default_size: u32, max_size: u32) -> Self {
        let page = self.page.max(1);
        let per_page = if self.per_page == 0 {
            default_size
        } else {
            self.per_page
        };
        Self {
            page,
            per_page: per_page.clamp(1, max_size.max(1)),
        }
    }

    /// SQL `LIMIT` for this page.
    pub const fn limit(&self) -> u32 {
        self.per_page
    }

    /// SQL `OFFSET` for this page. Assumes the request has been clamped.
    pub const fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_page_becomes_first_page() {
        let req = PageRequest::new(0, 10).clamp(20, 100);
        assert_eq!(req.page, 1);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn missing_page_size_uses_default() {
        let req = PageRequest::new(2, 0).clamp(20, 100);
        assert_eq!(req.per_page, 20);
        assert_eq!(req.offset(), 20);
    }

    #[test]
    fn oversized_page_is_capped() {
        let req = PageRequest::new(3, 10_000).clamp(20, 100);
        assert_eq!(req.limit(), 100);
        assert_eq!(req.offset(), 200);
    }
}
