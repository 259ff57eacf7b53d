use serde::Serialize;

pub const MAX_PAGE_SIZE: usize = 200;

/// Offset-based page selection. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, limit: Option<usize>, default_limit: usize) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip, saturating for pages far past the end.
    pub fn offset(&self) -> i64 {
        let skip = (self.page - 1).saturating_mul(self.limit);
        i64::try_from(skip).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub pages: usize,
}

impl Pagination {
    pub fn new(request: PageRequest, total: usize) -> Self {
        Pagination {
            page: request.page,
            limit: request.limit,
            total,
            pages: total.div_ceil(request.limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_clamping() {
        assert_eq!(
            PageRequest::new(None, None, 20),
            PageRequest { page: 1, limit: 20 }
        );
        assert_eq!(
            PageRequest::new(Some(0), Some(0), 20),
            PageRequest { page: 1, limit: 1 }
        );
        assert_eq!(PageRequest::new(Some(3), Some(10_000), 20).limit, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset_and_page_count() {
        let request = PageRequest::new(Some(2), Some(20), 20);
        assert_eq!(request.offset(), 20);
        assert_eq!(Pagination::new(request, 45).pages, 3);
        assert_eq!(Pagination::new(request, 40).pages, 2);
        assert_eq!(Pagination::new(request, 0).pages, 0);
    }

    #[test]
    fn test_offset_saturates_for_huge_pages() {
        let request = PageRequest::new(Some(usize::MAX / 2), Some(20), 20);
        assert_eq!(request.offset(), i64::MAX);
        assert_eq!(PageRequest::new(Some(usize::MAX), Some(200), 20).offset(), i64::MAX);
    }
}
