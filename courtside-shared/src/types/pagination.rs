use serde::{Deserialize, Serialize};

/// `?page=&limit=` query parameters. Pages are 1-based.
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 { 1 }
fn default_limit() -> u64 { 20 }

impl PaginationParams {
    pub fn new(page: u64, limit: u64) -> Self {
        Self { page: page.max(1), limit }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) - 1) * self.limit()
    }

    pub fn limit(&self) -> u64 {
        self.limit.clamp(1, 100)
    }
}

impl Default for PaginationParams {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageMeta {
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl PageMeta {
    pub fn new(total: u64, params: &PaginationParams) -> Self {
        let limit = params.limit();
        Self {
            total,
            page: params.page.max(1),
            limit,
            total_pages: total.div_ceil(limit),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Paginated<T: Serialize> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, params: &PaginationParams) -> Self {
        Self {
            items,
            meta: PageMeta::new(total, params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_follows_page() {
        let p = PaginationParams::new(3, 10);
        assert_eq!(p.offset(), 20);
        assert_eq!(PaginationParams::new(0, 10).offset(), 0);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PaginationParams::new(1, 500).limit(), 100);
        assert_eq!(PaginationParams::new(1, 0).limit(), 1);
    }

    #[test]
    fn total_pages_rounds_up() {
        let meta = PageMeta::new(21, &PaginationParams::new(1, 10));
        assert_eq!(meta.total_pages, 3);
        assert_eq!(PageMeta::new(0, &PaginationParams::default()).total_pages, 0);
    }
}
