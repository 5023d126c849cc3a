use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub limit: usize,
    pub offset: usize,
}

impl PageRequest {
    /// `page` is 1-based; page 0 is treated as the first page.
    #[must_use]
    pub fn from_page(page: usize, limit: usize) -> Self {
        Self {
            limit,
            offset: page.saturating_sub(1).saturating_mul(limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}
