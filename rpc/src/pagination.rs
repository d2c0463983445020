//! Offset pagination for list endpoints.

use serde::{Deserialize, Serialize};

/// Default page size when `limit` is not specified.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Maximum allowed page size.
pub const MAX_PAGE_SIZE: usize = 1000;

/// `?offset=&limit=` accepted by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl PageParams {
    /// Page size clamped to `[1, MAX_PAGE_SIZE]`.
    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// One page of a list plus where the next one starts.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<usize>,
}

impl<T> Page<T> {
    /// Cut `params`' window out of the complete list.
    pub fn slice(all: Vec<T>, params: &PageParams) -> Self {
        let total = all.len();
        let offset = params.offset().min(total);
        let limit = params.effective_limit();
        let items: Vec<T> = all.into_iter().skip(offset).take(limit).collect();
        let end = offset + items.len();
        Self {
            items,
            total,
            next_offset: (end < total).then_some(end),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            next_offset: self.next_offset,
        }
    }
}
