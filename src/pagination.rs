use serde::{Deserialize, Serialize};

pub const POST_PAGE_LIMIT: u32 = 5;
pub const COMMENT_PAGE_LIMIT: u32 = 10;

/// Raw `page`/`limit` query parameters. Kept as strings so that garbage
/// input falls back to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl PageQuery {
    pub fn resolve(&self, default_limit: u32) -> PageRequest {
        PageRequest {
            page: parse_positive(self.page.as_deref()).unwrap_or(1),
            limit: parse_positive(self.limit.as_deref()).unwrap_or(default_limit),
        }
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .filter(|n| *n > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

/// Offset window for one page of a collection of `total` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: i64,
    pub limit: i64,
    pub current_page: u32,
    pub total_pages: i64,
}

/// Translate a page request into an offset window. Out-of-range pages are
/// not clamped; they produce an offset past the end and an empty page.
pub fn paginate(request: PageRequest, total: i64) -> PageWindow {
    let limit = i64::from(request.limit.max(1));
    let offset = (i64::from(request.page.max(1)) - 1).saturating_mul(limit);
    let total = total.max(0);
    PageWindow {
        offset,
        limit,
        current_page: request.page.max(1),
        total_pages: (total + limit - 1) / limit,
    }
}

impl PageWindow {
    /// Page count for display; an empty collection still has one page.
    pub fn display_pages(&self) -> i64 {
        self.total_pages.max(1)
    }

    pub fn summary(&self, total: i64) -> Pagination {
        Pagination {
            total,
            current_page: self.current_page,
            total_pages: self.total_pages,
            display_pages: self.display_pages(),
            limit: self.limit,
        }
    }
}

/// Pagination block attached to list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: i64,
    pub current_page: u32,
    pub total_pages: i64,
    pub display_pages: i64,
    pub limit: i64,
}
