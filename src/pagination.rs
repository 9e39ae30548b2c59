use serde::{Deserialize, Serialize};

/// Number of posts shown on every listing page.
pub const PAGE_SIZE: i64 = 10;

/// PageQuery
///
/// The `?page=` query parameter. Kept as a raw string so that junk values fall back to the
/// first page instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

/// Paginator
///
/// Splits `total` items into pages of `per_page`. An empty collection still has one page.
#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    total: i64,
    per_page: i64,
}

/// PageWindow
///
/// The slice of the ordered listing that makes up one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub number: i64,
    pub num_pages: i64,
    pub offset: i64,
    pub limit: i64,
}

impl Paginator {
    pub fn new(total: i64, per_page: i64) -> Self {
        Self {
            total: total.max(0),
            per_page: per_page.max(1),
        }
    }

    pub fn num_pages(&self) -> i64 {
        if self.total == 0 {
            1
        } else {
            (self.total + self.per_page - 1) / self.per_page
        }
    }

    /// Resolves a raw page parameter. Non-numeric input gives page 1, numbers outside
    /// `1..=num_pages` clamp to the nearest bound, however large they are.
    pub fn window(&self, raw: Option<&str>) -> PageWindow {
        let requested = raw.and_then(parse_page).unwrap_or(1);
        let num_pages = self.num_pages();
        let number = requested.clamp(1, num_pages);
        PageWindow {
            number,
            num_pages,
            offset: (number - 1) * self.per_page,
            limit: self.per_page,
        }
    }
}

/// Parses a page number, saturating integers too wide for `i64`.
fn parse_page(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if let Ok(number) = value.parse::<i64>() {
        return Some(number);
    }
    let (negative, digits) = match value.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(if negative { i64::MIN } else { i64::MAX })
}

/// Page
///
/// One page of results as handed to the templates.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: i64,
    pub num_pages: i64,
    pub total: i64,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page_number: i64,
    pub next_page_number: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, window: PageWindow, total: i64) -> Self {
        Self {
            items,
            number: window.number,
            num_pages: window.num_pages,
            total,
            has_previous: window.number > 1,
            has_next: window.number < window.num_pages,
            previous_page_number: (window.number - 1).max(1),
            next_page_number: (window.number + 1).min(window.num_pages),
        }
    }
}
