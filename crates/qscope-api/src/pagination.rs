//! Page selection from `size` / `page` query parameters
//!
//! Malformed pagination never fails a request: anything that is missing,
//! empty, or not an integer falls back to the default (size 20, page 1).
//! Parsed values are passed to the store as-is, including zero and
//! negative numbers.

use axum::{extract::FromRequestParts, extract::Query, http::request::Parts};
use qscope_queue::Pagination;
use std::convert::Infallible;

/// Resolve page size and page number from raw query values
pub fn page_options(size: Option<&str>, page: Option<&str>) -> Pagination {
    Pagination::new(
        parse_or(size, Pagination::DEFAULT_SIZE),
        parse_or(page, Pagination::DEFAULT_PAGE),
    )
}

fn parse_or(value: Option<&str>, default: i64) -> i64 {
    value
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

/// Extractor yielding the request's page window.
///
/// Never rejects. When a parameter repeats, the first occurrence wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSelection(pub Pagination);

impl<S: Send + Sync> FromRequestParts<S> for PageSelection {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let pairs = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .map(|Query(pairs)| pairs)
            .unwrap_or_default();

        let lookup = |name: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        Ok(PageSelection(page_options(lookup("size"), lookup("page"))))
    }
}
