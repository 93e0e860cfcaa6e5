pub mod admin;
pub mod auth;
pub mod dms;
pub mod engagement;
pub mod error;
pub mod friend_requests;
pub mod friends;
pub mod groups;
pub mod notifications;
pub mod notify;
pub mod posts;
pub mod profile;
pub mod reels;
pub mod stories;
pub mod support;

pub use error::{ApiError, ApiResult, AUTH_REQUIRED};

use serde::Deserialize;

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// `?limit=&offset=` query for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_bounds() {
        let page = Pagination::default();
        assert_eq!((page.limit(), page.offset()), (20, 0));

        let page = Pagination {
            limit: Some(1_000),
            offset: Some(-5),
        };
        assert_eq!((page.limit(), page.offset()), (100, 0));
    }
}
