/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, token refresh, password reset
/// - `content`: CMS-backed public content
/// - `donations`: Starting and verifying donations
/// - `webhooks`: Payment provider callbacks
/// - `enrollments`: A learner's enrollments and lesson progress
/// - `certificates`: Issuing, downloading and verifying certificates
/// - `exchange`: Exchange rates for display
/// - `admin`: Staff views and state changes

pub mod admin;
pub mod auth;
pub mod certificates;
pub mod content;
pub mod donations;
pub mod enrollments;
pub mod exchange;
pub mod health;
pub mod webhooks;

use serde::Deserialize;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

/// `?limit=&offset=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Limit clamped to `1..=200`, default 50
    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}
