//! Content delivery
//!
//! Marketing-site content (courses, team, events, careers, testimonials,
//! donation tiers) lives in a headless CMS. [`ContentSource`] is the seam:
//! [`cms::CmsClient`] talks to the real CMS and tests plug in an in-memory
//! source. [`repository::ContentRepository`] adds typing, a TTL cache and
//! static fallbacks so the site still renders when the CMS is empty or down.

pub mod cms;
pub mod documents;
pub mod fallback;
pub mod repository;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use thiserror::Error;

pub use cms::{CmsClient, CmsConfig};
pub use documents::{Course, CourseModule, DonationTier, Event, JobOpening, Lesson, TeamMember, Testimonial};
pub use fallback::StaticContent;
pub use repository::ContentRepository;

/// Errors talking to the CMS
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CMS API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// CMS document types served by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Course,
    TeamMember,
    Event,
    JobOpening,
    Testimonial,
    DonationTier,
}

impl ContentKind {
    /// The CMS `_type` name
    pub fn document_type(&self) -> &'static str {
        match self {
            ContentKind::Course => "course",
            ContentKind::TeamMember => "teamMember",
            ContentKind::Event => "event",
            ContentKind::JobOpening => "jobOpening",
            ContentKind::Testimonial => "testimonial",
            ContentKind::DonationTier => "donationTier",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_type())
    }
}

/// Somewhere content documents can be queried from
///
/// `slug` narrows the result to documents with that slug; kinds without
/// slugs ignore it.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn query(&self, kind: ContentKind, slug: Option<&str>)
        -> Result<Vec<JsonValue>, ContentError>;
}
