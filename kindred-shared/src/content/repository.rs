//! Typed, cached access to CMS content
//!
//! Non-empty query results are cached per `(kind, slug)` for a fixed TTL.
//! Empty results and CMS failures are not cached and fall back to the static
//! documents in [`super::fallback`], so a CMS outage degrades to default
//! content rather than errors.

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::documents::{Course, DonationTier, Event, JobOpening, TeamMember, Testimonial};
use super::{fallback, ContentKind, ContentSource};

type CacheKey = (ContentKind, Option<String>);

#[derive(Clone)]
pub struct ContentRepository {
    source: Arc<dyn ContentSource>,
    cache: Cache<CacheKey, Arc<Vec<JsonValue>>>,
}

impl ContentRepository {
    pub fn new(source: Arc<dyn ContentSource>, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(512)
            .time_to_live(ttl)
            .build();

        Self { source, cache }
    }

    async fn fetch(&self, kind: ContentKind, slug: Option<&str>) -> Arc<Vec<JsonValue>> {
        let key = (kind, slug.map(str::to_string));
        if let Some(hit) = self.cache.get(&key).await {
            return hit;
        }

        match self.source.query(kind, slug).await {
            Ok(docs) if !docs.is_empty() => {
                let docs = Arc::new(docs);
                self.cache.insert(key, docs.clone()).await;
                docs
            }
            Ok(_) => {
                debug!(kind = %kind, slug = ?slug, "CMS returned no documents");
                Arc::new(Vec::new())
            }
            Err(e) => {
                warn!(kind = %kind, slug = ?slug, error = %e, "CMS query failed, using fallback content");
                Arc::new(Vec::new())
            }
        }
    }

    /// Decodes documents, skipping ones that don't match the expected shape
    async fn typed<T: DeserializeOwned>(&self, kind: ContentKind, slug: Option<&str>) -> Vec<T> {
        self.fetch(kind, slug)
            .await
            .iter()
            .filter_map(|doc| match serde_json::from_value::<T>(doc.clone()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Skipping malformed CMS document");
                    None
                }
            })
            .collect()
    }

    async fn list_or<T: DeserializeOwned>(
        &self,
        kind: ContentKind,
        fallback: fn() -> Vec<T>,
    ) -> Vec<T> {
        let docs = self.typed(kind, None).await;
        if docs.is_empty() {
            fallback()
        } else {
            docs
        }
    }

    pub async fn courses(&self) -> Vec<Course> {
        self.list_or(ContentKind::Course, fallback::courses).await
    }

    /// Looks up one course by slug
    pub async fn course(&self, slug: &str) -> Option<Course> {
        let found = self
            .typed::<Course>(ContentKind::Course, Some(slug))
            .await
            .into_iter()
            .next();

        found.or_else(|| fallback::courses().into_iter().find(|c| c.slug == slug))
    }

    pub async fn team(&self) -> Vec<TeamMember> {
        let mut team = self.list_or(ContentKind::TeamMember, fallback::team).await;
        team.sort_by_key(|m| m.order);
        team
    }

    pub async fn events(&self) -> Vec<Event> {
        let mut events = self.list_or(ContentKind::Event, fallback::events).await;
        events.sort_by_key(|e| e.starts_at);
        events
    }

    pub async fn careers(&self) -> Vec<JobOpening> {
        self.list_or(ContentKind::JobOpening, fallback::careers).await
    }

    pub async fn testimonials(&self) -> Vec<Testimonial> {
        self.list_or(ContentKind::Testimonial, fallback::testimonials)
            .await
    }

    pub async fn donation_tiers(&self) -> Vec<DonationTier> {
        let mut tiers = self
            .list_or(ContentKind::DonationTier, fallback::donation_tiers)
            .await;
        tiers.sort_by_key(|t| t.amount_minor);
        tiers
    }

    pub async fn donation_tier(&self, slug: &str) -> Option<DonationTier> {
        self.donation_tiers()
            .await
            .into_iter()
            .find(|t| t.slug == slug)
    }

    /// Drops every cached result
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}
