//! Headless CMS client
//!
//! Queries go to `GET {base_url}/v{api_version}/data/query/{dataset}` with a
//! GROQ `query` parameter and an optional bearer token. Each kind has a
//! projection that reshapes CMS fields into the [`super::documents`] types.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;

use super::{ContentError, ContentKind, ContentSource};

/// Connection settings for the CMS
#[derive(Debug, Clone)]
pub struct CmsConfig {
    /// Project API host, e.g. `https://abc123.api.sanity.io`
    pub base_url: String,

    pub dataset: String,

    /// Date-style API version, e.g. `2024-01-01`
    pub api_version: String,

    /// Read token; public datasets need none
    pub token: Option<String>,

    pub timeout_seconds: u64,
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            dataset: "production".to_string(),
            api_version: "2024-01-01".to_string(),
            token: None,
            timeout_seconds: 5,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    result: JsonValue,
}

#[derive(Debug)]
pub struct CmsClient {
    http: reqwest::Client,
    query_url: String,
}

impl CmsClient {
    pub fn new(config: &CmsConfig) -> Result<Self, ContentError> {
        if config.base_url.is_empty() {
            return Err(ContentError::Config("base_url is empty".into()));
        }
        if config.dataset.is_empty() {
            return Err(ContentError::Config("dataset is empty".into()));
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ContentError::Config("Invalid token format".into()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            http,
            query_url: query_url(config),
        })
    }
}

fn query_url(config: &CmsConfig) -> String {
    format!(
        "{}/v{}/data/query/{}",
        config.base_url.trim_end_matches('/'),
        config.api_version.trim_start_matches('v'),
        config.dataset
    )
}

fn projection(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Course => {
            r#"{ "slug": slug.current, title, summary, description, "image_url": image.asset->url, "suggested_donation_minor": suggestedDonationMinor, currency, "modules": modules[]{ "key": key.current, title, "lessons": lessons[]{ "key": key.current, title, "duration_minutes": durationMinutes } } }"#
        }
        ContentKind::TeamMember => {
            r#"{ name, role, bio, "photo_url": photo.asset->url, order }"#
        }
        ContentKind::Event => {
            r#"{ "slug": slug.current, title, description, "starts_at": startsAt, "ends_at": endsAt, location, "registration_url": registrationUrl }"#
        }
        ContentKind::JobOpening => {
            r#"{ "slug": slug.current, title, department, location, "employment_type": employmentType, description, "apply_url": applyUrl }"#
        }
        ContentKind::Testimonial => {
            r#"{ author, role, quote, "course_slug": course->slug.current }"#
        }
        ContentKind::DonationTier => {
            r#"{ "slug": slug.current, name, "amount_minor": amountMinor, currency, benefits }"#
        }
    }
}

fn ordering(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::TeamMember => " | order(order asc)",
        ContentKind::Event => " | order(startsAt asc)",
        ContentKind::DonationTier => " | order(amountMinor asc)",
        _ => " | order(_createdAt desc)",
    }
}

/// Builds the GROQ query for a kind, optionally filtered by `$slug`
pub(crate) fn groq_for(kind: ContentKind, with_slug: bool) -> String {
    let filter = if with_slug {
        format!(r#"*[_type == "{}" && slug.current == $slug]"#, kind.document_type())
    } else {
        format!(r#"*[_type == "{}"]"#, kind.document_type())
    };

    format!("{}{}{}", filter, ordering(kind), projection(kind))
}

#[async_trait]
impl ContentSource for CmsClient {
    async fn query(
        &self,
        kind: ContentKind,
        slug: Option<&str>,
    ) -> Result<Vec<JsonValue>, ContentError> {
        let groq = groq_for(kind, slug.is_some());
        let mut params = vec![("query", groq)];
        if let Some(slug) = slug {
            // Parameters are JSON-encoded values
            params.push(("$slug", JsonValue::String(slug.to_string()).to_string()));
        }

        debug!(kind = %kind, slug = ?slug, "Querying CMS");

        let resp = self.http.get(&self.query_url).query(&params).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ContentError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }

        let body: QueryResponse = resp.json().await?;
        Ok(match body.result {
            JsonValue::Array(items) => items,
            JsonValue::Null => Vec::new(),
            other => vec![other],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_url() {
        let config = CmsConfig {
            base_url: "https://abc123.api.sanity.io/".to_string(),
            ..Default::default()
        };
        assert_eq!(
            query_url(&config),
            "https://abc123.api.sanity.io/v2024-01-01/data/query/production"
        );
    }

    #[test]
    fn test_groq_slug_filter() {
        let all = groq_for(ContentKind::Course, false);
        assert!(all.starts_with(r#"*[_type == "course"]"#));
        assert!(!all.contains("$slug"));

        let one = groq_for(ContentKind::Course, true);
        assert!(one.contains("slug.current == $slug"));
        assert!(one.contains("\"modules\""));
    }

    #[test]
    fn test_team_is_ordered() {
        assert!(groq_for(ContentKind::TeamMember, false).contains("order(order asc)"));
    }

    #[test]
    fn test_new_rejects_missing_base_url() {
        let result = CmsClient::new(&CmsConfig::default());
        assert!(matches!(result, Err(ContentError::Config(_))));
    }
}
