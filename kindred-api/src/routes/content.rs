/// Public content endpoints
///
/// Thin wrappers over [`ContentRepository`](kindred_shared::content::ContentRepository).
/// Content never errors: when the CMS is down or empty the static fallback
/// documents are served.
///
/// # Endpoints
///
/// - `GET /v1/content/courses`
/// - `GET /v1/content/courses/:slug`
/// - `GET /v1/content/team`
/// - `GET /v1/content/events`
/// - `GET /v1/content/careers`
/// - `GET /v1/content/testimonials`
/// - `GET /v1/content/donation-tiers`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use kindred_shared::content::{Course, DonationTier, Event, JobOpening, TeamMember, Testimonial};

/// Browsers and CDNs may reuse content for a minute
const CACHE_CONTROL: (header::HeaderName, &str) = (header::CACHE_CONTROL, "public, max-age=60");

fn cached<T: serde::Serialize>(body: T) -> impl IntoResponse {
    ([CACHE_CONTROL], Json(body))
}

pub async fn list_courses(State(state): State<AppState>) -> impl IntoResponse {
    let courses: Vec<Course> = state.content.courses().await;
    cached(courses)
}

pub async fn get_course(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let course = state
        .content
        .course(&slug)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Course {} not found", slug)))?;

    Ok(cached(course))
}

pub async fn team(State(state): State<AppState>) -> impl IntoResponse {
    let team: Vec<TeamMember> = state.content.team().await;
    cached(team)
}

pub async fn events(State(state): State<AppState>) -> impl IntoResponse {
    let events: Vec<Event> = state.content.events().await;
    cached(events)
}

pub async fn careers(State(state): State<AppState>) -> impl IntoResponse {
    let careers: Vec<JobOpening> = state.content.careers().await;
    cached(careers)
}

pub async fn testimonials(State(state): State<AppState>) -> impl IntoResponse {
    let testimonials: Vec<Testimonial> = state.content.testimonials().await;
    cached(testimonials)
}

pub async fn donation_tiers(State(state): State<AppState>) -> impl IntoResponse {
    let tiers: Vec<DonationTier> = state.content.donation_tiers().await;
    cached(tiers)
}
