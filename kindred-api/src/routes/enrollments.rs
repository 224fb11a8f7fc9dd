/// Enrollment and progress endpoints
///
/// All routes require authentication. Learners see their own enrollments,
/// including ones donated under their email before they registered; staff
/// can read any enrollment. Only the owner (or an admin) records progress.
///
/// # Endpoints
///
/// - `GET  /v1/enrollments` - My enrollments
/// - `GET  /v1/enrollments/:id` - One enrollment with its progress
/// - `GET  /v1/enrollments/:id/progress` - Lesson progress
/// - `POST /v1/enrollments/:id/progress` - Record lesson updates

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::Utc;
use kindred_shared::{
    audit::AuditEvent,
    auth::{
        authorization::{require_self_or_admin, require_self_or_staff},
        middleware::AuthContext,
    },
    models::{course_progress::CourseProgress, enrollment::Enrollment, user::User},
    progress::{apply_lesson_update, LessonUpdate},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Most lesson updates accepted in one request
const MAX_UPDATES_PER_REQUEST: usize = 100;

#[derive(Debug, Serialize)]
pub struct EnrollmentDetail {
    #[serde(flatten)]
    pub enrollment: Enrollment,

    pub progress: Option<CourseProgress>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressUpdateRequest {
    pub updates: Vec<LessonUpdate>,
}

/// Owner of an enrollment as far as `auth` is concerned
///
/// Unclaimed enrollments belong to the account registered under the donor
/// email.
async fn effective_owner(
    state: &AppState,
    auth: &AuthContext,
    enrollment: &Enrollment,
) -> ApiResult<Option<Uuid>> {
    if enrollment.user_id.is_some() {
        return Ok(enrollment.user_id);
    }

    let user = User::find_by_id(&state.db, auth.user_id).await?;
    let same_email = user.is_some_and(|u| u.email.eq_ignore_ascii_case(&enrollment.donor_email));

    Ok(same_email.then_some(auth.user_id))
}

async fn find_enrollment(state: &AppState, id: Uuid) -> ApiResult<Enrollment> {
    Enrollment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))
}

/// Loads an enrollment the caller may read
pub(crate) async fn readable_enrollment(
    state: &AppState,
    auth: &AuthContext,
    id: Uuid,
) -> ApiResult<Enrollment> {
    let enrollment = find_enrollment(state, id).await?;
    let owner = effective_owner(state, auth, &enrollment).await?;
    require_self_or_staff(auth, owner)?;
    Ok(enrollment)
}

/// Loads an enrollment the caller may change
pub(crate) async fn writable_enrollment(
    state: &AppState,
    auth: &AuthContext,
    id: Uuid,
) -> ApiResult<Enrollment> {
    let enrollment = find_enrollment(state, id).await?;
    let owner = effective_owner(state, auth, &enrollment).await?;
    require_self_or_admin(auth, owner)?;
    Ok(enrollment)
}

pub async fn list_my_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Account no longer exists".to_string()))?;

    let enrollments = Enrollment::list_for_user(&state.db, user.id, &user.email).await?;
    Ok(Json(enrollments))
}

pub async fn get_enrollment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EnrollmentDetail>> {
    let enrollment = readable_enrollment(&state, &auth, id).await?;
    let progress = CourseProgress::find_by_enrollment(&state.db, enrollment.id).await?;

    Ok(Json(EnrollmentDetail {
        enrollment,
        progress,
    }))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CourseProgress>> {
    let enrollment = readable_enrollment(&state, &auth, id).await?;
    let progress = CourseProgress::find_by_enrollment(&state.db, enrollment.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Progress not found".to_string()))?;

    Ok(Json(progress))
}

/// Records lesson completion and time spent
///
/// Updates apply in order inside one transaction with the progress row
/// locked; if any update names an unknown lesson, none are saved. The
/// summary (percentage, eligibility) is always recomputed server-side.
///
/// # Errors
///
/// - `409 Conflict`: Enrollment is not active
/// - `422 Unprocessable Entity`: Unknown module or lesson, negative time
pub async fn update_progress(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProgressUpdateRequest>,
) -> ApiResult<Json<CourseProgress>> {
    if req.updates.is_empty() || req.updates.len() > MAX_UPDATES_PER_REQUEST {
        return Err(ApiError::invalid_field(
            "updates",
            format!("Send between 1 and {} updates", MAX_UPDATES_PER_REQUEST),
        ));
    }

    let enrollment = writable_enrollment(&state, &auth, id).await?;
    if !enrollment.is_active() {
        return Err(ApiError::Conflict(format!(
            "Enrollment is {}, progress can only be recorded on active enrollments",
            enrollment.status
        )));
    }

    let mut tx = state.db.begin().await?;

    let current = CourseProgress::find_by_enrollment_for_update(&mut tx, enrollment.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Progress not found".to_string()))?;
    let was_eligible = current.certificate_eligible;

    let mut modules = current.modules.0;
    let now = Utc::now();
    for update in &req.updates {
        apply_lesson_update(&mut modules, update, now)?;
    }

    let saved = CourseProgress::save_lessons(&mut tx, enrollment.id, modules)
        .await?
        .ok_or_else(|| ApiError::NotFound("Progress not found".to_string()))?;

    tx.commit().await?;

    tracing::debug!(
        enrollment_id = %enrollment.id,
        updates = req.updates.len(),
        overall_progress = saved.overall_progress,
        "Progress updated"
    );

    if saved.certificate_eligible && !was_eligible {
        tracing::info!(enrollment_id = %enrollment.id, "Course completed");
        state.audit.record(
            AuditEvent::new("course.completed")
                .with_actor(Some(auth.user_id))
                .with_subject("enrollment", enrollment.id)
                .with_metadata(json!({
                    "course_slug": enrollment.course_slug,
                    "total_time_spent_seconds": saved.total_time_spent_seconds,
                })),
        );
    }

    Ok(Json(saved))
}
