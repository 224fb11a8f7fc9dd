/// Administration endpoints
///
/// Mounted under `/v1/admin` behind JWT authentication. Every handler checks
/// the caller's role itself: instructors may list enrollments, everything
/// else needs an admin.
///
/// # Endpoints
///
/// - `GET   /v1/admin/enrollments?status=&limit=&offset=`
/// - `PATCH /v1/admin/enrollments/:id/status`
/// - `GET   /v1/admin/payments?status=&limit=&offset=`
/// - `POST  /v1/admin/payments/:id/refund`
/// - `GET   /v1/admin/users?limit=&offset=`
/// - `PATCH /v1/admin/users/:id/role`
/// - `GET   /v1/admin/audit-logs?action=&limit=&offset=`
/// - `POST  /v1/admin/content/invalidate`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client_ip::ClientIp,
    routes::Pagination,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use kindred_shared::{
    audit::AuditEvent,
    auth::{
        authorization::{require_admin, require_role},
        middleware::AuthContext,
    },
    models::{
        audit_log::AuditLog,
        enrollment::{Enrollment, EnrollmentStatus},
        payment_log::{PaymentLog, PaymentStatus},
        user::{Role, User},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct StatusFilter {
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActionFilter {
    pub action: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateEnrollmentStatusRequest {
    pub status: EnrollmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct RefundResponse {
    pub payment: PaymentLog,

    /// Linked enrollment after cancellation, when there was one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<Enrollment>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Parses an optional `?status=` value, treating blank as absent
fn parse_status<T>(raw: Option<&str>) -> ApiResult<Option<T>>
where
    T: std::str::FromStr<Err = String>,
{
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|e| ApiError::invalid_field("status", e)),
        None => Ok(None),
    }
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Vec<Enrollment>>> {
    require_role(&auth, Role::Instructor)?;

    let status = parse_status::<EnrollmentStatus>(filter.status.as_deref())?;
    let enrollments = Enrollment::list(&state.db, status, page.limit(), page.offset()).await?;

    Ok(Json(enrollments))
}

/// Moves an enrollment to a new status
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Transition not allowed from the current status
/// - `409 Conflict`: Status changed concurrently
pub async fn update_enrollment_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    client_ip: ClientIp,
    Json(req): Json<UpdateEnrollmentStatusRequest>,
) -> ApiResult<Json<Enrollment>> {
    require_admin(&auth)?;

    let current = Enrollment::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Enrollment not found".to_string()))?;

    if current.status == req.status {
        return Ok(Json(current));
    }

    if !current.status.can_transition_to(req.status) {
        return Err(ApiError::invalid_field(
            "status",
            format!("Cannot move an enrollment from {} to {}", current.status, req.status),
        ));
    }

    let mut conn = state.db.acquire().await?;
    let updated = Enrollment::update_status(&mut conn, id, current.status, req.status)
        .await?
        .ok_or_else(|| ApiError::Conflict("Enrollment status changed, reload and retry".to_string()))?;

    tracing::info!(
        enrollment_id = %id,
        from = %current.status,
        to = %updated.status,
        "Enrollment status changed"
    );
    state.audit.record(
        AuditEvent::new("enrollment.status_changed")
            .with_actor(Some(auth.user_id))
            .with_subject("enrollment", id)
            .with_metadata(json!({ "from": current.status, "to": updated.status }))
            .with_ip(client_ip.to_audit()),
    );

    Ok(Json(updated))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
    Query(filter): Query<StatusFilter>,
) -> ApiResult<Json<Vec<PaymentLog>>> {
    require_admin(&auth)?;

    let status = parse_status::<PaymentStatus>(filter.status.as_deref())?;
    let payments = PaymentLog::list(&state.db, status, page.limit(), page.offset()).await?;

    Ok(Json(payments))
}

/// Records a refund made in the provider's dashboard
///
/// Only successful payments can be refunded. The linked enrollment is
/// cancelled in the same transaction, which also revokes its certificate
/// for public verification. Nothing is sent to the provider.
///
/// # Errors
///
/// - `409 Conflict`: Payment is not in `success` state
pub async fn refund_payment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    client_ip: ClientIp,
) -> ApiResult<Json<RefundResponse>> {
    require_admin(&auth)?;

    let payment = PaymentLog::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".to_string()))?;

    let mut tx = state.db.begin().await?;

    let refunded = PaymentLog::mark_refunded(&mut tx, id).await?.ok_or_else(|| {
        ApiError::Conflict(format!(
            "Only successful payments can be refunded, this one is {}",
            payment.status
        ))
    })?;

    let mut enrollment = None;
    if let Some(enrollment_id) = refunded.enrollment_id {
        if let Some(current) = Enrollment::find_by_id(&state.db, enrollment_id).await? {
            enrollment = if current.status.can_transition_to(EnrollmentStatus::Cancelled) {
                Enrollment::update_status(
                    &mut tx,
                    enrollment_id,
                    current.status,
                    EnrollmentStatus::Cancelled,
                )
                .await?
            } else {
                Some(current)
            };
        }
    }

    tx.commit().await?;

    tracing::info!(
        payment_id = %id,
        reference = %refunded.reference,
        enrollment_id = ?refunded.enrollment_id,
        "Payment refunded"
    );
    state.audit.record(
        AuditEvent::new("payment.refunded")
            .with_actor(Some(auth.user_id))
            .with_subject("payment", id)
            .with_metadata(json!({
                "provider": refunded.provider,
                "reference": refunded.reference,
                "amount_minor": refunded.amount_minor,
                "currency": refunded.currency,
                "enrollment_id": refunded.enrollment_id,
            }))
            .with_ip(client_ip.to_audit()),
    );

    Ok(Json(RefundResponse {
        payment: refunded,
        enrollment,
    }))
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<UserPage>> {
    require_admin(&auth)?;

    let users = User::list(&state.db, page.limit(), page.offset()).await?;
    let total = User::count(&state.db).await?;

    Ok(Json(UserPage {
        users,
        total,
        limit: page.limit(),
        offset: page.offset(),
    }))
}

/// Changes a user's role
///
/// Admins can't change their own role, so there is always at least the
/// caller left with admin access.
pub async fn update_user_role(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    client_ip: ClientIp,
    Json(req): Json<UpdateRoleRequest>,
) -> ApiResult<Json<User>> {
    require_admin(&auth)?;

    if id == auth.user_id {
        return Err(ApiError::Forbidden("You cannot change your own role".to_string()));
    }

    let user = User::update_role(&state.db, id, req.role)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %id, role = %user.role, "Role changed");
    state.audit.record(
        AuditEvent::new("user.role_changed")
            .with_actor(Some(auth.user_id))
            .with_subject("user", id)
            .with_metadata(json!({ "role": user.role }))
            .with_ip(client_ip.to_audit()),
    );

    Ok(Json(user))
}

pub async fn list_audit_logs(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
    Query(filter): Query<ActionFilter>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    require_admin(&auth)?;

    let action = filter.action.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let logs = AuditLog::list(&state.db, action, page.limit(), page.offset()).await?;

    Ok(Json(logs))
}

/// Drops cached CMS content so the next request refetches it
pub async fn invalidate_content(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<StatusCode> {
    require_admin(&auth)?;

    state.content.invalidate_all();
    tracing::info!(user_id = %auth.user_id, "Content cache invalidated");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_ignores_blank_values() {
        let status = parse_status::<EnrollmentStatus>(Some("  ")).unwrap();
        assert!(status.is_none());
        assert!(parse_status::<PaymentStatus>(None).unwrap().is_none());
    }

    #[test]
    fn test_parse_status_rejects_unknown_values() {
        let err = parse_status::<EnrollmentStatus>(Some("archived")).unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let status = parse_status::<EnrollmentStatus>(Some("active")).unwrap();
        assert_eq!(status, Some(EnrollmentStatus::Active));
    }
}
