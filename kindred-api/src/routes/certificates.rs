/// Certificate endpoints
///
/// # Endpoints
///
/// - `POST /v1/enrollments/:id/certificate` - Issue (or fetch) the certificate
/// - `GET  /v1/enrollments/:id/certificate.pdf` - Download the PDF
/// - `GET  /v1/certificates/:code` - Public verification

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client_ip::ClientIp,
    routes::enrollments::{readable_enrollment, writable_enrollment},
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use kindred_shared::{
    audit::AuditEvent,
    auth::middleware::AuthContext,
    certificate::{
        is_valid_certificate_code, normalize_certificate_code, render_certificate_pdf,
        CertificateDocument, IssuedCertificate,
    },
    models::{
        course_progress::CourseProgress,
        enrollment::{Enrollment, EnrollmentStatus},
    },
};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

/// Public view of a certificate
///
/// Carries no contact details: anyone holding the code can look it up.
#[derive(Debug, Serialize)]
pub struct CertificateVerification {
    /// `false` once the enrollment has been cancelled (e.g. refunded)
    pub valid: bool,
    pub certificate_code: String,
    pub recipient_name: String,
    pub course_slug: String,
    pub course_title: String,
    pub issued_at: Option<DateTime<Utc>>,
}

/// Issue the certificate for a completed course
///
/// Returns `201` the first time and `200` with the same code afterwards.
///
/// # Errors
///
/// - `409 Conflict`: Course not finished or enrollment cancelled
pub async fn issue_certificate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
    client_ip: ClientIp,
) -> ApiResult<(StatusCode, Json<IssuedCertificate>)> {
    let enrollment = writable_enrollment(&state, &auth, id).await?;
    let issued = kindred_shared::certificate::issue_certificate(&state.db, &enrollment).await?;

    if !issued.newly_issued {
        return Ok((StatusCode::OK, Json(issued)));
    }

    state.audit.record(
        AuditEvent::new("certificate.issued")
            .with_actor(Some(auth.user_id))
            .with_subject("enrollment", enrollment.id)
            .with_metadata(json!({
                "certificate_code": issued.certificate_code,
                "course_slug": enrollment.course_slug,
            }))
            .with_ip(client_ip.to_audit()),
    );

    Ok((StatusCode::CREATED, Json(issued)))
}

/// Download the certificate as a PDF
///
/// # Errors
///
/// - `404 Not Found`: No certificate has been issued yet
pub async fn download_certificate(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let enrollment = readable_enrollment(&state, &auth, id).await?;
    if enrollment.status == EnrollmentStatus::Cancelled {
        return Err(ApiError::Conflict("Enrollment is cancelled".to_string()));
    }

    let progress = CourseProgress::find_by_enrollment(&state.db, enrollment.id).await?;
    let (code, issued_at) = progress
        .and_then(|p| p.certificate_code.zip(p.certificate_issued_at))
        .ok_or_else(|| ApiError::NotFound("Certificate has not been issued".to_string()))?;

    let document = CertificateDocument {
        recipient_name: enrollment.donor_name.clone(),
        course_title: enrollment.course_title.clone(),
        verification_url: state.config.certificate_verification_url(&code),
        certificate_code: code,
        issued_at,
        organization_name: state.config.organization.name.clone(),
    };
    let pdf = render_certificate_pdf(&document);

    tracing::debug!(enrollment_id = %enrollment.id, bytes = pdf.len(), "Rendered certificate");

    let disposition = format!(
        "attachment; filename=\"certificate-{}.pdf\"",
        document.certificate_code
    );

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}

/// Public certificate lookup
///
/// Codes are matched case-insensitively. Malformed codes are reported the
/// same way as unknown ones.
pub async fn verify_certificate(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<CertificateVerification>> {
    let code = normalize_certificate_code(&code);
    let not_found = || ApiError::NotFound("Certificate not found".to_string());

    if !is_valid_certificate_code(&code) {
        return Err(not_found());
    }

    let enrollment: Enrollment = Enrollment::find_by_certificate_code(&state.db, &code)
        .await?
        .ok_or_else(not_found)?;
    let issued_at = CourseProgress::find_by_enrollment(&state.db, enrollment.id)
        .await?
        .and_then(|p| p.certificate_issued_at);

    Ok(Json(CertificateVerification {
        valid: enrollment.status != EnrollmentStatus::Cancelled,
        certificate_code: code,
        recipient_name: enrollment.donor_name,
        course_slug: enrollment.course_slug,
        course_title: enrollment.course_title,
        issued_at,
    }))
}
