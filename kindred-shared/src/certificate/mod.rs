//! Certificate issuance
//!
//! A certificate is a verification code stamped onto both the enrollment and
//! its progress row, plus a PDF rendered on demand from those records.
//! Issuing is idempotent: once a code exists it is returned unchanged.

pub mod code;
pub mod pdf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::models::course_progress::CourseProgress;
use crate::models::enrollment::{Enrollment, EnrollmentStatus};

pub use code::{generate_certificate_code, is_valid_certificate_code, normalize_certificate_code};
pub use pdf::{render_certificate_pdf, CertificateDocument};

/// Fresh codes tried before giving up
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Course progress is {overall_progress}%, certificates require 100%")]
    NotEligible { overall_progress: i32 },

    #[error("Enrollment has no progress record")]
    ProgressMissing,

    #[error("Enrollment is cancelled")]
    EnrollmentCancelled,

    #[error("Could not allocate a unique certificate code")]
    CodeSpaceExhausted,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedCertificate {
    pub certificate_code: String,
    pub issued_at: DateTime<Utc>,

    /// `false` when the certificate already existed
    pub newly_issued: bool,
}

/// Issues the certificate for a fully completed enrollment
///
/// The progress row is locked for the duration, so concurrent requests
/// serialize and the second one sees the first one's code.
pub async fn issue_certificate(
    pool: &PgPool,
    enrollment: &Enrollment,
) -> Result<IssuedCertificate, CertificateError> {
    if enrollment.status == EnrollmentStatus::Cancelled {
        return Err(CertificateError::EnrollmentCancelled);
    }

    let mut tx = pool.begin().await?;

    let progress = CourseProgress::find_by_enrollment_for_update(&mut tx, enrollment.id)
        .await?
        .ok_or(CertificateError::ProgressMissing)?;

    if progress.certificate_issued {
        if let (Some(code), Some(issued_at)) =
            (progress.certificate_code, progress.certificate_issued_at)
        {
            tx.commit().await?;
            return Ok(IssuedCertificate {
                certificate_code: code,
                issued_at,
                newly_issued: false,
            });
        }
    }

    if !progress.certificate_eligible {
        return Err(CertificateError::NotEligible {
            overall_progress: progress.overall_progress,
        });
    }

    let code = match &enrollment.certificate_code {
        Some(existing) => existing.clone(),
        None => {
            let mut allocated = None;
            for _ in 0..MAX_CODE_ATTEMPTS {
                let candidate = generate_certificate_code();
                if Enrollment::set_certificate_code(&mut tx, enrollment.id, &candidate).await? {
                    allocated = Some(candidate);
                    break;
                }
            }
            allocated.ok_or(CertificateError::CodeSpaceExhausted)?
        }
    };

    let updated = CourseProgress::mark_certificate_issued(&mut tx, enrollment.id, &code)
        .await?
        .ok_or(CertificateError::NotEligible {
            overall_progress: progress.overall_progress,
        })?;

    tx.commit().await?;

    info!(
        enrollment_id = %enrollment.id,
        certificate_code = %code,
        "Certificate issued"
    );

    Ok(IssuedCertificate {
        certificate_code: code,
        issued_at: updated.certificate_issued_at.unwrap_or_else(Utc::now),
        newly_issued: true,
    })
}
