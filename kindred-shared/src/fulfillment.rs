//! Turning a verified payment into course access
//!
//! Verification and webhooks both end up here. The payment-log row for the
//! reference is locked first, so two concurrent settlements of the same
//! payment serialize and the second finds the first one's enrollment.
//! Enrollment, progress and payment status are written in one transaction.

use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{info, warn};

use crate::content::ContentRepository;
use crate::models::course_progress::CourseProgress;
use crate::models::enrollment::{CreateEnrollment, Enrollment, EnrollmentStatus};
use crate::models::payment_log::{PaymentLog, PaymentStatus};
use crate::models::user::User;
use crate::payments::{PaymentProvider, PaymentVerification, VerificationStatus};
use crate::progress::outline_to_progress;

#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("No payment {reference} from {provider}")]
    PaymentNotFound {
        provider: PaymentProvider,
        reference: String,
    },

    #[error("Paid {actual_minor} {actual_currency}, expected {expected_minor} {expected_currency}")]
    AmountMismatch {
        expected_minor: i64,
        expected_currency: String,
        actual_minor: i64,
        actual_currency: String,
    },

    #[error("Payment was refunded")]
    PaymentRefunded,

    #[error("Payment has not succeeded")]
    NotSucceeded,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result of settling a verification
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Settlement {
    /// Payment succeeded; `created` is false when an earlier call already
    /// fulfilled it
    Fulfilled { enrollment: Enrollment, created: bool },

    /// Provider reported failure
    Failed { reason: String },

    /// Provider has not settled yet
    Pending,
}

/// Rejects verifications whose amount or currency differ from what the
/// donor was asked to pay
pub fn check_amount(
    payment: &PaymentLog,
    verification: &PaymentVerification,
) -> Result<(), FulfillmentError> {
    if payment.amount_minor == verification.amount_minor
        && payment.currency.eq_ignore_ascii_case(&verification.currency)
    {
        Ok(())
    } else {
        Err(FulfillmentError::AmountMismatch {
            expected_minor: payment.amount_minor,
            expected_currency: payment.currency.clone(),
            actual_minor: verification.amount_minor,
            actual_currency: verification.currency.clone(),
        })
    }
}

/// Applies a provider verification to our records
pub async fn settle(
    pool: &PgPool,
    content: &ContentRepository,
    verification: &PaymentVerification,
) -> Result<Settlement, FulfillmentError> {
    match verification.status {
        VerificationStatus::Succeeded => {
            let (enrollment, created) = fulfill_payment(pool, content, verification).await?;
            Ok(Settlement::Fulfilled {
                enrollment,
                created,
            })
        }
        VerificationStatus::Failed => {
            let reason = verification
                .failure_reason
                .clone()
                .unwrap_or_else(|| "Payment failed".to_string());
            record_failure(pool, verification, &reason).await?;
            Ok(Settlement::Failed { reason })
        }
        VerificationStatus::Pending => Ok(Settlement::Pending),
    }
}

/// Creates the enrollment and progress for a successful payment
///
/// Idempotent per `(provider, reference)`: returns the existing enrollment
/// with `created = false` when the payment was already fulfilled.
pub async fn fulfill_payment(
    pool: &PgPool,
    content: &ContentRepository,
    verification: &PaymentVerification,
) -> Result<(Enrollment, bool), FulfillmentError> {
    if !verification.is_success() {
        return Err(FulfillmentError::NotSucceeded);
    }

    let provider = verification.provider;
    let reference = verification.reference.as_str();

    let mut tx = pool.begin().await?;

    let payment = PaymentLog::find_by_reference(&mut tx, provider, reference)
        .await?
        .ok_or_else(|| FulfillmentError::PaymentNotFound {
            provider,
            reference: reference.to_string(),
        })?;

    if payment.status == PaymentStatus::Refunded {
        return Err(FulfillmentError::PaymentRefunded);
    }

    if let Some(existing) = Enrollment::find_by_payment_reference(&mut tx, provider, reference).await? {
        tx.commit().await?;
        return Ok((existing, false));
    }

    if let Err(mismatch) = check_amount(&payment, verification) {
        warn!(
            provider = %provider,
            reference = %reference,
            error = %mismatch,
            "Verified amount does not match payment"
        );
        PaymentLog::mark_failed(&mut tx, payment.id, &mismatch.to_string(), verification.raw.clone())
            .await?;
        tx.commit().await?;
        return Err(mismatch);
    }

    let course = content.course(&payment.course_slug).await;
    let (course_title, outline) = match &course {
        Some(course) => (course.title.clone(), outline_to_progress(course)),
        None => {
            warn!(
                course_slug = %payment.course_slug,
                reference = %reference,
                "Paid course no longer exists, enrolling without an outline"
            );
            (payment.course_slug.clone(), Vec::new())
        }
    };

    let user_id = match payment.user_id {
        Some(id) => Some(id),
        None => User::find_by_email(pool, &payment.donor_email)
            .await?
            .map(|u| u.id),
    };

    let enrollment = Enrollment::create(
        &mut tx,
        CreateEnrollment {
            user_id,
            donor_name: payment.donor_name.clone(),
            donor_email: payment.donor_email.clone(),
            course_slug: payment.course_slug.clone(),
            course_title,
            amount_minor: payment.amount_minor,
            currency: payment.currency.clone(),
            provider,
            payment_reference: reference.to_string(),
            status: EnrollmentStatus::Active,
            expires_at: None,
        },
    )
    .await?;

    CourseProgress::create(&mut tx, enrollment.id, &enrollment.course_slug, outline).await?;

    PaymentLog::mark_success(&mut tx, payment.id, enrollment.id, verification.raw.clone())
        .await?
        .ok_or(FulfillmentError::PaymentRefunded)?;

    tx.commit().await?;

    info!(
        enrollment_id = %enrollment.id,
        provider = %provider,
        reference = %reference,
        course_slug = %enrollment.course_slug,
        "Payment fulfilled"
    );

    Ok((enrollment, true))
}

/// Marks a pending payment as failed
pub async fn record_failure(
    pool: &PgPool,
    verification: &PaymentVerification,
    reason: &str,
) -> Result<Option<PaymentLog>, FulfillmentError> {
    let mut tx = pool.begin().await?;

    let payment = PaymentLog::find_by_reference(&mut tx, verification.provider, &verification.reference)
        .await?
        .ok_or_else(|| FulfillmentError::PaymentNotFound {
            provider: verification.provider,
            reference: verification.reference.clone(),
        })?;

    let updated =
        PaymentLog::mark_failed(&mut tx, payment.id, reason, verification.raw.clone()).await?;
    tx.commit().await?;

    if updated.is_some() {
        info!(
            provider = %verification.provider,
            reference = %verification.reference,
            reason = %reason,
            "Payment failed"
        );
    }

    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn payment(amount_minor: i64, currency: &str) -> PaymentLog {
        PaymentLog {
            id: Uuid::new_v4(),
            provider: PaymentProvider::Paystack,
            reference: "knd_abc".to_string(),
            amount_minor,
            currency: currency.to_string(),
            status: PaymentStatus::Pending,
            donor_name: "Ada".to_string(),
            donor_email: "ada@example.org".to_string(),
            course_slug: "digital-literacy".to_string(),
            user_id: None,
            enrollment_id: None,
            gateway_response: json!({}),
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn verification(amount_minor: i64, currency: &str) -> PaymentVerification {
        PaymentVerification {
            provider: PaymentProvider::Paystack,
            reference: "knd_abc".to_string(),
            status: VerificationStatus::Succeeded,
            amount_minor,
            currency: currency.to_string(),
            failure_reason: None,
            raw: json!({}),
        }
    }

    #[test]
    fn test_matching_amount_passes() {
        assert!(check_amount(&payment(500_000, "NGN"), &verification(500_000, "ngn")).is_ok());
    }

    #[test]
    fn test_underpayment_is_rejected() {
        let err = check_amount(&payment(500_000, "NGN"), &verification(5_000, "NGN")).unwrap_err();
        assert!(matches!(
            err,
            FulfillmentError::AmountMismatch {
                expected_minor: 500_000,
                actual_minor: 5_000,
                ..
            }
        ));
    }

    #[test]
    fn test_currency_swap_is_rejected() {
        assert!(check_amount(&payment(5_000, "USD"), &verification(5_000, "NGN")).is_err());
    }

    #[test]
    fn test_settlement_serializes_with_status_tag() {
        let json = serde_json::to_value(Settlement::Failed {
            reason: "Declined".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "Declined");

        assert_eq!(serde_json::to_value(Settlement::Pending).unwrap()["status"], "pending");
    }
}
