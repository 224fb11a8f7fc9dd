/// Enrollment model
///
/// An enrollment grants a donor access to one course. It is created by the
/// fulfillment transaction once a payment verifies, and is keyed by the
/// gateway reference so repeated verifications find the existing row.
///
/// # State Machine
///
/// ```text
/// pending → active ⇄ expired
///    ↘        ↓        ↙
///         cancelled
/// ```
///
/// `cancelled` is terminal.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payments::PaymentProvider;

/// Enrollment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "enrollment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EnrollmentStatus {
    /// Created but not yet paid
    Pending,

    /// Course content is accessible
    Active,

    /// Access window has lapsed
    Expired,

    /// Revoked (refund or admin action)
    Cancelled,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::Pending => "pending",
            EnrollmentStatus::Active => "active",
            EnrollmentStatus::Expired => "expired",
            EnrollmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EnrollmentStatus::Cancelled)
    }

    /// Checks if transition to target state is valid
    pub fn can_transition_to(&self, target: EnrollmentStatus) -> bool {
        if self.is_terminal() {
            return false;
        }

        match (self, target) {
            (EnrollmentStatus::Pending, EnrollmentStatus::Active) => true,
            (EnrollmentStatus::Pending, EnrollmentStatus::Cancelled) => true,

            (EnrollmentStatus::Active, EnrollmentStatus::Expired) => true,
            (EnrollmentStatus::Active, EnrollmentStatus::Cancelled) => true,

            // Renewal
            (EnrollmentStatus::Expired, EnrollmentStatus::Active) => true,
            // Refunds revoke lapsed access too
            (EnrollmentStatus::Expired, EnrollmentStatus::Cancelled) => true,

            _ => false,
        }
    }
}

impl fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnrollmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EnrollmentStatus::Pending),
            "active" => Ok(EnrollmentStatus::Active),
            "expired" => Ok(EnrollmentStatus::Expired),
            "cancelled" => Ok(EnrollmentStatus::Cancelled),
            other => Err(format!("Unknown enrollment status: {}", other)),
        }
    }
}

/// Enrollment record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Enrollment {
    pub id: Uuid,

    /// Owning account; `None` for donors who never registered
    pub user_id: Option<Uuid>,

    pub donor_name: String,
    pub donor_email: String,

    pub course_slug: String,
    pub course_title: String,

    /// Donated amount in minor units
    pub amount_minor: i64,

    /// ISO 4217 code, upper case
    pub currency: String,

    pub provider: PaymentProvider,

    /// Gateway reference this enrollment was paid with
    pub payment_reference: String,

    pub status: EnrollmentStatus,

    /// Set once a certificate is issued
    pub certificate_code: Option<String>,

    pub enrolled_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an enrollment
#[derive(Debug, Clone)]
pub struct CreateEnrollment {
    pub user_id: Option<Uuid>,
    pub donor_name: String,
    pub donor_email: String,
    pub course_slug: String,
    pub course_title: String,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: PaymentProvider,
    pub payment_reference: String,
    pub status: EnrollmentStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

const ENROLLMENT_COLUMNS: &str = "id, user_id, donor_name, donor_email::TEXT AS donor_email, \
     course_slug, course_title, amount_minor, currency, provider, payment_reference, status, \
     certificate_code, enrolled_at, expires_at, created_at, updated_at";

impl Enrollment {
    /// Whether the enrollment currently grants access to course content
    pub fn is_active(&self) -> bool {
        self.status == EnrollmentStatus::Active
    }

    /// Inserts an enrollment inside the caller's transaction
    pub async fn create(conn: &mut PgConnection, data: CreateEnrollment) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO enrollments (user_id, donor_name, donor_email, course_slug, course_title,
                                      amount_minor, currency, provider, payment_reference, status,
                                      expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {}",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(data.user_id)
            .bind(data.donor_name)
            .bind(data.donor_email)
            .bind(data.course_slug)
            .bind(data.course_title)
            .bind(data.amount_minor)
            .bind(data.currency)
            .bind(data.provider)
            .bind(data.payment_reference)
            .bind(data.status)
            .bind(data.expires_at)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM enrollments WHERE id = $1", ENROLLMENT_COLUMNS);

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds the enrollment paid with a gateway reference
    ///
    /// Takes a connection so fulfillment can check inside its transaction.
    pub async fn find_by_payment_reference(
        conn: &mut PgConnection,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM enrollments WHERE provider = $1 AND payment_reference = $2",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(provider)
            .bind(reference)
            .fetch_optional(conn)
            .await
    }

    /// Finds the enrollment carrying a certificate code
    pub async fn find_by_certificate_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM enrollments WHERE certificate_code = $1",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// Lists a user's enrollments, including unclaimed ones donated under
    /// the same email
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: Uuid,
        email: &str,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM enrollments
             WHERE user_id = $1 OR (user_id IS NULL AND donor_email = $2::citext)
             ORDER BY enrolled_at DESC",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(user_id)
            .bind(email)
            .fetch_all(pool)
            .await
    }

    /// Lists enrollments, newest first, optionally filtered by status
    pub async fn list(
        pool: &PgPool,
        status: Option<EnrollmentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM enrollments
             WHERE ($1::enrollment_status IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Moves an enrollment from `expected` to `target`
    ///
    /// Returns `None` when the row is gone or its status is no longer
    /// `expected`. Callers check [`EnrollmentStatus::can_transition_to`]
    /// first.
    pub async fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        expected: EnrollmentStatus,
        target: EnrollmentStatus,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE enrollments
             SET status = $3, updated_at = NOW()
             WHERE id = $1 AND status = $2
             RETURNING {}",
            ENROLLMENT_COLUMNS
        );

        sqlx::query_as::<_, Enrollment>(&query)
            .bind(id)
            .bind(expected)
            .bind(target)
            .fetch_optional(conn)
            .await
    }

    /// Stamps a certificate code
    ///
    /// Returns `false` without writing when the enrollment already has a code
    /// or another enrollment holds this one, so callers can retry with a
    /// fresh code inside the same transaction.
    pub async fn set_certificate_code(
        conn: &mut PgConnection,
        id: Uuid,
        code: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE enrollments
             SET certificate_code = $2, updated_at = NOW()
             WHERE id = $1
               AND certificate_code IS NULL
               AND NOT EXISTS (SELECT 1 FROM enrollments WHERE certificate_code = $2)",
        )
        .bind(id)
        .bind(code)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Attaches donor-only enrollments with a matching email to an account
    ///
    /// Returns the number of enrollments claimed.
    pub async fn claim_by_email(
        pool: &PgPool,
        email: &str,
        user_id: Uuid,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE enrollments
             SET user_id = $2, updated_at = NOW()
             WHERE user_id IS NULL AND donor_email = $1::citext",
        )
        .bind(email)
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use EnrollmentStatus::*;

        assert!(Pending.can_transition_to(Active));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(Expired));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Expired.can_transition_to(Active));
        assert!(Expired.can_transition_to(Cancelled));

        assert!(!Active.can_transition_to(Pending));
        assert!(!Active.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Expired));
    }

    #[test]
    fn test_cancelled_is_terminal() {
        use EnrollmentStatus::*;

        assert!(Cancelled.is_terminal());
        for target in [Pending, Active, Expired, Cancelled] {
            assert!(!Cancelled.can_transition_to(target));
        }
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("active".parse::<EnrollmentStatus>().unwrap(), EnrollmentStatus::Active);
        assert_eq!(EnrollmentStatus::Cancelled.to_string(), "cancelled");
        assert!("canceled".parse::<EnrollmentStatus>().is_err());
    }

    #[test]
    fn test_active_enrollment() {
        let owner = Uuid::new_v4();
        let enrollment = Enrollment {
            id: Uuid::new_v4(),
            user_id: Some(owner),
            donor_name: "Ada".to_string(),
            donor_email: "ada@example.org".to_string(),
            course_slug: "intro-to-coding".to_string(),
            course_title: "Intro to Coding".to_string(),
            amount_minor: 5_000,
            currency: "USD".to_string(),
            provider: PaymentProvider::Mock,
            payment_reference: "mock_abc".to_string(),
            status: EnrollmentStatus::Active,
            certificate_code: None,
            enrolled_at: Utc::now(),
            expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(enrollment.user_id, Some(owner));
        assert!(enrollment.is_active());
    }
}
