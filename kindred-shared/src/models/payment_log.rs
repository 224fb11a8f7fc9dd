/// Payment log model
///
/// One row per payment attempt, written as `pending` when a donation is
/// initialized and settled by verification or webhook. Rows are never
/// deleted; refunds only change the status.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, PgPool};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::payments::PaymentProvider;

/// Payment attempt state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Success => "success",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "success" => Ok(PaymentStatus::Success),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(format!("Unknown payment status: {}", other)),
        }
    }
}

/// Payment attempt record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PaymentLog {
    pub id: Uuid,
    pub provider: PaymentProvider,

    /// Gateway reference, unique per provider
    pub reference: String,

    pub amount_minor: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub donor_name: String,
    pub donor_email: String,
    pub course_slug: String,
    pub user_id: Option<Uuid>,

    /// Enrollment created from this payment, once fulfilled
    pub enrollment_id: Option<Uuid>,

    /// Last raw gateway payload
    pub gateway_response: JsonValue,

    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for logging a new payment attempt
#[derive(Debug, Clone)]
pub struct CreatePaymentLog {
    pub provider: PaymentProvider,
    pub reference: String,
    pub amount_minor: i64,
    pub currency: String,
    pub donor_name: String,
    pub donor_email: String,
    pub course_slug: String,
    pub user_id: Option<Uuid>,
    pub gateway_response: JsonValue,
}

const PAYMENT_COLUMNS: &str = "id, provider, reference, amount_minor, currency, status, \
     donor_name, donor_email::TEXT AS donor_email, course_slug, user_id, enrollment_id, \
     gateway_response, failure_reason, created_at, updated_at";

impl PaymentLog {
    /// Inserts a `pending` payment attempt
    pub async fn create(pool: &PgPool, data: CreatePaymentLog) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO payment_logs (provider, reference, amount_minor, currency, donor_name,
                                       donor_email, course_slug, user_id, gateway_response)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(data.provider)
            .bind(data.reference)
            .bind(data.amount_minor)
            .bind(data.currency)
            .bind(data.donor_name)
            .bind(data.donor_email)
            .bind(data.course_slug)
            .bind(data.user_id)
            .bind(data.gateway_response)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {} FROM payment_logs WHERE id = $1", PAYMENT_COLUMNS);

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Loads and row-locks the attempt for a gateway reference
    pub async fn find_by_reference(
        conn: &mut PgConnection,
        provider: PaymentProvider,
        reference: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM payment_logs WHERE provider = $1 AND reference = $2 FOR UPDATE",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(provider)
            .bind(reference)
            .fetch_optional(conn)
            .await
    }

    /// Settles an attempt as paid and links its enrollment
    ///
    /// A previously failed attempt may still succeed (card retried on the
    /// hosted page). Refunded attempts are left alone.
    pub async fn mark_success(
        conn: &mut PgConnection,
        id: Uuid,
        enrollment_id: Uuid,
        gateway_response: JsonValue,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE payment_logs
             SET status = 'success',
                 enrollment_id = $2,
                 gateway_response = $3,
                 failure_reason = NULL,
                 updated_at = NOW()
             WHERE id = $1 AND status <> 'refunded'
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(id)
            .bind(enrollment_id)
            .bind(gateway_response)
            .fetch_optional(conn)
            .await
    }

    /// Records a failed verification for a pending attempt
    pub async fn mark_failed(
        conn: &mut PgConnection,
        id: Uuid,
        reason: &str,
        gateway_response: JsonValue,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE payment_logs
             SET status = 'failed',
                 failure_reason = $2,
                 gateway_response = $3,
                 updated_at = NOW()
             WHERE id = $1 AND status = 'pending'
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(id)
            .bind(reason)
            .bind(gateway_response)
            .fetch_optional(conn)
            .await
    }

    /// Marks a successful payment as refunded
    pub async fn mark_refunded(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE payment_logs
             SET status = 'refunded', updated_at = NOW()
             WHERE id = $1 AND status = 'success'
             RETURNING {}",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Lists attempts, newest first, optionally filtered by status
    pub async fn list(
        pool: &PgPool,
        status: Option<PaymentStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM payment_logs
             WHERE ($1::payment_status IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
            PAYMENT_COLUMNS
        );

        sqlx::query_as::<_, PaymentLog>(&query)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_through_strings() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(status.as_str().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PaymentStatus::Refunded).unwrap(),
            "\"refunded\""
        );
    }
}
