/// Audit log model
///
/// Rows are written by [`crate::audit::AuditLogger`] in the background and
/// nothing reads them back except the admin listing.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,

    /// Dotted action name, e.g. `donation.completed`
    pub action: String,

    pub actor_id: Option<Uuid>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAuditLog {
    pub action: String,
    pub actor_id: Option<Uuid>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
    pub metadata: JsonValue,
    pub ip_address: Option<String>,
}

impl AuditLog {
    pub async fn create(pool: &PgPool, data: CreateAuditLog) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (action, actor_id, subject_type, subject_id, metadata, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, action, actor_id, subject_type, subject_id, metadata, ip_address, created_at
            "#,
        )
        .bind(data.action)
        .bind(data.actor_id)
        .bind(data.subject_type)
        .bind(data.subject_id)
        .bind(data.metadata)
        .bind(data.ip_address)
        .fetch_one(pool)
        .await
    }

    /// Lists entries, newest first, optionally filtered by action
    pub async fn list(
        pool: &PgPool,
        action: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, action, actor_id, subject_type, subject_id, metadata, ip_address, created_at
            FROM audit_logs
            WHERE ($1::TEXT IS NULL OR action = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(action)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }
}
