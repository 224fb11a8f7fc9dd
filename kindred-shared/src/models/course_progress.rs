/// Course progress model
///
/// One row per enrollment. The lesson tree is stored as JSONB; the summary
/// columns (`overall_progress`, `total_time_spent_seconds`,
/// `certificate_eligible`) are always recomputed from it with
/// [`crate::progress::summarize`] before a write, never taken from clients.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE course_progress (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     enrollment_id UUID NOT NULL UNIQUE REFERENCES enrollments(id) ON DELETE CASCADE,
///     course_slug VARCHAR(255) NOT NULL,
///     modules JSONB NOT NULL DEFAULT '[]',
///     overall_progress INTEGER NOT NULL DEFAULT 0,
///     total_time_spent_seconds BIGINT NOT NULL DEFAULT 0,
///     certificate_eligible BOOLEAN NOT NULL DEFAULT FALSE,
///     certificate_issued BOOLEAN NOT NULL DEFAULT FALSE,
///     certificate_code VARCHAR(32),
///     certificate_issued_at TIMESTAMPTZ,
///     last_accessed_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::progress::summarize;

/// Completion state of one lesson
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonProgress {
    pub lesson_key: String,
    pub title: String,
    pub completed: bool,

    /// First time the lesson was marked complete
    #[serde(default)]
    pub completion_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub time_spent_seconds: i64,
}

/// Lessons of one course module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub module_key: String,
    pub title: String,
    pub lessons: Vec<LessonProgress>,
}

/// Progress record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseProgress {
    pub id: Uuid,
    pub enrollment_id: Uuid,
    pub course_slug: String,
    pub modules: Json<Vec<ModuleProgress>>,

    /// 0 to 100, floor of completed / total
    pub overall_progress: i32,

    pub total_time_spent_seconds: i64,
    pub certificate_eligible: bool,
    pub certificate_issued: bool,
    pub certificate_code: Option<String>,
    pub certificate_issued_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const PROGRESS_COLUMNS: &str = "id, enrollment_id, course_slug, modules, overall_progress, \
     total_time_spent_seconds, certificate_eligible, certificate_issued, certificate_code, \
     certificate_issued_at, last_accessed_at, created_at, updated_at";

impl CourseProgress {
    /// Inserts the progress row for a new enrollment
    pub async fn create(
        conn: &mut PgConnection,
        enrollment_id: Uuid,
        course_slug: &str,
        modules: Vec<ModuleProgress>,
    ) -> Result<Self, sqlx::Error> {
        let summary = summarize(&modules);
        let query = format!(
            "INSERT INTO course_progress (enrollment_id, course_slug, modules, overall_progress,
                                          total_time_spent_seconds, certificate_eligible)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            PROGRESS_COLUMNS
        );

        sqlx::query_as::<_, CourseProgress>(&query)
            .bind(enrollment_id)
            .bind(course_slug)
            .bind(Json(modules))
            .bind(summary.overall_progress)
            .bind(summary.total_time_spent_seconds)
            .bind(summary.certificate_eligible)
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_enrollment(
        pool: &PgPool,
        enrollment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM course_progress WHERE enrollment_id = $1",
            PROGRESS_COLUMNS
        );

        sqlx::query_as::<_, CourseProgress>(&query)
            .bind(enrollment_id)
            .fetch_optional(pool)
            .await
    }

    /// Loads and row-locks the progress for a read-modify-write
    pub async fn find_by_enrollment_for_update(
        conn: &mut PgConnection,
        enrollment_id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM course_progress WHERE enrollment_id = $1 FOR UPDATE",
            PROGRESS_COLUMNS
        );

        sqlx::query_as::<_, CourseProgress>(&query)
            .bind(enrollment_id)
            .fetch_optional(conn)
            .await
    }

    /// Writes a new lesson tree and its recomputed summary
    pub async fn save_lessons(
        conn: &mut PgConnection,
        enrollment_id: Uuid,
        modules: Vec<ModuleProgress>,
    ) -> Result<Option<Self>, sqlx::Error> {
        let summary = summarize(&modules);
        let query = format!(
            "UPDATE course_progress
             SET modules = $2,
                 overall_progress = $3,
                 total_time_spent_seconds = $4,
                 certificate_eligible = $5,
                 last_accessed_at = NOW(),
                 updated_at = NOW()
             WHERE enrollment_id = $1
             RETURNING {}",
            PROGRESS_COLUMNS
        );

        sqlx::query_as::<_, CourseProgress>(&query)
            .bind(enrollment_id)
            .bind(Json(modules))
            .bind(summary.overall_progress)
            .bind(summary.total_time_spent_seconds)
            .bind(summary.certificate_eligible)
            .fetch_optional(conn)
            .await
    }

    /// Records certificate issuance
    ///
    /// Only applies to eligible rows without a certificate, so a concurrent
    /// second issuance returns `None`.
    pub async fn mark_certificate_issued(
        conn: &mut PgConnection,
        enrollment_id: Uuid,
        code: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE course_progress
             SET certificate_issued = TRUE,
                 certificate_code = $2,
                 certificate_issued_at = NOW(),
                 updated_at = NOW()
             WHERE enrollment_id = $1
               AND certificate_eligible
               AND NOT certificate_issued
             RETURNING {}",
            PROGRESS_COLUMNS
        );

        sqlx::query_as::<_, CourseProgress>(&query)
            .bind(enrollment_id)
            .bind(code)
            .fetch_optional(conn)
            .await
    }
}
