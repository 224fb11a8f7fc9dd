/// Database models for Kindred
///
/// Each model owns its queries. Functions that must run inside the
/// fulfillment or certificate transactions take a `&mut PgConnection`; the
/// rest take the pool.
///
/// # Models
///
/// - `user`: accounts and roles
/// - `enrollment`: course access granted by a donation
/// - `course_progress`: per-enrollment lesson completion
/// - `payment_log`: one row per payment attempt
/// - `audit_log`: best-effort activity trail
///
/// # Example
///
/// ```no_run
/// use kindred_shared::models::user::{CreateUser, Role, User};
/// use kindred_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let user = User::create(&pool, CreateUser {
///     email: "ada@example.org".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     name: Some("Ada".to_string()),
///     role: Role::Student,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod audit_log;
pub mod course_progress;
pub mod enrollment;
pub mod payment_log;
pub mod user;
