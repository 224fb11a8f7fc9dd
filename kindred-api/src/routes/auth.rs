/// Authentication endpoints
///
/// This module provides user authentication endpoints:
/// - Registration
/// - Login
/// - Token refresh
/// - Password reset
/// - Current user profile
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Refresh access token
/// - `POST /v1/auth/forgot-password` - Request a reset token
/// - `POST /v1/auth/reset-password` - Set a new password with a reset token
/// - `GET  /v1/auth/me` - Current user

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    middleware::client_ip::ClientIp,
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use kindred_shared::{
    audit::AuditEvent,
    auth::{jwt, middleware::AuthContext, password},
    models::{
        enrollment::Enrollment,
        user::{CreateUser, Role, User},
    },
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (will be validated for strength)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    /// Optional display name
    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    pub password: String,
}

/// Tokens plus the account they belong to
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,

    /// Access token (24h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,

    /// Donations made with this email before the account existed, now linked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claimed_enrollments: Option<u64>,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// Refresh token
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    /// New access token (24h)
    pub access_token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: String,

    /// Only present when `AUTH_EXPOSE_RESET_TOKENS` is on and the account exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

fn check_password_strength(password: &str) -> ApiResult<()> {
    password::validate_password_strength(password)
        .map_err(|e| ApiError::invalid_field("password", e))
}

/// Register a new user
///
/// New accounts are always students. Enrollments paid for earlier with the
/// same email (and no account) are attached to the new user.
///
/// # Endpoint
///
/// ```text
/// POST /v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "learner@example.org",
///   "password": "SecureP@ss123",
///   "name": "Ada Obi"
/// }
/// ```
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `409 Conflict`: Email already exists
pub async fn register(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;
    check_password_strength(&req.password)?;

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_string(),
            password_hash,
            name: req.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            role: Role::Student,
        },
    )
    .await?;

    let claimed = Enrollment::claim_by_email(&state.db, &user.email, user.id).await?;
    let tokens = jwt::issue_token_pair(&user, state.jwt_secret())?;

    tracing::info!(user_id = %user.id, claimed_enrollments = claimed, "User registered");
    state.audit.record(
        AuditEvent::new("user.registered")
            .with_actor(Some(user.id))
            .with_subject("user", user.id)
            .with_metadata(json!({ "claimed_enrollments": claimed }))
            .with_ip(client_ip.to_audit()),
    );

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            claimed_enrollments: Some(claimed),
        }),
    ))
}

/// Login endpoint
///
/// Authenticates a user and returns JWT tokens. Unknown emails and wrong
/// passwords produce the same error.
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid email or password".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        state.audit.record(
            AuditEvent::new("user.login_failed")
                .with_subject("user", user.id)
                .with_ip(client_ip.to_audit()),
        );
        return Err(invalid());
    }

    User::update_last_login(&state.db, user.id).await?;
    let tokens = jwt::issue_token_pair(&user, state.jwt_secret())?;

    state.audit.record(
        AuditEvent::new("user.login")
            .with_actor(Some(user.id))
            .with_subject("user", user.id)
            .with_ip(client_ip.to_audit()),
    );

    Ok(Json(AuthResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        claimed_enrollments: None,
    }))
}

/// Token refresh endpoint
///
/// Exchanges a refresh token for a new access token.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

/// Starts a password reset
///
/// Always answers 202 so the endpoint can't be used to probe for accounts.
/// No email is sent; in development the token is returned in the body.
pub async fn forgot_password(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<(StatusCode, Json<ForgotPasswordResponse>)> {
    req.validate()?;

    let mut reset_token = None;
    if let Some(user) = User::find_by_email(&state.db, req.email.trim()).await? {
        let token = jwt::create_password_reset_token(&user, state.jwt_secret())?;
        tracing::info!(user_id = %user.id, "Password reset requested");
        state.audit.record(
            AuditEvent::new("user.password_reset_requested")
                .with_subject("user", user.id)
                .with_ip(client_ip.to_audit()),
        );

        if state.config.jwt.expose_reset_tokens {
            reset_token = Some(token);
        }
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ForgotPasswordResponse {
            message: "If the account exists, a reset link has been issued".to_string(),
            reset_token,
        }),
    ))
}

/// Completes a password reset
///
/// The token is bound to the password it was issued against, so it stops
/// working once used.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid or expired token
/// - `400 Bad Request`: Token already used
/// - `422 Unprocessable Entity`: Weak password
pub async fn reset_password(
    State(state): State<AppState>,
    client_ip: ClientIp,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<StatusCode> {
    req.validate()?;
    check_password_strength(&req.password)?;

    let claims = jwt::validate_token(&req.token, state.jwt_secret())?;
    let user = User::find_by_id(&state.db, claims.sub)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid reset token".to_string()))?;

    jwt::validate_password_reset_token(&req.token, state.jwt_secret(), &user.password_hash)?;

    let password_hash = password::hash_password(&req.password)?;
    if !User::update_password(&state.db, user.id, &password_hash).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %user.id, "Password reset completed");
    state.audit.record(
        AuditEvent::new("user.password_reset")
            .with_actor(Some(user.id))
            .with_subject("user", user.id)
            .with_ip(client_ip.to_audit()),
    );

    Ok(StatusCode::NO_CONTENT)
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<Json<User>> {
    let user = User::find_by_id(&state.db, auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}
