/// Error handling for the API server
///
/// This module provides a unified error type that maps to HTTP responses.
/// All handlers should return `Result<T, ApiError>` which automatically
/// converts to appropriate HTTP status codes. Domain errors from
/// `kindred-shared` convert with `?`.
///
/// # Example
///
/// ```
/// use kindred_api::error::{ApiError, ApiResult};
/// use axum::Json;
/// use serde_json::json;
///
/// async fn handler(slug: String) -> ApiResult<Json<serde_json::Value>> {
///     if slug.is_empty() {
///         return Err(ApiError::NotFound("Course not found".to_string()));
///     }
///     Ok(Json(json!({ "slug": slug })))
/// }
/// ```

use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use kindred_shared::{
    auth::{
        authorization::AuthzError,
        jwt::JwtError,
        middleware::AuthError,
        password::PasswordError,
    },
    certificate::CertificateError,
    donation::DonationError,
    exchange::ExchangeError,
    fulfillment::FulfillmentError,
    payments::PaymentError,
    progress::ProgressError,
};
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Unauthorized (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict (409) - e.g., duplicate email, certificate not yet earned
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Unprocessable entity (422) - validation errors
    #[error("Validation failed: {} errors", .0.len())]
    ValidationError(Vec<ValidationErrorDetail>),

    /// Too many requests (429)
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded { retry_after: u64, message: String },

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Upstream service failed (502) - payment gateway, rate API
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Service unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Validation error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorDetail {
    /// Field that failed validation
    pub field: String,

    /// Error message
    pub message: String,
}

impl ValidationErrorDetail {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl ApiError {
    /// Single-field validation failure
    pub fn invalid_field(field: &str, message: impl Into<String>) -> Self {
        ApiError::ValidationError(vec![ValidationErrorDetail::new(field, message)])
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "bad_request", "unauthorized")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationErrorDetail>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        };

        let (status, error_code, message, details) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::ValidationError(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                "Request validation failed".to_string(),
                Some(errors),
            ),
            ApiError::RateLimitExceeded { message, .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limit_exceeded",
                message,
                None,
            ),
            ApiError::InternalError(msg) => {
                // Log internal errors but don't expose details to clients
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            ApiError::BadGateway(msg) => {
                tracing::warn!(error = %msg, "Upstream service failed");
                (
                    StatusCode::BAD_GATEWAY,
                    "bad_gateway",
                    "An upstream service failed, please try again".to_string(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: error_code.to_string(),
            message,
            details,
        });

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert("Retry-After", HeaderValue::from(seconds));
        }
        response
    }
}

/// Convert sqlx errors to API errors
impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                // Check for unique constraint violations
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("email") {
                        return ApiError::Conflict("Email already exists".to_string());
                    }
                    return ApiError::Conflict(format!("Constraint violation: {}", constraint));
                }

                // Other database errors are internal
                ApiError::InternalError(format!("Database error: {}", db_err))
            }
            sqlx::Error::PoolTimedOut => {
                ApiError::ServiceUnavailable("Database is busy, please retry".to_string())
            }
            _ => ApiError::InternalError(format!("Database error: {}", err)),
        }
    }
}

/// Convert request validation errors to API errors
impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        let errors = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| ValidationErrorDetail {
                    field: field.to_string(),
                    message: error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Validation failed".to_string()),
                })
            })
            .collect();
        ApiError::ValidationError(errors)
    }
}

/// Convert auth errors to API errors
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidFormat(msg) => ApiError::BadRequest(msg),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

/// Convert authorization errors to API errors
impl From<AuthzError> for ApiError {
    fn from(err: AuthzError) -> Self {
        match err {
            AuthzError::InsufficientRole { .. } => {
                ApiError::Forbidden("Insufficient permissions".to_string())
            }
            AuthzError::NotAuthorized => {
                ApiError::Forbidden("Not authorized to access this resource".to_string())
            }
        }
    }
}

/// Convert password errors to API errors
impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::InternalError(format!("Password operation failed: {}", err))
    }
}

/// Convert JWT errors to API errors
impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => ApiError::Unauthorized("Token expired".to_string()),
            JwtError::InvalidIssuer => ApiError::Unauthorized("Invalid token issuer".to_string()),
            JwtError::ResetTokenStale => {
                ApiError::BadRequest("Password reset token has already been used".to_string())
            }
            JwtError::CreateError(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized(format!("Invalid token: {}", err)),
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Http(_) | PaymentError::Api { .. } => ApiError::BadGateway(err.to_string()),
            PaymentError::Rejected { message, .. } => ApiError::BadRequest(message),
            PaymentError::UnknownProvider(_)
            | PaymentError::NotConfigured(_)
            | PaymentError::UnsupportedCurrency { .. } => ApiError::BadRequest(err.to_string()),
            PaymentError::NotFound(reference) => {
                ApiError::NotFound(format!("Payment {} not found", reference))
            }
            PaymentError::InvalidSignature(msg) => {
                ApiError::Unauthorized(format!("Invalid webhook signature: {}", msg))
            }
            PaymentError::Config(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<DonationError> for ApiError {
    fn from(err: DonationError) -> Self {
        let field = match err {
            DonationError::UnsupportedCurrency(_) => "currency",
            DonationError::MissingAmount
            | DonationError::AmountTooSmall { .. }
            | DonationError::AmountTooLarge { .. } => "amount_minor",
        };
        ApiError::invalid_field(field, err.to_string())
    }
}

impl From<ProgressError> for ApiError {
    fn from(err: ProgressError) -> Self {
        let field = match err {
            ProgressError::UnknownModule(_) => "module_key",
            ProgressError::UnknownLesson { .. } => "lesson_key",
            ProgressError::NegativeTime => "time_spent_seconds",
        };
        ApiError::invalid_field(field, err.to_string())
    }
}

impl From<ExchangeError> for ApiError {
    fn from(err: ExchangeError) -> Self {
        match err {
            ExchangeError::InvalidCurrency(_) => ApiError::invalid_field("currency", err.to_string()),
            ExchangeError::MissingRate { .. } => ApiError::NotFound(err.to_string()),
            ExchangeError::Http(_) | ExchangeError::Api { .. } | ExchangeError::Upstream(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::PaymentNotFound { .. } => ApiError::NotFound(err.to_string()),
            FulfillmentError::AmountMismatch { .. } => ApiError::Conflict(
                "Paid amount does not match the donation; the payment was not accepted".to_string(),
            ),
            FulfillmentError::PaymentRefunded | FulfillmentError::NotSucceeded => {
                ApiError::Conflict(err.to_string())
            }
            FulfillmentError::Database(e) => e.into(),
        }
    }
}

impl From<CertificateError> for ApiError {
    fn from(err: CertificateError) -> Self {
        match err {
            CertificateError::NotEligible { .. } | CertificateError::EnrollmentCancelled => {
                ApiError::Conflict(err.to_string())
            }
            CertificateError::ProgressMissing => ApiError::NotFound(err.to_string()),
            CertificateError::CodeSpaceExhausted => ApiError::InternalError(err.to_string()),
            CertificateError::Database(e) => e.into(),
        }
    }
}
