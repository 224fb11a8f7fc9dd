//! Request authentication
//!
//! Extracts the bearer token from the `Authorization` header, validates it
//! and produces an [`AuthContext`]. The API server stores the context in
//! request extensions; routes that allow anonymous callers (donations) get
//! `None` when no header is sent.
//!
//! # Example
//!
//! ```no_run
//! use axum::http::HeaderMap;
//! use kindred_shared::auth::middleware::authenticate;
//!
//! let headers = HeaderMap::new();
//! let context = authenticate(&headers, "secret").unwrap();
//! assert!(context.is_none());
//! ```

use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::jwt::{validate_access_token, JwtError};
use crate::models::user::Role;

/// Authenticated caller, stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Authenticated user ID
    pub user_id: Uuid,

    /// Role carried by the access token
    pub role: Role,
}

impl AuthContext {
    /// Creates an auth context from validated token claims
    pub fn from_jwt(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Whether the caller is staff (instructor or admin)
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Instructor | Role::Admin)
    }

    /// Whether the caller is an admin
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Why a request's credentials were rejected
#[derive(Debug)]
pub enum AuthError {
    /// Authorization header is not a bearer token
    InvalidFormat(String),

    /// Token validation failed
    InvalidToken(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
            JwtError::InvalidIssuer => AuthError::InvalidToken("Invalid issuer".to_string()),
            other => AuthError::InvalidToken(format!("Invalid token: {}", other)),
        }
    }
}

/// Reads the bearer token from the `Authorization` header
///
/// Returns `Ok(None)` when the header is absent.
pub fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AuthError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| AuthError::InvalidFormat("Authorization header is not valid ASCII".to_string()))?;

    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Validates the request's bearer token, if any
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Option<AuthContext>, AuthError> {
    match bearer_token(headers)? {
        Some(token) => {
            let claims = validate_access_token(token, secret)?;
            Ok(Some(AuthContext::from_jwt(claims.sub, claims.role)))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::{create_token, Claims, TokenType};
    use axum::http::HeaderValue;

    const SECRET: &str = "middleware-test-secret-32-bytes-long!!";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_auth_context_roles() {
        let student = AuthContext::from_jwt(Uuid::new_v4(), Role::Student);
        let instructor = AuthContext::from_jwt(Uuid::new_v4(), Role::Instructor);
        let admin = AuthContext::from_jwt(Uuid::new_v4(), Role::Admin);

        assert!(!student.is_staff());
        assert!(instructor.is_staff() && !instructor.is_admin());
        assert!(admin.is_staff() && admin.is_admin());
    }

    #[test]
    fn test_missing_header_is_anonymous() {
        assert!(authenticate(&HeaderMap::new(), SECRET).unwrap().is_none());
    }

    #[test]
    fn test_non_bearer_header_is_rejected() {
        let headers = headers_with("Basic dXNlcjpwYXNz");
        assert!(matches!(
            authenticate(&headers, SECRET),
            Err(AuthError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_valid_token_yields_context() {
        let user_id = Uuid::new_v4();
        let token = create_token(&Claims::new(user_id, Role::Admin, TokenType::Access), SECRET).unwrap();
        let headers = headers_with(&format!("Bearer {}", token));

        let context = authenticate(&headers, SECRET).unwrap().unwrap();
        assert_eq!(context.user_id, user_id);
        assert_eq!(context.role, Role::Admin);
    }

    #[test]
    fn test_refresh_token_is_not_accepted_for_requests() {
        let token = create_token(
            &Claims::new(Uuid::new_v4(), Role::Student, TokenType::Refresh),
            SECRET,
        )
        .unwrap();
        let headers = headers_with(&format!("Bearer {}", token));

        assert!(matches!(
            authenticate(&headers, SECRET),
            Err(AuthError::InvalidToken(_))
        ));
    }
}
