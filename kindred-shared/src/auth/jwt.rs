//! JWT token generation and validation
//!
//! Tokens are HS256-signed and carry the user's id and role, so handlers can
//! authorize without a database round trip.
//!
//! # Token Types
//!
//! - **Access** (24h): sent as `Authorization: Bearer` on API calls
//! - **Refresh** (30d): exchanged for a new access token
//! - **PasswordReset** (1h): carries a fingerprint of the password hash it was
//!   issued against, so it stops validating once the password changes
//!
//! # Example
//!
//! ```
//! use kindred_shared::auth::jwt::{create_token, validate_access_token, Claims, TokenType};
//! use kindred_shared::models::user::Role;
//! use uuid::Uuid;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let user_id = Uuid::new_v4();
//! let claims = Claims::new(user_id, Role::Student, TokenType::Access);
//! let token = create_token(&claims, "a-secret-that-is-at-least-32-bytes!")?;
//!
//! let validated = validate_access_token(&token, "a-secret-that-is-at-least-32-bytes!")?;
//! assert_eq!(validated.sub, user_id);
//! # Ok(())
//! # }
//! ```

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::user::{Role, User};

/// Issuer claim stamped on every token
pub const ISSUER: &str = "kindred";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),

    /// Failed to validate token
    #[error("Failed to validate token: {0}")]
    ValidationError(String),

    /// Token has expired
    #[error("Token has expired")]
    Expired,

    /// Token was issued by someone else
    #[error("Invalid issuer")]
    InvalidIssuer,

    /// Token is valid but of the wrong kind for this use
    #[error("Expected {expected} token, got {actual}")]
    WrongTokenType {
        expected: &'static str,
        actual: &'static str,
    },

    /// Reset token no longer matches the account's password
    #[error("Password reset token has already been used")]
    ResetTokenStale,
}

/// Token type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived API token
    Access,

    /// Long-lived token used to mint access tokens
    Refresh,

    /// One-hour token emailed for password resets
    PasswordReset,
}

impl TokenType {
    /// Gets default expiration duration for token type
    pub fn default_expiration(&self) -> Duration {
        match self {
            TokenType::Access => Duration::hours(24),
            TokenType::Refresh => Duration::days(30),
            TokenType::PasswordReset => Duration::hours(1),
        }
    }

    /// Gets token type as string
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
            TokenType::PasswordReset => "password_reset",
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    /// Issuer - always "kindred"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// Role at the time of issue
    pub role: Role,

    /// Token type
    pub token_type: TokenType,

    /// Password hash fingerprint (reset tokens only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pwd: Option<String>,
}

impl Claims {
    /// Creates new claims with the default expiration for `token_type`
    pub fn new(user_id: Uuid, role: Role, token_type: TokenType) -> Self {
        Self::with_expiration(user_id, role, token_type, token_type.default_expiration())
    }

    /// Creates claims with a custom expiration
    pub fn with_expiration(
        user_id: Uuid,
        role: Role,
        token_type: TokenType,
        expires_in: Duration,
    ) -> Self {
        let now = Utc::now();

        Self {
            sub: user_id,
            iss: ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
            nbf: now.timestamp(),
            role,
            token_type,
            pwd: None,
        }
    }
}

/// Signs claims into a token string
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    let header = Header::new(Algorithm::HS256);
    let key = EncodingKey::from_secret(secret.as_bytes());

    encode(&header, claims, &key)
        .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
}

/// Validates signature, expiry, not-before and issuer, returning the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = 0;

    let data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        _ => JwtError::ValidationError(format!("Token validation failed: {}", e)),
    })?;

    Ok(data.claims)
}

fn validate_typed(token: &str, secret: &str, expected: TokenType) -> Result<Claims, JwtError> {
    let claims = validate_token(token, secret)?;

    if claims.token_type != expected {
        return Err(JwtError::WrongTokenType {
            expected: expected.as_str(),
            actual: claims.token_type.as_str(),
        });
    }

    Ok(claims)
}

/// Validates an access token
pub fn validate_access_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Access)
}

/// Validates a refresh token
pub fn validate_refresh_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    validate_typed(token, secret, TokenType::Refresh)
}

/// Exchanges a refresh token for a new access token
///
/// The role is copied from the refresh token; a role change takes effect at
/// the next login.
pub fn refresh_access_token(refresh_token: &str, secret: &str) -> Result<String, JwtError> {
    let refresh = validate_refresh_token(refresh_token, secret)?;
    let access = Claims::new(refresh.sub, refresh.role, TokenType::Access);
    create_token(&access, secret)
}

/// Access + refresh pair issued on register and login
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Issues an access/refresh pair for a user
pub fn issue_token_pair(user: &User, secret: &str) -> Result<TokenPair, JwtError> {
    let access = Claims::new(user.id, user.role, TokenType::Access);
    let refresh = Claims::new(user.id, user.role, TokenType::Refresh);

    Ok(TokenPair {
        access_token: create_token(&access, secret)?,
        refresh_token: create_token(&refresh, secret)?,
    })
}

/// Short fingerprint of a password hash, embedded in reset tokens
pub fn password_fingerprint(password_hash: &str) -> String {
    let digest = Sha256::digest(password_hash.as_bytes());
    hex::encode(&digest[..8])
}

/// Creates a password reset token bound to the user's current password hash
pub fn create_password_reset_token(user: &User, secret: &str) -> Result<String, JwtError> {
    let mut claims = Claims::new(user.id, user.role, TokenType::PasswordReset);
    claims.pwd = Some(password_fingerprint(&user.password_hash));
    create_token(&claims, secret)
}

/// Validates a reset token against the account's current password hash
///
/// Returns `JwtError::ResetTokenStale` when the password has changed since the
/// token was issued, which makes reset tokens single-use.
pub fn validate_password_reset_token(
    token: &str,
    secret: &str,
    current_password_hash: &str,
) -> Result<Claims, JwtError> {
    let claims = validate_typed(token, secret, TokenType::PasswordReset)?;

    match claims.pwd.as_deref() {
        Some(fingerprint) if fingerprint == password_fingerprint(current_password_hash) => {
            Ok(claims)
        }
        _ => Err(JwtError::ResetTokenStale),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn user(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            email: "ada@example.org".to_string(),
            password_hash: "$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA".to_string(),
            name: Some("Ada".to_string()),
            role,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            last_login_at: None,
        }
    }

    #[test]
    fn test_token_type_expiration() {
        assert_eq!(TokenType::Access.default_expiration(), Duration::hours(24));
        assert_eq!(TokenType::Refresh.default_expiration(), Duration::days(30));
        assert_eq!(TokenType::PasswordReset.default_expiration(), Duration::hours(1));
    }

    #[test]
    fn test_create_and_validate_token() {
        let user_id = Uuid::new_v4();
        let claims = Claims::new(user_id, Role::Instructor, TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        let validated = validate_token(&token, SECRET).unwrap();
        assert_eq!(validated.sub, user_id);
        assert_eq!(validated.role, Role::Instructor);
        assert_eq!(validated.iss, ISSUER);
        assert!(validated.pwd.is_none());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let claims = Claims::new(Uuid::new_v4(), Role::Student, TokenType::Access);
        let token = create_token(&claims, SECRET).unwrap();

        assert!(validate_token(&token, "another-secret-key-at-least-32-bytes").is_err());
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::with_expiration(
            Uuid::new_v4(),
            Role::Student,
            TokenType::Access,
            Duration::seconds(-3600),
        );
        assert!(claims.exp < Utc::now().timestamp());

        let token = create_token(&claims, SECRET).unwrap();
        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::Expired)));
    }

    #[test]
    fn test_token_types_are_not_interchangeable() {
        let refresh = create_token(
            &Claims::new(Uuid::new_v4(), Role::Student, TokenType::Refresh),
            SECRET,
        )
        .unwrap();
        let access = create_token(
            &Claims::new(Uuid::new_v4(), Role::Student, TokenType::Access),
            SECRET,
        )
        .unwrap();

        assert!(validate_access_token(&refresh, SECRET).is_err());
        assert!(validate_refresh_token(&access, SECRET).is_err());
        assert!(refresh_access_token(&access, SECRET).is_err());
    }

    #[test]
    fn test_refresh_keeps_subject_and_role() {
        let admin = user(Role::Admin);
        let pair = issue_token_pair(&admin, SECRET).unwrap();

        let new_access = refresh_access_token(&pair.refresh_token, SECRET).unwrap();
        let claims = validate_access_token(&new_access, SECRET).unwrap();

        assert_eq!(claims.sub, admin.id);
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_reset_token_is_bound_to_password_hash() {
        let mut student = user(Role::Student);
        let token = create_password_reset_token(&student, SECRET).unwrap();

        let claims = validate_password_reset_token(&token, SECRET, &student.password_hash).unwrap();
        assert_eq!(claims.sub, student.id);

        student.password_hash = "$argon2id$v=19$m=19456,t=2,p=1$bmV3$bmV3aGFzaA".to_string();
        assert!(matches!(
            validate_password_reset_token(&token, SECRET, &student.password_hash),
            Err(JwtError::ResetTokenStale)
        ));
    }

    #[test]
    fn test_access_token_cannot_reset_password() {
        let student = user(Role::Student);
        let pair = issue_token_pair(&student, SECRET).unwrap();

        assert!(matches!(
            validate_password_reset_token(&pair.access_token, SECRET, &student.password_hash),
            Err(JwtError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        let a = password_fingerprint("hash-a");
        assert_eq!(a, password_fingerprint("hash-a"));
        assert_ne!(a, password_fingerprint("hash-b"));
        assert_eq!(a.len(), 16);
    }
}
