//! Role checks
//!
//! Kindred has three fixed roles ordered by privilege:
//! `student < instructor < admin`. Staff (instructors and admins) can read
//! any enrollment; only admins change state that affects money or accounts.

use uuid::Uuid;

use super::middleware::AuthContext;
use crate::models::user::Role;

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    /// Caller's role is below the required one
    #[error("Insufficient permissions: requires {required}, has {actual}")]
    InsufficientRole { required: Role, actual: Role },

    /// Caller does not own the resource and is not staff
    #[error("Not authorized to access this resource")]
    NotAuthorized,
}

/// Requires `required` or a more privileged role
pub fn require_role(auth: &AuthContext, required: Role) -> Result<(), AuthzError> {
    if !auth.role.has_permission(required) {
        return Err(AuthzError::InsufficientRole {
            required,
            actual: auth.role,
        });
    }

    Ok(())
}

/// Requires the admin role
pub fn require_admin(auth: &AuthContext) -> Result<(), AuthzError> {
    require_role(auth, Role::Admin)
}

/// Allows the owning user or any staff member
///
/// `owner_id` is `None` for donor-only records that have not been claimed by
/// an account yet; those are staff-only until claimed.
pub fn require_self_or_staff(auth: &AuthContext, owner_id: Option<Uuid>) -> Result<(), AuthzError> {
    if owner_id == Some(auth.user_id) || auth.is_staff() {
        return Ok(());
    }

    Err(AuthzError::NotAuthorized)
}

/// Allows only the owning user or an admin (writes)
pub fn require_self_or_admin(auth: &AuthContext, owner_id: Option<Uuid>) -> Result<(), AuthzError> {
    if owner_id == Some(auth.user_id) || auth.is_admin() {
        return Ok(());
    }

    Err(AuthzError::NotAuthorized)
}
