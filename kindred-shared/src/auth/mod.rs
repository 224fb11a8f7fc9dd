//! Authentication and authorization
//!
//! # Modules
//!
//! - [`password`]: Argon2id password hashing and policy
//! - [`jwt`]: Access, refresh and password-reset tokens
//! - [`middleware`]: Bearer-token extraction into an [`middleware::AuthContext`]
//! - [`authorization`]: Role and ownership checks

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
