/// Middleware modules for the API server
///
/// - `client_ip`: Caller address behind trusted proxies
/// - `security`: Security response headers
/// - `rate_limit`: Redis token bucket for auth and donation routes

pub mod client_ip;
pub mod rate_limit;
pub mod security;
