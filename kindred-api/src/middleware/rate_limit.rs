/// Rate limiting middleware for auth and donation endpoints
///
/// Token bucket per client IP and route group, with state in Redis so every
/// API instance shares the same buckets. Without `REDIS_URL` the layer is a
/// pass-through.
///
/// # Limits
///
/// - **Auth** (login, register, password reset): 10 requests/minute
/// - **Donations** (create, verify): 30 requests/minute
///
/// # Storage
///
/// Keys: `ratelimit:{group}:{ip}` (the resolved [`ClientIp`]), hash of
/// `tokens` and `last_refill`.
/// TTL: 2 minutes (auto-cleanup)
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Bucket capacity
/// - `X-RateLimit-Remaining`: Tokens remaining
/// - `Retry-After`: Seconds to wait (429 responses only)
///
/// Redis failures let the request through and are logged; a broken cache
/// must not take donations offline.

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::client_ip::ClientIp;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use redis::aio::ConnectionManager;

/// Lua token bucket: refill by elapsed time, then take one token
const TOKEN_BUCKET_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if not tokens then
    tokens = capacity
    last_refill = now
end

local elapsed = math.max(0, now - last_refill)
tokens = math.min(capacity, tokens + (elapsed * refill_rate))

if tokens >= 1 then
    tokens = tokens - 1
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {1, math.floor(tokens), 0}
else
    redis.call('HSET', key, 'tokens', tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 120)
    return {0, 0, math.ceil((1 - tokens) / refill_rate)}
end
"#;

/// Bucket parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    /// Maximum tokens in bucket (burst capacity)
    pub bucket_capacity: u32,

    /// Token refill rate (tokens per second)
    pub refill_rate: f64,
}

impl RateLimit {
    pub fn per_minute(requests: u32) -> Self {
        Self {
            bucket_capacity: requests,
            refill_rate: f64::from(requests) / 60.0,
        }
    }
}

/// Routes sharing a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteGroup {
    Auth,
    Donations,
}

impl RouteGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteGroup::Auth => "auth",
            RouteGroup::Donations => "donations",
        }
    }

    pub fn limit(&self) -> RateLimit {
        match self {
            RouteGroup::Auth => RateLimit::per_minute(10),
            RouteGroup::Donations => RateLimit::per_minute(30),
        }
    }
}

/// Result of rate limit check
#[derive(Debug)]
pub struct RateLimitResult {
    /// Whether request is allowed
    pub ok: bool,

    /// Tokens remaining
    pub remaining: u32,

    /// Seconds until a token is available (0 when allowed)
    pub retry_after: u64,
}

pub fn bucket_key(group: RouteGroup, ip: &str) -> String {
    format!("ratelimit:{}:{}", group.as_str(), ip)
}

/// Takes one token from the bucket at `key`
pub async fn check_rate_limit_redis(
    conn: &mut ConnectionManager,
    key: &str,
    limit: RateLimit,
) -> Result<RateLimitResult, redis::RedisError> {
    let result: Vec<i64> = redis::Script::new(TOKEN_BUCKET_SCRIPT)
        .key(key)
        .arg(limit.bucket_capacity)
        .arg(limit.refill_rate)
        .arg(Utc::now().timestamp())
        .invoke_async(conn)
        .await?;

    let field = |i: usize| result.get(i).copied().unwrap_or(0);

    Ok(RateLimitResult {
        ok: field(0) == 1,
        remaining: u32::try_from(field(1)).unwrap_or(0),
        retry_after: u64::try_from(field(2)).unwrap_or(1).max(1),
    })
}

/// Rate limiting middleware
///
/// Mounted with `from_fn_with_state((state, group), rate_limit_layer)`.
///
/// # Errors
///
/// - 429 Too Many Requests: bucket empty
pub async fn rate_limit_layer(
    State((state, group)): State<(AppState, RouteGroup)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(mut conn) = state.redis.clone() else {
        return Ok(next.run(request).await);
    };

    let ip = request
        .extensions()
        .get::<ClientIp>()
        .copied()
        .unwrap_or_default()
        .bucket();
    let key = bucket_key(group, &ip);
    let limit = group.limit();

    let result = match check_rate_limit_redis(&mut conn, &key, limit).await {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(error = %e, group = group.as_str(), "Rate limit check failed, allowing request");
            return Ok(next.run(request).await);
        }
    };

    if !result.ok {
        tracing::info!(group = group.as_str(), ip = %ip, "Rate limit exceeded");
        return Err(ApiError::RateLimitExceeded {
            retry_after: result.retry_after,
            message: format!(
                "Too many requests. Try again in {} seconds",
                result.retry_after
            ),
        });
    }

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.bucket_capacity));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(result.remaining));

    Ok(response)
}
