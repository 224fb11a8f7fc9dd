/// Configuration management for the API server
///
/// This module loads configuration from environment variables and provides
/// a type-safe configuration struct. Optional integrations (Redis, the CMS,
/// each payment gateway) are switched on by setting their variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `JWT_SECRET`: Secret key for JWT signing, at least 32 characters (required)
/// - `API_HOST` / `API_PORT`: Bind address (default: 0.0.0.0:8080)
/// - `CORS_ORIGINS`: Comma-separated origins, `*` for any (default: `*`)
/// - `APP_ENV`: `production` enables HSTS
/// - `PUBLIC_BASE_URL`: Used for certificate verification links
/// - `REDIS_URL`: Enables rate limiting
/// - `TRUSTED_PROXIES`: Comma-separated proxy IPs whose `X-Forwarded-For`
///   is honoured (default: none)
/// - `CMS_BASE_URL`, `CMS_DATASET`, `CMS_API_VERSION`, `CMS_TOKEN`
/// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`
/// - `PAYSTACK_SECRET_KEY`
/// - `FLUTTERWAVE_SECRET_KEY`, `FLUTTERWAVE_WEBHOOK_HASH`
/// - `PAYMENTS_MOCK_ENABLED`: Registers the mock gateway (default: true
///   outside production)
/// - `RUST_LOG`, `LOG_FORMAT`: Logging (see `main.rs`)
///
/// # Example
///
/// ```no_run
/// use kindred_api::config::Config;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}:{}", config.api.host, config.api.port);
/// # Ok(())
/// # }
/// ```

use kindred_shared::content::CmsConfig;
use kindred_shared::db::pool::DatabaseConfig;
use kindred_shared::exchange::ExchangeConfig;
use kindred_shared::payments::{FlutterwaveConfig, PaystackConfig, StripeConfig};
use std::env;
use std::net::IpAddr;
use std::str::FromStr;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// JWT configuration
    pub jwt: JwtConfig,

    /// Redis URL; rate limiting is off without it
    pub redis_url: Option<String>,

    pub payments: PaymentsConfig,

    /// Headless CMS; static content is served without it
    pub cms: Option<CmsConfig>,

    /// How long CMS documents stay cached
    pub content_cache_ttl_seconds: u64,

    pub exchange: ExchangeConfig,

    pub organization: OrganizationConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// Allowed CORS origins (`*` allows any)
    pub cors_origins: Vec<String>,

    /// Production mode (enables HSTS)
    pub production: bool,

    /// Public URL of the site, used in certificate links
    pub public_base_url: Option<String>,

    /// Reverse proxies allowed to report the client address
    pub trusted_proxies: Vec<IpAddr>,
}

/// JWT configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// IMPORTANT: This must be kept secret and should be at least 32 bytes.
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,

    /// Return password reset tokens in the forgot-password response.
    /// Development only: there is no mailer.
    pub expose_reset_tokens: bool,
}

/// Payment gateway configuration
#[derive(Debug, Clone, Default)]
pub struct PaymentsConfig {
    pub stripe: Option<StripeConfig>,
    pub paystack: Option<PaystackConfig>,
    pub flutterwave: Option<FlutterwaveConfig>,

    /// Register the mock gateway and accept unsigned mock webhooks
    pub mock_enabled: bool,

    /// Where hosted checkouts return the donor
    pub callback_url: Option<String>,
}

/// Details printed on certificates
#[derive(Debug, Clone)]
pub struct OrganizationConfig {
    pub name: String,
}

impl Default for OrganizationConfig {
    fn default() -> Self {
        Self {
            name: "Kindred Learning Foundation".to_string(),
        }
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value: {}", name, e)),
        None => Ok(default),
    }
}

fn parse_ip_list(name: &str, raw: Option<String>) -> anyhow::Result<Vec<IpAddr>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(|ip| {
            ip.parse()
                .map_err(|e| anyhow::anyhow!("{} has an invalid address {:?}: {}", name, ip, e))
        })
        .collect()
}

fn parse_bool(name: &str, default: bool) -> anyhow::Result<bool> {
    match var(name).as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{} must be a boolean, got {:?}", name, other),
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing
    /// - Environment variables have invalid values
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let database_url = var("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let production = var("APP_ENV").is_some_and(|env| env.eq_ignore_ascii_case("production"));

        let cors_origins = var("CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let database_defaults = DatabaseConfig::default();
        let database = DatabaseConfig {
            url: database_url,
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", database_defaults.max_connections)?,
            min_connections: parse_var("DATABASE_MIN_CONNECTIONS", database_defaults.min_connections)?,
            ..database_defaults
        };

        let stripe = var("STRIPE_SECRET_KEY").map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: var("STRIPE_WEBHOOK_SECRET"),
            ..StripeConfig::default()
        });

        let paystack = var("PAYSTACK_SECRET_KEY").map(|secret_key| PaystackConfig {
            secret_key,
            ..PaystackConfig::default()
        });

        let flutterwave = var("FLUTTERWAVE_SECRET_KEY").map(|secret_key| FlutterwaveConfig {
            secret_key,
            webhook_hash: var("FLUTTERWAVE_WEBHOOK_HASH"),
            ..FlutterwaveConfig::default()
        });

        let cms_defaults = CmsConfig::default();
        let cms = var("CMS_BASE_URL").map(|base_url| CmsConfig {
            base_url,
            dataset: var("CMS_DATASET").unwrap_or(cms_defaults.dataset.clone()),
            api_version: var("CMS_API_VERSION").unwrap_or(cms_defaults.api_version.clone()),
            token: var("CMS_TOKEN"),
            timeout_seconds: cms_defaults.timeout_seconds,
        });

        let exchange_defaults = ExchangeConfig::default();
        let exchange = ExchangeConfig {
            base_url: var("EXCHANGE_RATE_BASE_URL").unwrap_or(exchange_defaults.base_url),
            cache_ttl_seconds: parse_var(
                "EXCHANGE_RATE_CACHE_TTL_SECONDS",
                exchange_defaults.cache_ttl_seconds,
            )?,
            timeout_seconds: exchange_defaults.timeout_seconds,
        };

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_var("API_PORT", 8080u16)?,
                cors_origins,
                production,
                public_base_url: var("PUBLIC_BASE_URL"),
                trusted_proxies: parse_ip_list("TRUSTED_PROXIES", var("TRUSTED_PROXIES"))?,
            },
            database,
            jwt: JwtConfig {
                secret: jwt_secret,
                expose_reset_tokens: parse_bool("AUTH_EXPOSE_RESET_TOKENS", false)?,
            },
            redis_url: var("REDIS_URL"),
            payments: PaymentsConfig {
                stripe,
                paystack,
                flutterwave,
                mock_enabled: parse_bool("PAYMENTS_MOCK_ENABLED", !production)?,
                callback_url: var("PAYMENTS_CALLBACK_URL"),
            },
            cms,
            content_cache_ttl_seconds: parse_var("CONTENT_CACHE_TTL_SECONDS", 300u64)?,
            exchange,
            organization: OrganizationConfig {
                name: var("ORGANIZATION_NAME").unwrap_or_else(|| OrganizationConfig::default().name),
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// Public link where a certificate code can be checked
    pub fn certificate_verification_url(&self, code: &str) -> Option<String> {
        self.api
            .public_base_url
            .as_ref()
            .map(|base| format!("{}/certificates/{}", base.trim_end_matches('/'), code))
    }

    /// Configuration suitable for tests: mock payments only, no Redis or CMS
    pub fn for_tests(database_url: &str, jwt_secret: &str) -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                cors_origins: vec!["*".to_string()],
                production: false,
                public_base_url: Some("https://kindred.test".to_string()),
                trusted_proxies: Vec::new(),
            },
            database: DatabaseConfig {
                url: database_url.to_string(),
                ..DatabaseConfig::default()
            },
            jwt: JwtConfig {
                secret: jwt_secret.to_string(),
                expose_reset_tokens: true,
            },
            redis_url: None,
            payments: PaymentsConfig {
                mock_enabled: true,
                ..PaymentsConfig::default()
            },
            cms: None,
            content_cache_ttl_seconds: 300,
            exchange: ExchangeConfig::default(),
            organization: OrganizationConfig::default(),
        }
    }
}
