/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use kindred_api::{app::AppState, config::Config};
/// use kindred_shared::audit::AuditLogger;
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::from_config(pool, config, AuditLogger::disabled())?;
/// let app = kindred_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::{
        client_ip::client_ip_layer,
        rate_limit::{rate_limit_layer, RouteGroup},
        security::SecurityHeadersLayer,
    },
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use kindred_shared::{
    audit::AuditLogger,
    auth::middleware::authenticate,
    content::{CmsClient, ContentRepository, ContentSource, StaticContent},
    exchange::{ExchangeRateService, OpenExchangeRateSource},
    payments::{
        webhook::WebhookSecrets, FlutterwaveGateway, GatewayRegistry, MockGateway,
        PaystackGateway, StripeGateway,
    },
};
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Cached CMS content with static fallbacks
    pub content: ContentRepository,

    /// Cached exchange rates
    pub exchange: ExchangeRateService,

    /// Enabled payment gateways
    pub gateways: GatewayRegistry,

    pub webhook_secrets: WebhookSecrets,

    pub audit: AuditLogger,

    /// Rate limiter backend; `None` disables rate limiting
    pub redis: Option<ConnectionManager>,
}

impl AppState {
    /// Builds gateways, content and exchange clients from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be constructed.
    pub fn from_config(db: PgPool, config: Config, audit: AuditLogger) -> anyhow::Result<Self> {
        let mut gateways = GatewayRegistry::new();
        if let Some(stripe) = &config.payments.stripe {
            gateways.register(Arc::new(StripeGateway::new(stripe)?));
        }
        if let Some(paystack) = &config.payments.paystack {
            gateways.register(Arc::new(PaystackGateway::new(paystack)?));
        }
        if let Some(flutterwave) = &config.payments.flutterwave {
            gateways.register(Arc::new(FlutterwaveGateway::new(flutterwave)?));
        }
        if config.payments.mock_enabled {
            gateways.register(Arc::new(MockGateway::new()));
        }
        info!(providers = ?gateways.providers(), "Payment gateways configured");

        let webhook_secrets = WebhookSecrets {
            stripe: config
                .payments
                .stripe
                .as_ref()
                .and_then(|s| s.webhook_secret.clone()),
            paystack: config.payments.paystack.as_ref().map(|p| p.secret_key.clone()),
            flutterwave: config
                .payments
                .flutterwave
                .as_ref()
                .and_then(|f| f.webhook_hash.clone()),
        };

        let source: Arc<dyn ContentSource> = match &config.cms {
            Some(cms) => Arc::new(CmsClient::new(cms)?),
            None => {
                info!("No CMS configured, serving static content");
                Arc::new(StaticContent)
            }
        };
        let content = ContentRepository::new(
            source,
            Duration::from_secs(config.content_cache_ttl_seconds),
        );

        let exchange = ExchangeRateService::new(
            Arc::new(OpenExchangeRateSource::new(&config.exchange)?),
            Duration::from_secs(config.exchange.cache_ttl_seconds),
        );

        Ok(Self {
            db,
            config: Arc::new(config),
            content,
            exchange,
            gateways,
            webhook_secrets,
            audit,
            redis: None,
        })
    }

    /// Enables Redis-backed rate limiting
    pub fn with_redis(mut self, redis: ConnectionManager) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /
/// ├── /health                                   # Health check (public)
/// └── /v1/
///     ├── /auth/                                # rate limited except /me
///     │   ├── POST /register, /login, /refresh
///     │   ├── POST /forgot-password, /reset-password
///     │   └── GET  /me                          # authenticated
///     ├── /content/                             # public, cached
///     │   └── GET /courses, /courses/:slug, /team, /events,
///     │           /careers, /testimonials, /donation-tiers
///     ├── /donations/                           # optional auth, rate limited
///     │   ├── POST /
///     │   └── POST /verify
///     ├── POST /webhooks/:provider              # signature checked
///     ├── /enrollments/                         # authenticated
///     │   ├── GET  /, /:id
///     │   ├── GET|POST /:id/progress
///     │   ├── POST /:id/certificate
///     │   └── GET  /:id/certificate.pdf
///     ├── GET /certificates/:code               # public verification
///     ├── GET /exchange-rates/:base, /exchange-rates/convert
///     └── /admin/                               # authenticated, role-checked
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. Compression
/// 3. CORS (tower-http CorsLayer)
/// 4. Security headers
/// 5. Authentication and rate limiting (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_public_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route("/forgot-password", post(routes::auth::forgot_password))
        .route("/reset-password", post(routes::auth::reset_password))
        .layer(from_fn_with_state(
            (state.clone(), RouteGroup::Auth),
            rate_limit_layer,
        ));

    let auth_private_routes = Router::new()
        .route("/me", get(routes::auth::me))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let content_routes = Router::new()
        .route("/courses", get(routes::content::list_courses))
        .route("/courses/:slug", get(routes::content::get_course))
        .route("/team", get(routes::content::team))
        .route("/events", get(routes::content::events))
        .route("/careers", get(routes::content::careers))
        .route("/testimonials", get(routes::content::testimonials))
        .route("/donation-tiers", get(routes::content::donation_tiers));

    let donation_routes = Router::new()
        .route("/", post(routes::donations::create_donation))
        .route("/verify", post(routes::donations::verify_donation))
        .layer(from_fn_with_state(
            (state.clone(), RouteGroup::Donations),
            rate_limit_layer,
        ))
        .layer(from_fn_with_state(state.clone(), optional_auth_layer));

    let webhook_routes =
        Router::new().route("/:provider", post(routes::webhooks::receive_webhook));

    let enrollment_routes = Router::new()
        .route("/", get(routes::enrollments::list_my_enrollments))
        .route("/:id", get(routes::enrollments::get_enrollment))
        .route(
            "/:id/progress",
            get(routes::enrollments::get_progress).post(routes::enrollments::update_progress),
        )
        .route(
            "/:id/certificate",
            post(routes::certificates::issue_certificate),
        )
        .route(
            "/:id/certificate.pdf",
            get(routes::certificates::download_certificate),
        )
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let certificate_routes =
        Router::new().route("/:code", get(routes::certificates::verify_certificate));

    let exchange_routes = Router::new()
        .route("/convert", get(routes::exchange::convert))
        .route("/:base", get(routes::exchange::latest_rates));

    let admin_routes = Router::new()
        .route("/enrollments", get(routes::admin::list_enrollments))
        .route(
            "/enrollments/:id/status",
            patch(routes::admin::update_enrollment_status),
        )
        .route("/payments", get(routes::admin::list_payments))
        .route("/payments/:id/refund", post(routes::admin::refund_payment))
        .route("/users", get(routes::admin::list_users))
        .route("/users/:id/role", patch(routes::admin::update_user_role))
        .route("/audit-logs", get(routes::admin::list_audit_logs))
        .route("/content/invalidate", post(routes::admin::invalidate_content))
        .layer(from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new()
        .nest("/auth", auth_public_routes.merge(auth_private_routes))
        .nest("/content", content_routes)
        .nest("/donations", donation_routes)
        .nest("/webhooks", webhook_routes)
        .nest("/enrollments", enrollment_routes)
        .nest("/certificates", certificate_routes)
        .nest("/exchange-rates", exchange_routes)
        .nest("/admin", admin_routes);

    // Configure CORS based on environment
    let cors = if state.config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        CorsLayer::permissive()
    } else {
        let origins: Vec<HeaderValue> = state
            .config
            .api
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    };

    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/v1", v1_routes)
        .layer(from_fn_with_state(state.clone(), client_ip_layer))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

/// JWT authentication middleware layer
///
/// Validates the bearer token and injects `AuthContext` into request
/// extensions. Requests without a token are rejected.
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let context = authenticate(req.headers(), state.jwt_secret())?
        .ok_or_else(|| ApiError::Unauthorized("Missing authorization header".to_string()))?;

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

/// Like [`jwt_auth_layer`] but lets anonymous requests through
async fn optional_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(context) = authenticate(req.headers(), state.jwt_secret())? {
        req.extensions_mut().insert(context);
    }

    Ok(next.run(req).await)
}
