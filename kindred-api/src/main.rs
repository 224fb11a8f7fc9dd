//! # Kindred API Server
//!
//! HTTP backend for the Kindred learning platform: public content, donations
//! that unlock courses, lesson progress and certificates.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/kindred \
//! JWT_SECRET=$(openssl rand -hex 32) \
//! cargo run -p kindred-api
//! ```
//!
//! `LOG_FORMAT=json` switches log output to JSON lines; `RUST_LOG` overrides
//! the default filter.

use kindred_api::{
    app::{build_router, AppState},
    config::Config,
};
use kindred_shared::{
    audit::AuditLogger,
    db::{
        migrations::{ensure_database_exists, get_migration_status, run_migrations},
        pool::{close_pool, create_pool},
    },
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Kindred API starting");

    let config = Config::from_env()?;

    if !config.api.production {
        ensure_database_exists(&config.database.url).await?;
    }

    let pool = create_pool(config.database.clone()).await?;
    run_migrations(&pool).await?;

    let migrations = get_migration_status(&pool).await?;
    tracing::info!(
        applied = migrations.applied_migrations,
        latest_version = ?migrations.latest_version,
        "Database ready"
    );

    let shutdown = CancellationToken::new();
    let (audit, audit_writer) = AuditLogger::spawn(pool.clone(), shutdown.child_token());

    let redis_url = config.redis_url.clone();
    let addr = config.bind_address();

    let mut state = AppState::from_config(pool.clone(), config, audit)?;
    if let Some(url) = redis_url {
        match connect_redis(&url).await {
            Ok(conn) => {
                tracing::info!("Rate limiting enabled");
                state = state.with_redis(conn);
            }
            Err(e) => tracing::warn!(error = %e, "Redis unavailable, rate limiting disabled"),
        }
    } else {
        tracing::info!("REDIS_URL not set, rate limiting disabled");
    }

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped, flushing audit log");
    shutdown.cancel();
    if let Err(e) = audit_writer.await {
        tracing::warn!(error = %e, "Audit writer did not stop cleanly");
    }

    close_pool(pool).await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kindred_api=info,kindred_shared=info,tower_http=info".into());

    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(|| fmt::layer()))
        .init();
}

async fn connect_redis(url: &str) -> redis::RedisResult<ConnectionManager> {
    let client = redis::Client::open(url)?;
    ConnectionManager::new(client).await
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
