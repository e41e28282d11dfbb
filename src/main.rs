mod config;
mod entities;
mod http;
mod models;
mod ratelimit;
mod session;
mod state;
mod validators;

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApiConfig, RateLimitBackend};
use crate::ratelimit::{DatabaseStore, MemoryStore, RateLimitStore, RateLimiter};
use crate::state::{AppState, ListingCache};
use anyhow::{Context, Result};
use axum::Router;
use migration::MigratorTrait;
use sea_orm::ConnectOptions;
use sea_orm::Database;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = ApiConfig::load().context("Failed to load configuration")?;
    let database = connect_database(&config).await?;
    run_migrations(&database).await?;

    let window = config.rate_limit.window();
    let store: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        RateLimitBackend::Memory => Arc::new(MemoryStore::new(window)),
        RateLimitBackend::Database => Arc::new(DatabaseStore::new(database.clone(), window)),
    };
    let rate_limiter = Arc::new(RateLimiter::new(
        store,
        config.rate_limit.requests_per_window,
    ));
    info!(
        "Rate limiting: {} requests per {}s window ({:?} backend)",
        config.rate_limit.requests_per_window,
        config.rate_limit.window_seconds,
        config.rate_limit.backend
    );

    let cache = Arc::new(ListingCache::new(&config.cache));
    let admin = Arc::new(config.admin.clone());
    let app_state = AppState::new(database.clone(), cache, rate_limiter, admin);

    let listener = TcpListener::bind(config.server.address())
        .await
        .context("Failed to bind HTTP listener")?;
    let local_addr = listener
        .local_addr()
        .context("Failed to obtain listener address")?;
    info!("Waitlist API listening on {local_addr}");

    let router: Router = http::router(app_state);
    let server = axum::serve(listener, router.into_make_service());
    server
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server exited with error")?;

    Ok(())
}

fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}

async fn connect_database(config: &ApiConfig) -> Result<sea_orm::DatabaseConnection> {
    let mut options = ConnectOptions::new(config.database.url.clone());
    options
        .max_connections(config.database.max_connections)
        .sqlx_logging(true)
        .sqlx_logging_level(tracing::log::LevelFilter::Debug)
        .acquire_timeout(Duration::from_secs(10));

    if let Some(min) = config.database.min_connections {
        options.min_connections(min);
    }

    assert!(
        config.database.max_connections >= config.database.min_connections.unwrap_or(1),
        "Max connections must be >= min connections"
    );
    assert!(
        config.database.max_connections <= 128,
        "Connection pool oversized"
    );

    Database::connect(options)
        .await
        .context("Failed to connect to PostgreSQL")
}

async fn run_migrations(database: &sea_orm::DatabaseConnection) -> Result<()> {
    migration::Migrator::up(database, None)
        .await
        .context("Database migrations failed")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}
