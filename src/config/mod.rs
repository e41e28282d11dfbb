use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, ConfigError, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rate_limit: RateLimitConfig,
    pub admin: AdminConfig,
    pub cache: CacheConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("WAITLIST_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("WAITLIST_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        assert!(
            !self.database.url.is_empty(),
            "Database URL must be specified"
        );
        assert!(
            self.server.port > 0,
            "Server port must be greater than zero"
        );
        self.rate_limit.ensure_bounds()?;
        self.admin.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        assert!(self.port < 65535, "HTTP port must be below 65535");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

/// Which store backs the fixed-window counters. `Memory` suits a single
/// instance; `Database` shares counters across instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitBackend {
    Memory,
    Database,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "RateLimitConfig::default_requests_per_window")]
    pub requests_per_window: u32,
    #[serde(default = "RateLimitConfig::default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "RateLimitConfig::default_backend")]
    pub backend: RateLimitBackend,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        assert!(self.window_seconds >= 1, "Window must be at least 1 second");
        assert!(
            self.window_seconds <= 3_600,
            "Window cannot exceed one hour"
        );
        Duration::from_secs(self.window_seconds)
    }

    fn ensure_bounds(&self) -> Result<()> {
        assert!(self.requests_per_window > 0, "Rate limit must be positive");
        assert!(
            self.requests_per_window <= 10_000,
            "Rate limit exceeds defensive limit"
        );
        let _ = self.window();
        Ok(())
    }

    const fn default_requests_per_window() -> u32 {
        5
    }

    const fn default_window_seconds() -> u64 {
        60
    }

    const fn default_backend() -> RateLimitBackend {
        RateLimitBackend::Memory
    }
}

/// Admin credentials and session settings. The gate compares these
/// literally against the login payload; production deployments must
/// replace this with hashed credentials checked against a secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
    /// Master secret for the private session cookie
    pub cookie_secret: String,
    #[serde(default = "AdminConfig::default_session_hours")]
    pub session_hours: i64,
}

impl AdminConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(!self.username.is_empty(), "Admin username must be set");
        assert!(
            self.password.len() >= 8,
            "Admin password must be at least 8 characters"
        );
        assert!(
            self.cookie_secret.len() >= 32,
            "Cookie secret must be at least 32 bytes"
        );
        assert!(self.session_hours >= 1, "Session must last at least 1 hour");
        assert!(self.session_hours <= 168, "Session cannot exceed one week");
        Ok(())
    }

    const fn default_session_hours() -> i64 {
        12
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub listing_max_capacity: u64,
    pub listing_ttl_seconds: u64,
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        assert!(
            self.listing_max_capacity >= 1,
            "Listing cache capacity must be at least 1"
        );
        assert!(
            self.listing_ttl_seconds <= 86_400,
            "Listing cache TTL cannot exceed one day"
        );
        Ok(())
    }
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
