//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use axum::http::HeaderValue;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub redis_url: String,
    pub log_level: Level,
    pub db_max_connections: u32,
    /// Deadline for every persistence call.
    pub db_timeout: Duration,
    /// Deadline for every cache / session store call.
    pub cache_timeout: Duration,
    pub session_ttl: Duration,
    pub flat_cache_ttl: Duration,
    /// Allowed CORS origin. `None` means any origin.
    pub cors_origin: Option<HeaderValue>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Storage Settings ---
        let bind_address =
            parse_or::<SocketAddr, _>(&lookup, "BIND_ADDRESS", "0.0.0.0:8080".parse().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Tunables ---
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(10))?;
        let db_timeout = Duration::from_millis(parse_or(&lookup, "DB_TIMEOUT_MS", Some(2_000))?);
        let cache_timeout = Duration::from_millis(parse_or(&lookup, "CACHE_TIMEOUT_MS", Some(200))?);
        let session_ttl = minutes(parse_or(&lookup, "SESSION_TTL_MINUTES", Some(60))?);
        let flat_cache_ttl = minutes(parse_or(&lookup, "FLAT_CACHE_TTL_MINUTES", Some(30))?);

        let cors_origin = lookup("CORS_ORIGIN")
            .map(|origin| {
                HeaderValue::from_str(&origin)
                    .map_err(|e| ConfigError::InvalidValue("CORS_ORIGIN".to_string(), e.to_string()))
            })
            .transpose()?;

        Ok(Self {
            bind_address,
            database_url,
            redis_url,
            log_level,
            db_max_connections,
            db_timeout,
            cache_timeout,
            session_ttl,
            flat_cache_ttl,
            cors_origin,
        })
    }
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

/// Parses `name` if set, otherwise falls back to `default`. `None` as the
/// default makes the variable required.
fn parse_or<T, F>(lookup: &F, name: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(name.to_string())),
    }
}
