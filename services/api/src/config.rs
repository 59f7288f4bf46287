//! services/api/src/config.rs
//!
//! Defines the service's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
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
    pub log_level: Level,
    /// Directory that holds the object storage buckets.
    pub storage_root: PathBuf,
    /// Base under which `/storage/...` URLs are handed out.
    pub public_base_url: String,
    /// Origin of the web client; password reset links point back here.
    pub site_origin: String,
    pub allowed_origin: String,
    pub session_ttl_days: i64,
    pub profile_write_attempts: u32,
    pub max_upload_bytes: usize,
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

        // --- Server and Database Settings ---
        let bind_address = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Storage and Public URLs ---
        let storage_root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./storage"));
        let public_base_url = url_var("PUBLIC_BASE_URL", "http://localhost:3000")?;
        let site_origin = url_var("SITE_ORIGIN", "http://localhost:5173")?;
        let allowed_origin = url_var("ALLOWED_ORIGIN", &site_origin)?;

        // --- Behaviour Tuning ---
        let session_ttl_days: i64 = parse_var("SESSION_TTL_DAYS", "30")?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let profile_write_attempts: u32 = parse_var("PROFILE_WRITE_ATTEMPTS", "3")?;
        let max_upload_bytes: usize = parse_var("MAX_UPLOAD_BYTES", "10485760")?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            storage_root,
            public_base_url,
            site_origin,
            allowed_origin,
            session_ttl_days,
            profile_write_attempts: profile_write_attempts.max(1),
            max_upload_bytes,
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

fn url_var(name: &str, default: &str) -> Result<String, ConfigError> {
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if !(raw.starts_with("http://") || raw.starts_with("https://")) {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not an http(s) URL", raw),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}
