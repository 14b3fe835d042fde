//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// The `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

const MIN_JWT_SECRET_LEN: usize = 32;

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
    pub database_max_connections: u32,
    pub log_level: Level,
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
    pub blacklist_purge_interval_secs: u64,
    pub cors_origins: Vec<String>,
    pub password_hash_memory_kib: u32,
    pub password_hash_iterations: u32,
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
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse::<SocketAddr>().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database_max_connections = parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Token Settings ---
        let jwt_secret =
            lookup("JWT_SECRET").ok_or_else(|| ConfigError::MissingVar("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::InvalidValue(
                "JWT_SECRET".to_string(),
                format!("must be at least {} bytes long", MIN_JWT_SECRET_LEN),
            ));
        }
        let access_token_expire_minutes = positive(parse_or(&lookup, "ACCESS_TOKEN_EXPIRE_MINUTES", Some(30))?, "ACCESS_TOKEN_EXPIRE_MINUTES")?;
        let refresh_token_expire_days = positive(parse_or(&lookup, "REFRESH_TOKEN_EXPIRE_DAYS", Some(7))?, "REFRESH_TOKEN_EXPIRE_DAYS")?;
        let blacklist_purge_interval_secs = positive(parse_or(&lookup, "BLACKLIST_PURGE_INTERVAL_SECS", Some(300u64))?, "BLACKLIST_PURGE_INTERVAL_SECS")?;

        // --- HTTP Settings ---
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| {
                "http://localhost:3000,http://localhost:8080,http://localhost:4200".to_string()
            })
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        // --- Password Hashing Cost ---
        let password_hash_memory_kib = parse_or(&lookup, "PASSWORD_HASH_MEMORY_KIB", Some(19_456))?;
        let password_hash_iterations = parse_or(&lookup, "PASSWORD_HASH_ITERATIONS", Some(2))?;

        Ok(Self {
            bind_address,
            database_url,
            database_max_connections,
            log_level,
            jwt_secret,
            access_token_expire_minutes,
            refresh_token_expire_days,
            blacklist_purge_interval_secs,
            cors_origins,
            password_hash_memory_kib,
            password_hash_iterations,
        })
    }

    pub fn uses_memory_database(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}

fn positive<T: PartialOrd + Default>(value: T, key: &str) -> Result<T, ConfigError> {
    if value <= T::default() {
        return Err(ConfigError::InvalidValue(key.to_string(), "must be positive".to_string()));
    }
    Ok(value)
}
