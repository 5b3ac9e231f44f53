//! Configuration management
//!
//! Settings are read from `config.yml` and then overridden by `CYPRESS_*`
//! environment variables. Every section has defaults, so a missing or
//! empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins, comma separated. `*` allows any origin.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "*".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// File path for SQLite, connection URL for MySQL
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/cypress.db".to_string()
}

fn default_max_connections() -> u32 {
    20
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    #[default]
    Sqlite,
    Mysql,
}

impl std::str::FromStr for DatabaseDriver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::Mysql),
            other => Err(ConfigError::InvalidValue {
                key: "database.driver".to_string(),
                message: format!("unknown driver '{}'", other),
            }),
        }
    }
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Time to live for cached query results
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_session_days")]
    pub session_expiration_days: i64,
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

/// Upper bound for `auth.session_expiration_days` (ten years)
pub const MAX_SESSION_DAYS: i64 = 3650;

impl AuthConfig {
    /// Session lifetime, clamped to the range `Config::validate` accepts
    pub fn session_lifetime(&self) -> chrono::Duration {
        let days = self.session_expiration_days.clamp(1, MAX_SESSION_DAYS);
        chrono::Duration::try_days(days)
            .unwrap_or_else(|| chrono::Duration::days(default_session_days()))
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_expiration_days: default_session_days(),
            min_password_length: default_min_password_length(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_min_password_length() -> usize {
    8
}

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing or blank file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration and apply `CYPRESS_*` environment overrides:
    ///
    /// - `CYPRESS_HOST`, `CYPRESS_PORT`, `CYPRESS_CORS_ORIGIN`
    /// - `CYPRESS_DB_DRIVER`, `CYPRESS_DB_URL`
    /// - `CYPRESS_CACHE_TTL`
    /// - `CYPRESS_SESSION_DAYS`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(host) = env_var("CYPRESS_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_var("CYPRESS_PORT") {
            self.server.port = parse_env("CYPRESS_PORT", &port)?;
        }
        if let Some(origin) = env_var("CYPRESS_CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }
        if let Some(driver) = env_var("CYPRESS_DB_DRIVER") {
            self.database.driver = driver.parse()?;
        }
        if let Some(url) = env_var("CYPRESS_DB_URL") {
            self.database.url = url;
        }
        if let Some(ttl) = env_var("CYPRESS_CACHE_TTL") {
            self.cache.ttl_seconds = parse_env("CYPRESS_CACHE_TTL", &ttl)?;
        }
        if let Some(days) = env_var("CYPRESS_SESSION_DAYS") {
            self.auth.session_expiration_days = parse_env("CYPRESS_SESSION_DAYS", &days)?;
        }
        Ok(())
    }

    /// Reject values the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("database.max_connections", "must be at least 1"));
        }
        if self.cache.ttl_seconds == 0 {
            return Err(invalid("cache.ttl_seconds", "must be non-zero"));
        }
        if !(1..=MAX_SESSION_DAYS).contains(&self.auth.session_expiration_days) {
            return Err(invalid(
                "auth.session_expiration_days",
                &format!("must be between 1 and {}", MAX_SESSION_DAYS),
            ));
        }
        if self.auth.min_password_length == 0 {
            return Err(invalid("auth.min_password_length", "must be at least 1"));
        }
        Ok(())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}': {}", value, e),
    })
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn format_yaml_error(e: &serde_yaml::Error) -> String {
    match e.location() {
        Some(location) => format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        ),
        None => e.to_string(),
    }
}

// Serializes tests that touch process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_yaml_round_trip_preserves_values(
            port in 1u16..,
            ttl in 1u64..100_000,
            days in 1i64..365,
        ) {
            let mut config = Config::default();
            config.server.port = port;
            config.cache.ttl_seconds = ttl;
            config.auth.session_expiration_days = days;

            let yaml = serde_yaml::to_string(&config).unwrap();
            let parsed: Config = serde_yaml::from_str(&yaml).unwrap();

            prop_assert_eq!(parsed.server.port, port);
            prop_assert_eq!(parsed.cache.ttl_seconds, ttl);
            prop_assert_eq!(parsed.auth.session_expiration_days, days);
            prop_assert!(parsed.validate().is_ok());
        }
    }
}
