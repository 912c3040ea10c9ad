//! Configuration module
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

/// Database configuration for the PostgreSQL store
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Protocol settings
    pub ledger: LedgerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env_or("DATABASE_MAX_CONNECTIONS", "10")?;

        Ok(Self {
            database_url,
            database_max_connections,
            ledger: LedgerConfig::from_env()?,
        })
    }
}

/// Settings of the balance transfer protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// How many times a commit is retried after an optimistic version conflict
    pub max_commit_retries: u32,

    /// Base delay between retries; attempt `n` waits `n * retry_backoff` plus jitter
    pub retry_backoff: Duration,

    /// Default deadline applied when the caller supplies none
    pub operation_timeout: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_commit_retries: 3,
            retry_backoff: Duration::from_millis(50),
            operation_timeout: None,
        }
    }
}

impl LedgerConfig {
    /// Load protocol settings; every variable is optional
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_commit_retries = env_or("LEDGER_MAX_COMMIT_RETRIES", "3")?;
        let backoff_ms: u64 = env_or("LEDGER_RETRY_BACKOFF_MS", "50")?;

        let operation_timeout = match env::var("LEDGER_OPERATION_TIMEOUT_MS") {
            Ok(raw) => Some(Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidValue("LEDGER_OPERATION_TIMEOUT_MS"))?,
            )),
            Err(_) => None,
        };

        Ok(Self {
            max_commit_retries,
            retry_backoff: Duration::from_millis(backoff_ms),
            operation_timeout,
        })
    }

    pub fn with_max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

fn env_or<T: std::str::FromStr>(name: &'static str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
