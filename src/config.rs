//! Service configuration, read from the environment (and `.env` via dotenvy).

use std::str::FromStr;
use std::time::Duration;

use crate::utils::RetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// PostgreSQL connection URL; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Port for /metrics and /health
    pub metrics_port: u16,
    /// Deadline for each individual store call
    pub store_timeout: Duration,
    /// Orders processed in parallel by a batch update
    pub batch_concurrency: usize,
    pub retry: RetryConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = RetryConfig::default();

        let retry = RetryConfig {
            max_attempts: parse_or(&lookup, "RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_delay: Duration::from_millis(parse_or(
                &lookup,
                "RETRY_INITIAL_DELAY_MS",
                defaults.initial_delay.as_millis() as u64,
            )?),
            ..defaults
        };

        let batch_concurrency: usize = parse_or(&lookup, "BATCH_CONCURRENCY", 8)?;
        if batch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                name: "BATCH_CONCURRENCY",
                value: "0".into(),
            });
        }

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            metrics_port: parse_or(&lookup, "METRICS_PORT", 9090)?,
            store_timeout: Duration::from_millis(parse_or(&lookup, "STORE_TIMEOUT_MS", 5_000)?),
            batch_concurrency,
            retry,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid { name, value }),
    }
}
