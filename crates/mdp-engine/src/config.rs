//! Engine configuration
//!
//! One immutable `EngineConfig` is constructed at startup and passed by
//! reference to every component; nothing reads the environment after load.

use serde::{Deserialize, Serialize};

use crate::http::RetryPolicy;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/mdp";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default outbound HTTP request timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Default user agent for outbound calls.
pub const DEFAULT_HTTP_USER_AGENT: &str = "mdp-engine/0.1";

/// Default number of scheduler worker tasks.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default bounded retry attempts applied by the hosting scheduler.
pub const DEFAULT_SCHEDULE_RETRY_ATTEMPTS: u32 = 3;

/// Default delay between scheduler retries in seconds.
pub const DEFAULT_SCHEDULE_RETRY_DELAY_SECS: u64 = 60;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub retry: RetryPolicy,
    pub scheduler: SchedulerConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

/// Hosting scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl EngineConfig {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = EngineConfig {
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_parsed("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parsed("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parsed("DATABASE_CONNECT_TIMEOUT")
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
            http: HttpConfig {
                timeout_secs: env_parsed("MDP_HTTP_TIMEOUT").unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
                user_agent: std::env::var("MDP_HTTP_USER_AGENT")
                    .unwrap_or_else(|_| DEFAULT_HTTP_USER_AGENT.to_string()),
            },
            retry: RetryPolicy {
                max_attempts: env_parsed("MDP_RETRY_MAX_ATTEMPTS")
                    .unwrap_or(RetryPolicy::DEFAULT_MAX_ATTEMPTS),
                backoff_base_secs: env_parsed("MDP_RETRY_BACKOFF_BASE")
                    .unwrap_or(RetryPolicy::DEFAULT_BACKOFF_BASE_SECS),
                backoff_cap_secs: env_parsed("MDP_RETRY_BACKOFF_CAP")
                    .unwrap_or(RetryPolicy::DEFAULT_BACKOFF_CAP_SECS),
                retryable_status_codes: RetryPolicy::default_retryable_status_codes(),
            },
            scheduler: SchedulerConfig {
                worker_count: env_parsed("MDP_WORKER_COUNT").unwrap_or(DEFAULT_WORKER_COUNT),
                retry_attempts: env_parsed("MDP_SCHEDULE_RETRY_ATTEMPTS")
                    .unwrap_or(DEFAULT_SCHEDULE_RETRY_ATTEMPTS),
                retry_delay_secs: env_parsed("MDP_SCHEDULE_RETRY_DELAY")
                    .unwrap_or(DEFAULT_SCHEDULE_RETRY_DELAY_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.retry.max_attempts == 0 {
            anyhow::bail!("Retry max_attempts must be greater than 0");
        }

        if self.scheduler.worker_count == 0 {
            anyhow::bail!("Scheduler worker_count must be greater than 0");
        }

        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
            http: HttpConfig {
                timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
                user_agent: DEFAULT_HTTP_USER_AGENT.to_string(),
            },
            retry: RetryPolicy::default(),
            scheduler: SchedulerConfig {
                worker_count: DEFAULT_WORKER_COUNT,
                retry_attempts: DEFAULT_SCHEDULE_RETRY_ATTEMPTS,
                retry_delay_secs: DEFAULT_SCHEDULE_RETRY_DELAY_SECS,
            },
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_pool_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.database.min_connections = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let mut config = EngineConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }
}
