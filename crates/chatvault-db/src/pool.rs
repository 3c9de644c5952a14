//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use chatvault_core::defaults::DB_MAX_CONNECTIONS;
use chatvault_core::env::env_parse;
use chatvault_core::{Error, Result};

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DB_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DB_MAX_CONNECTIONS` | `10` | Maximum pooled connections |
    /// | `DB_MIN_CONNECTIONS` | `1` | Connections kept open |
    /// | `DB_CONNECT_TIMEOUT_SECS` | `30` | Acquire timeout |
    ///
    /// Values that do not parse (including counts beyond `u32`) are rejected.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let max_connections = env_parse("DB_MAX_CONNECTIONS", defaults.max_connections)?;
        let min_connections = env_parse("DB_MIN_CONNECTIONS", defaults.min_connections)?;
        let connect_timeout_secs =
            env_parse("DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout.as_secs())?;

        let config = defaults
            .max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(connect_timeout_secs));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config("DB_MAX_CONNECTIONS must be at least 1".into()));
        }
        if self.min_connections > self.max_connections {
            return Err(Error::Config(
                "DB_MIN_CONNECTIONS must not exceed DB_MAX_CONNECTIONS".into(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::Config("DB_CONNECT_TIMEOUT_SECS must be positive".into()));
        }
        Ok(())
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a new PostgreSQL connection pool with custom configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "db",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        "Creating database connection pool"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 1);
        assert_eq!(
            config.connect_timeout,
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::default()
            .max_connections(20)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(60));

        assert_eq!(config.max_connections, 20);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_pool_config_validation() {
        assert!(PoolConfig::default().validate().is_ok());
        assert!(PoolConfig::default().max_connections(0).validate().is_err());
        assert!(PoolConfig::default()
            .max_connections(2)
            .min_connections(3)
            .validate()
            .is_err());
        assert!(PoolConfig::default()
            .connect_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_env_rejects_oversized_connection_count() {
        std::env::set_var("DB_MAX_CONNECTIONS", "4294967306");
        let result = PoolConfig::from_env();
        std::env::remove_var("DB_MAX_CONNECTIONS");
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("DB_MAX_CONNECTIONS")));
    }
}
