//! Database configuration module.
//!
//! Provides configuration structures for database connection management.

use std::env;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub database_url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Idle connection timeout in seconds
    pub idle_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl DatabaseConfig {
    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `DATABASE_URL`: PostgreSQL connection string
    /// - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 20)
    /// - `DB_MIN_CONNECTIONS`: Minimum pool size (default: 2)
    /// - `DB_CONNECTION_TIMEOUT`: Connection timeout in seconds (default: 5)
    /// - `DB_IDLE_TIMEOUT`: Idle timeout in seconds (default: 600)
    ///
    /// # Returns
    ///
    /// * `Option<DatabaseConfig>` - `None` when `DATABASE_URL` is unset, in
    ///   which case wallets live in memory
    pub fn from_env() -> Option<Self> {
        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty())?;
        Some(Self {
            database_url,
            max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connection_timeout_secs: env_or("DB_CONNECTION_TIMEOUT", 5),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT", 600),
        })
    }

    /// Default configuration for a local development database
    pub fn development() -> Self {
        Self {
            database_url: "postgres://postgres@localhost/rummy".to_string(),
            max_connections: 20,
            min_connections: 2,
            connection_timeout_secs: 5,
            idle_timeout_secs: 600,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::development()
    }
}
