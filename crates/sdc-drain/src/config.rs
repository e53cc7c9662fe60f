//! Configuration management

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::drain::postgres::{MAX_BIND_PARAMS, MAX_DESTINATION_COLUMNS};
use crate::drain::types::{
    DrainConfig, DEFAULT_BATCH_SIZE, DEFAULT_DECODE_WORKERS, DEFAULT_MAX_IN_FLIGHT, DEFAULT_PAGE_SIZE,
};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/sdc";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

// ============================================================================
// Drain Configuration Constants
// ============================================================================

/// Default scheduler interval; zero disables the scheduler.
pub const DEFAULT_DRAIN_INTERVAL_SECS: u64 = 0;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub drain: DrainSettings,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Drain cycle and scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrainSettings {
    pub page_size: usize,
    pub batch_size: usize,
    pub max_in_flight: usize,
    pub decode_workers: usize,
    /// Seconds between scheduled cycles; `0` means on-demand only
    pub interval_secs: u64,
    pub run_on_startup: bool,
}

impl DrainSettings {
    /// Scheduler period, if scheduling is enabled
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env();
        config.validate()?;

        Ok(config)
    }

    /// Read every setting from the environment without validating
    pub fn from_env() -> Self {
        Config {
            server: ServerConfig {
                host: std::env::var("SDC_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: env_or("SDC_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_or("SDC_SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            drain: DrainSettings {
                page_size: env_or("DRAIN_PAGE_SIZE", DEFAULT_PAGE_SIZE),
                batch_size: env_or("DRAIN_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                max_in_flight: env_or("DRAIN_MAX_IN_FLIGHT", DEFAULT_MAX_IN_FLIGHT),
                decode_workers: env_or("DRAIN_DECODE_WORKERS", DEFAULT_DECODE_WORKERS),
                interval_secs: env_or("DRAIN_INTERVAL_SECS", DEFAULT_DRAIN_INTERVAL_SECS),
                run_on_startup: env_or("DRAIN_RUN_ON_STARTUP", false),
            },
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
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

        // Validate drain settings
        let drain = &self.drain;
        for (name, value) in [
            ("DRAIN_PAGE_SIZE", drain.page_size),
            ("DRAIN_BATCH_SIZE", drain.batch_size),
            ("DRAIN_MAX_IN_FLIGHT", drain.max_in_flight),
            ("DRAIN_DECODE_WORKERS", drain.decode_workers),
        ] {
            if value == 0 {
                anyhow::bail!("{name} must be greater than 0");
            }
        }

        let max_batch = MAX_BIND_PARAMS / MAX_DESTINATION_COLUMNS;
        if drain.batch_size > max_batch {
            anyhow::bail!(
                "DRAIN_BATCH_SIZE ({}) exceeds {} rows, the most a single insert can bind",
                drain.batch_size,
                max_batch
            );
        }

        if drain.interval().is_none() && drain.run_on_startup {
            tracing::warn!("DRAIN_RUN_ON_STARTUP is set but the scheduler is disabled");
        }

        Ok(())
    }

    pub fn to_drain_config(&self) -> DrainConfig {
        DrainConfig {
            page_size: self.drain.page_size,
            batch_size: self.drain.batch_size,
            max_in_flight: self.drain.max_in_flight,
            decode_workers: self.drain.decode_workers,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            drain: DrainSettings {
                page_size: DEFAULT_PAGE_SIZE,
                batch_size: DEFAULT_BATCH_SIZE,
                max_in_flight: DEFAULT_MAX_IN_FLIGHT,
                decode_workers: DEFAULT_DECODE_WORKERS,
                interval_secs: DEFAULT_DRAIN_INTERVAL_SECS,
                run_on_startup: false,
            },
        }
    }
}
