use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::middleware::circuit_breaker::CircuitBreakerConfig;
use crate::infrastructure::middleware::request_tracking::RequestTrackingConfig;
use crate::infrastructure::monitoring::MonitorConfig;
use crate::infrastructure::pool::PoolConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pool: PoolConfig,
    pub monitor: MonitorConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub request: RequestTrackingConfig,
    /// Insert demo portfolio content when the database is empty
    pub seed_demo_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub connect_timeout: Duration,
    /// Bounds pre-ping and health probe round-trips
    pub read_timeout: Duration,
    /// Applied as the SQLite busy timeout
    pub write_timeout: Duration,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/portfolio.db".to_string(),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Config::default();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or(defaults.server.host),
                port: env_or("SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
                connect_timeout: env_secs(
                    "DB_CONNECT_TIMEOUT_SECS",
                    defaults.database.connect_timeout,
                )?,
                read_timeout: env_secs("DB_READ_TIMEOUT_SECS", defaults.database.read_timeout)?,
                write_timeout: env_secs("DB_WRITE_TIMEOUT_SECS", defaults.database.write_timeout)?,
            },
            pool: PoolConfig {
                pool_size: env_or("DB_POOL_SIZE", defaults.pool.pool_size)?,
                max_overflow: env_or("DB_MAX_OVERFLOW", defaults.pool.max_overflow)?,
                recycle: env_secs("DB_POOL_RECYCLE_SECS", defaults.pool.recycle)?,
                timeout: env_secs("DB_POOL_TIMEOUT_SECS", defaults.pool.timeout)?,
                pre_ping: env_or("DB_POOL_PRE_PING", defaults.pool.pre_ping)?,
                ping_timeout: defaults.pool.ping_timeout,
            },
            monitor: MonitorConfig {
                check_interval: env_secs(
                    "MONITOR_CHECK_INTERVAL_SECS",
                    defaults.monitor.check_interval,
                )?,
                alert_threshold: env_or(
                    "MONITOR_ALERT_THRESHOLD",
                    defaults.monitor.alert_threshold,
                )?,
                max_records: env_or("MONITOR_MAX_RECORDS", defaults.monitor.max_records)?,
                metrics_file: env::var("MONITOR_METRICS_FILE").ok().map(PathBuf::from),
                reset_after_failed_remediation: env_or(
                    "MONITOR_RESET_AFTER_FAILED_REMEDIATION",
                    defaults.monitor.reset_after_failed_remediation,
                )?,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_or(
                    "CIRCUIT_FAILURE_THRESHOLD",
                    defaults.circuit_breaker.failure_threshold,
                )?,
                recovery_timeout: env_secs(
                    "CIRCUIT_RECOVERY_TIMEOUT_SECS",
                    defaults.circuit_breaker.recovery_timeout,
                )?,
            },
            request: RequestTrackingConfig {
                timeout: env_secs("REQUEST_TIMEOUT_SECS", defaults.request.timeout)?,
                slow_threshold: env_secs(
                    "SLOW_REQUEST_THRESHOLD_SECS",
                    defaults.request.slow_threshold,
                )?,
                max_records: env_or("REQUEST_MAX_RECORDS", defaults.request.max_records)?,
            },
            seed_demo_data: env_or("SEED_DEMO_DATA", defaults.seed_demo_data)?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid value {:?} for {}: {}", raw, key, e)),
        Err(_) => Ok(default),
    }
}

/// Seconds, fractional values allowed
fn env_secs(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match env::var(key) {
        Ok(raw) => {
            let secs: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("invalid value {:?} for {}", raw, key))?;
            Duration::try_from_secs_f64(secs)
                .with_context(|| format!("{} must be a non-negative number of seconds", key))
        }
        Err(_) => Ok(default),
    }
}
