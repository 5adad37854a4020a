use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::infrastructure::pool::{ConnectionManager, ConnectionPool, PoolConfig, PoolError};

/// Pool of SQLite connections used by the whole application
pub type SqlitePool = ConnectionPool<SqliteManager>;

/// SQLite connection manager for the pool
pub struct SqliteManager {
    options: SqliteConnectOptions,
    connect_timeout: Duration,
}

impl SqliteManager {
    /// Build a manager from the database section of the config.
    ///
    /// The write timeout becomes the SQLite busy timeout; the parent directory
    /// of an on-disk database is created if missing.
    pub fn new(config: &DatabaseConfig) -> Result<Self, PoolError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| PoolError::Connect(format!("invalid database url: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.write_timeout);

        let filename = options.clone().get_filename();
        if let Some(parent) = filename.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PoolError::Connect(format!(
                        "failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(Self {
            options,
            connect_timeout: config.connect_timeout,
        })
    }
}

#[async_trait]
impl ConnectionManager for SqliteManager {
    type Connection = SqliteConnection;

    async fn connect(&self) -> Result<SqliteConnection, PoolError> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(PoolError::Connect(e.to_string())),
            Err(_) => Err(PoolError::Connect(format!(
                "timed out after {:.3}s",
                self.connect_timeout.as_secs_f64()
            ))),
        }
    }

    async fn ping(&self, conn: &mut SqliteConnection) -> Result<(), PoolError> {
        sqlx::query("SELECT 1")
            .execute(&mut *conn)
            .await
            .map(|_| ())
            .map_err(|e| PoolError::Backend(e.to_string()))
    }

    async fn close(&self, conn: SqliteConnection) -> Result<(), PoolError> {
        conn.close()
            .await
            .map_err(|e| PoolError::Backend(e.to_string()))
    }
}

/// Connect the application pool; the read timeout bounds pre-ping round-trips
pub fn connect_pool(database: &DatabaseConfig, mut pool: PoolConfig) -> Result<SqlitePool, PoolError> {
    pool.ping_timeout = database.read_timeout;
    let manager = SqliteManager::new(database)?;
    debug!(url = %database.url, pool_size = pool.pool_size, "Configured SQLite pool");
    Ok(ConnectionPool::new(manager, pool))
}
