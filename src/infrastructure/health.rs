// Database Health Prober - liveness round-trip, latency and pool occupancy

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::infrastructure::pool::{ConnectionManager, ConnectionPool, PoolError, PoolSnapshot};
use crate::infrastructure::traits::HealthProbe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    Pool(PoolError),
    Query(String),
    Timeout(Duration),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Pool(err) => write!(f, "{}", err),
            ProbeError::Query(msg) => write!(f, "probe query failed: {}", msg),
            ProbeError::Timeout(timeout) => {
                write!(f, "probe timed out after {:.3}s", timeout.as_secs_f64())
            }
        }
    }
}

impl std::error::Error for ProbeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// One health observation; immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub timestamp: DateTime<Utc>,
    pub status: HealthState,
    /// Seconds taken by the probe query, present only when healthy
    pub response_time: Option<f64>,
    pub error: Option<String>,
    pub pool: PoolSnapshot,
}

impl HealthRecord {
    pub fn from_check(result: Result<Duration, ProbeError>, pool: PoolSnapshot) -> Self {
        match result {
            Ok(elapsed) => Self {
                timestamp: Utc::now(),
                status: HealthState::Healthy,
                response_time: Some(elapsed.as_secs_f64()),
                error: None,
                pool,
            },
            Err(err) => Self {
                timestamp: Utc::now(),
                status: HealthState::Unhealthy,
                response_time: None,
                error: Some(err.to_string()),
                pool,
            },
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}

/// Runs `SELECT 1` style round-trips through the shared pool
pub struct DatabaseProber<M: ConnectionManager> {
    pool: ConnectionPool<M>,
    timeout: Duration,
}

impl<M: ConnectionManager> DatabaseProber<M> {
    pub fn new(pool: ConnectionPool<M>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Single liveness check, no retries
    pub async fn check(&self) -> Result<Duration, ProbeError> {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, self.round_trip()).await {
            Ok(Ok(())) => Ok(started.elapsed()),
            Ok(Err(err)) => {
                warn!("Database health probe failed: {}", err);
                Err(err)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Database health probe timed out"
                );
                Err(ProbeError::Timeout(self.timeout))
            }
        }
    }

    async fn round_trip(&self) -> Result<(), ProbeError> {
        let mut conn = self.pool.acquire().await.map_err(ProbeError::Pool)?;
        match self.pool.ping(&mut conn).await {
            Ok(()) => Ok(()),
            Err(err) => {
                // a connection that cannot answer SELECT 1 is not worth keeping
                conn.invalidate();
                Err(ProbeError::Query(err.to_string()))
            }
        }
    }

    pub async fn probe(&self) -> HealthRecord {
        let result = self.check().await;
        HealthRecord::from_check(result, self.pool.snapshot())
    }

    pub fn snapshot_pool(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }
}

#[async_trait]
impl<M: ConnectionManager> HealthProbe for DatabaseProber<M> {
    async fn probe(&self) -> HealthRecord {
        DatabaseProber::probe(self).await
    }

    fn snapshot_pool(&self) -> PoolSnapshot {
        DatabaseProber::snapshot_pool(self)
    }
}
