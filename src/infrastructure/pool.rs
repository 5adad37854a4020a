// Connection Pool Manager - owns every database connection handed to request handlers
// Sizing, overflow, recycling, pre-ping validation and disposal live here

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::traits::Remediation;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No connection became available within the pool timeout
    Exhausted { timeout: Duration },
    /// A new connection could not be established
    Connect(String),
    /// The driver reported an error on an open connection
    Backend(String),
    /// The pool has been shut down
    Closed,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Exhausted { timeout } => write!(
                f,
                "no connection available within {:.3}s",
                timeout.as_secs_f64()
            ),
            PoolError::Connect(msg) => write!(f, "failed to open connection: {}", msg),
            PoolError::Backend(msg) => write!(f, "connection error: {}", msg),
            PoolError::Closed => write!(f, "connection pool is closed"),
        }
    }
}

impl std::error::Error for PoolError {}

/// Opens, validates and closes the raw connections kept by a [`ConnectionPool`]
#[async_trait]
pub trait ConnectionManager: Send + Sync + 'static {
    type Connection: Send + 'static;

    async fn connect(&self) -> Result<Self::Connection, PoolError>;

    /// Cheap round-trip used for pre-ping and health probes
    async fn ping(&self, conn: &mut Self::Connection) -> Result<(), PoolError>;

    async fn close(&self, conn: Self::Connection) -> Result<(), PoolError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections kept idle between requests
    pub pool_size: usize,
    /// Extra connections allowed beyond `pool_size` under load
    pub max_overflow: usize,
    /// Connections older than this are discarded instead of reused
    pub recycle: Duration,
    /// How long `acquire` waits for a free slot
    pub timeout: Duration,
    pub pre_ping: bool,
    pub ping_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_overflow: 20,
            recycle: Duration::from_secs(3600),
            timeout: Duration::from_secs(30),
            pre_ping: true,
            ping_timeout: Duration::from_secs(30),
        }
    }
}

/// Point-in-time view of the pool counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub size: usize,
    pub max_overflow: usize,
    pub checked_in: usize,
    pub checked_out: usize,
    pub overflow: usize,
    pub invalidated: u64,
    pub generation: u64,
    pub recycle_secs: u64,
    pub pre_ping: bool,
}

struct Slot<C> {
    raw: C,
    created_at: Instant,
    generation: u64,
}

struct PoolState<C> {
    // Bumped by every dispose; slots from older generations are closed on release
    generation: u64,
    idle: VecDeque<Slot<C>>,
    checked_out: usize,
    invalidated: u64,
}

struct PoolInner<M: ConnectionManager> {
    manager: M,
    config: PoolConfig,
    permits: Arc<Semaphore>,
    state: Mutex<PoolState<M::Connection>>,
}

impl<M: ConnectionManager> PoolInner<M> {
    fn lock_state(&self) -> MutexGuard<'_, PoolState<M::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open_slot(&self) -> Result<Slot<M::Connection>, PoolError> {
        let raw = self.manager.connect().await?;
        let generation = self.lock_state().generation;
        debug!(generation, "Opened new database connection");
        Ok(Slot {
            raw,
            created_at: Instant::now(),
            generation,
        })
    }

    async fn ping_slot(&self, slot: &mut Slot<M::Connection>) -> Result<(), PoolError> {
        match tokio::time::timeout(self.config.ping_timeout, self.manager.ping(&mut slot.raw)).await
        {
            Ok(result) => result,
            Err(_) => Err(PoolError::Backend(format!(
                "ping timed out after {:.3}s",
                self.config.ping_timeout.as_secs_f64()
            ))),
        }
    }

    /// `None` when a dispose retired the slot's generation while it was being validated
    fn check_out(&self, slot: Slot<M::Connection>) -> Option<Slot<M::Connection>> {
        let stale = {
            let mut state = self.lock_state();
            if slot.generation == state.generation {
                state.checked_out += 1;
                return Some(slot);
            }
            slot
        };
        debug!("Dropped connection retired by dispose during checkout");
        drop(stale);
        None
    }

    /// Drops a connection that never made it back to a caller
    fn discard(&self, slot: Slot<M::Connection>, reason: &str) {
        {
            let mut state = self.lock_state();
            if slot.generation == state.generation {
                state.invalidated += 1;
            }
        }
        debug!(reason, "Discarded pooled connection");
        drop(slot);
    }

    fn release(&self, slot: Slot<M::Connection>) {
        let discarded = {
            let mut state = self.lock_state();
            if slot.generation != state.generation {
                Some(slot)
            } else {
                state.checked_out = state.checked_out.saturating_sub(1);
                if slot.created_at.elapsed() >= self.config.recycle {
                    state.invalidated += 1;
                    Some(slot)
                } else if state.idle.len() >= self.config.pool_size {
                    // overflow connection
                    Some(slot)
                } else {
                    state.idle.push_back(slot);
                    None
                }
            }
        };
        drop(discarded);
    }

    fn invalidate(&self, slot: Slot<M::Connection>) {
        {
            let mut state = self.lock_state();
            if slot.generation == state.generation {
                state.checked_out = state.checked_out.saturating_sub(1);
                state.invalidated += 1;
            }
        }
        drop(slot);
    }
}

/// Bounded pool of database connections shared by every request handler
pub struct ConnectionPool<M: ConnectionManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ConnectionManager> Clone for ConnectionPool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ConnectionManager> ConnectionPool<M> {
    pub fn new(manager: M, config: PoolConfig) -> Self {
        let capacity = (config.pool_size + config.max_overflow).max(1);
        Self {
            inner: Arc::new(PoolInner {
                manager,
                permits: Arc::new(Semaphore::new(capacity)),
                state: Mutex::new(PoolState {
                    generation: 0,
                    idle: VecDeque::with_capacity(config.pool_size),
                    checked_out: 0,
                    invalidated: 0,
                }),
                config,
            }),
        }
    }

    pub fn manager(&self) -> &M {
        &self.inner.manager
    }

    /// Check out a connection, waiting at most `config.timeout` for a free slot.
    ///
    /// Idle connections past their recycle age, or failing pre-ping, are
    /// discarded and replaced by a freshly opened one.
    pub async fn acquire(&self) -> Result<PooledConnection<M>, PoolError> {
        let timeout = self.inner.config.timeout;
        let permit =
            match tokio::time::timeout(timeout, Arc::clone(&self.inner.permits).acquire_owned())
                .await
            {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(PoolError::Closed),
                Err(_) => {
                    warn!(
                        timeout_secs = timeout.as_secs_f64(),
                        "⏳ Connection pool exhausted"
                    );
                    return Err(PoolError::Exhausted { timeout });
                }
            };

        let slot = loop {
            let candidate = self.inner.lock_state().idle.pop_front();
            let slot = match candidate {
                None => self.inner.open_slot().await?,
                Some(mut slot) => {
                    if slot.created_at.elapsed() >= self.inner.config.recycle {
                        self.inner.discard(slot, "recycle age reached");
                        continue;
                    }

                    if self.inner.config.pre_ping {
                        if let Err(err) = self.inner.ping_slot(&mut slot).await {
                            warn!("Pre-ping failed, replacing connection: {}", err);
                            self.inner.discard(slot, "pre-ping failed");
                            continue;
                        }
                    }
                    slot
                }
            };

            if let Some(slot) = self.inner.check_out(slot) {
                break slot;
            }
        };

        Ok(PooledConnection {
            slot: Some(slot),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Run the manager's liveness round-trip on a checked-out connection
    pub async fn ping(&self, conn: &mut PooledConnection<M>) -> Result<(), PoolError> {
        match conn.slot.as_mut() {
            Some(slot) => self.inner.ping_slot(slot).await,
            None => Err(PoolError::Closed),
        }
    }

    /// Close every idle connection and reset all counters.
    ///
    /// Connections checked out at this point belong to the previous generation;
    /// they are closed when released and never touch the new counters.
    pub async fn dispose(&self) -> Result<usize, PoolError> {
        let drained: Vec<_> = {
            let mut state = self.inner.lock_state();
            state.generation += 1;
            state.checked_out = 0;
            state.invalidated = 0;
            state.idle.drain(..).collect()
        };

        let total = drained.len();
        let mut failures = Vec::new();
        for slot in drained {
            if let Err(err) = self.inner.manager.close(slot.raw).await {
                failures.push(err.to_string());
            }
        }

        if failures.is_empty() {
            info!(closed = total, "🧹 Connection pool disposed");
            Ok(total)
        } else {
            Err(PoolError::Backend(format!(
                "{} of {} connections failed to close: {}",
                failures.len(),
                total,
                failures.join("; ")
            )))
        }
    }

    /// Stop handing out connections and dispose of the idle ones
    pub async fn close(&self) -> Result<usize, PoolError> {
        self.inner.permits.close();
        self.dispose().await
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let config = &self.inner.config;
        let state = self.inner.lock_state();
        let checked_in = state.idle.len();
        PoolSnapshot {
            size: config.pool_size,
            max_overflow: config.max_overflow,
            checked_in,
            checked_out: state.checked_out,
            overflow: (checked_in + state.checked_out).saturating_sub(config.pool_size),
            invalidated: state.invalidated,
            generation: state.generation,
            recycle_secs: config.recycle.as_secs(),
            pre_ping: config.pre_ping,
        }
    }
}

#[async_trait]
impl<M: ConnectionManager> Remediation for ConnectionPool<M> {
    async fn remediate(&self) -> AppResult<String> {
        let closed = self
            .dispose()
            .await
            .map_err(|e| AppError::RemediationFailure(e.to_string()))?;
        Ok(format!("Disposed {} idle connection(s)", closed))
    }
}

/// Connection checked out of a [`ConnectionPool`]; returned to it on drop
pub struct PooledConnection<M: ConnectionManager> {
    slot: Option<Slot<M::Connection>>,
    pool: Arc<PoolInner<M>>,
    _permit: OwnedSemaphorePermit,
}

impl<M: ConnectionManager> PooledConnection<M> {
    /// Throw the connection away instead of returning it to the pool
    pub fn invalidate(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.invalidate(slot);
        }
    }
}

impl<M: ConnectionManager> Deref for PooledConnection<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.slot.as_ref().expect("connection is present until drop").raw
    }
}

impl<M: ConnectionManager> DerefMut for PooledConnection<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.slot.as_mut().expect("connection is present until drop").raw
    }
}

impl<M: ConnectionManager> Drop for PooledConnection<M> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.release(slot);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    pub(crate) struct MockManager {
        pub opened: AtomicU64,
        pub closed: AtomicU64,
        pub failing_pings: AtomicU64,
        pub ping_delay_ms: AtomicU64,
    }

    #[async_trait]
    impl ConnectionManager for MockManager {
        type Connection = u64;

        async fn connect(&self) -> Result<u64, PoolError> {
            Ok(self.opened.fetch_add(1, Ordering::SeqCst) + 1)
        }

        async fn ping(&self, _conn: &mut u64) -> Result<(), PoolError> {
            let delay = self.ping_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            if self.failing_pings.load(Ordering::SeqCst) > 0 {
                self.failing_pings.fetch_sub(1, Ordering::SeqCst);
                return Err(PoolError::Backend("server has gone away".to_string()));
            }
            Ok(())
        }

        async fn close(&self, _conn: u64) -> Result<(), PoolError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pool_with(pool_size: usize, max_overflow: usize) -> ConnectionPool<MockManager> {
        ConnectionPool::new(
            MockManager::default(),
            PoolConfig {
                pool_size,
                max_overflow,
                timeout: Duration::from_millis(50),
                ..PoolConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_acquire_and_release_updates_counters() {
        let pool = pool_with(2, 0);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 1);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_out, 1);
        assert_eq!(snapshot.checked_in, 0);

        drop(conn);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(snapshot.checked_in, 1);

        // idle connection is reused
        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 1);
        assert_eq!(pool.manager().opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_times_out_when_exhausted() {
        let pool = pool_with(1, 0);
        let _held = pool.acquire().await.unwrap();

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Exhausted { .. })));
    }

    #[tokio::test]
    async fn test_overflow_connections_are_closed_on_release() {
        let pool = pool_with(1, 1);
        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();
        assert_eq!(pool.snapshot().overflow, 1);

        drop(first);
        drop(second);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_in, 1);
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(snapshot.overflow, 0);
    }

    #[tokio::test]
    async fn test_recycled_connections_are_discarded() {
        let pool = ConnectionPool::new(
            MockManager::default(),
            PoolConfig {
                recycle: Duration::ZERO,
                ..PoolConfig::default()
            },
        );

        drop(pool.acquire().await.unwrap());
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_in, 0);
        assert_eq!(snapshot.invalidated, 1);

        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 2);
    }

    #[tokio::test]
    async fn test_failed_pre_ping_replaces_connection() {
        let pool = pool_with(2, 0);
        drop(pool.acquire().await.unwrap());

        pool.manager().failing_pings.store(1, Ordering::SeqCst);
        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 2);
        assert_eq!(pool.snapshot().invalidated, 1);
    }

    #[tokio::test]
    async fn test_dispose_then_acquire_reopens() {
        let pool = pool_with(2, 0);
        let first = pool.acquire().await.unwrap();
        let stale = pool.acquire().await.unwrap();
        drop(first);

        let closed = pool.dispose().await.unwrap();
        assert_eq!(closed, 1);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_in, 0);
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(snapshot.invalidated, 0);
        assert_eq!(snapshot.generation, 1);

        let fresh = pool.acquire().await.unwrap();
        assert_eq!(*fresh, 3);
        assert_eq!(pool.snapshot().checked_out, 1);

        // connection from the disposed generation does not rejoin the pool
        drop(stale);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_out, 1);
        assert_eq!(snapshot.checked_in, 0);
    }

    #[tokio::test]
    async fn test_dispose_during_pre_ping_retires_popped_connection() {
        let pool = pool_with(2, 0);
        drop(pool.acquire().await.unwrap());
        pool.manager().ping_delay_ms.store(100, Ordering::SeqCst);

        let acquiring = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        // the idle connection is mid pre-ping, so there is nothing idle to close
        assert_eq!(pool.dispose().await.unwrap(), 0);

        let conn = acquiring.await.unwrap().unwrap();
        assert_eq!(*conn, 2);
        assert_eq!(pool.snapshot().checked_out, 1);

        drop(conn);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_in, 1);
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(snapshot.generation, 1);
    }

    #[tokio::test]
    async fn test_invalidate_discards_connection() {
        let pool = pool_with(2, 0);
        let conn = pool.acquire().await.unwrap();
        conn.invalidate();

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.checked_out, 0);
        assert_eq!(snapshot.checked_in, 0);
        assert_eq!(snapshot.invalidated, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let pool = pool_with(1, 0);
        pool.close().await.unwrap();
        assert!(matches!(pool.acquire().await, Err(PoolError::Closed)));
    }
}
