// Core infrastructure modules
pub mod pool;                  // Connection pool manager
pub mod sqlite_database;       // SQLite connection manager for the pool
pub mod health;                // Database health prober
pub mod monitoring;            // Periodic monitor and tracing setup
pub mod middleware;            // Request tracking and circuit breaker
pub mod rolling_log;           // Bounded history buffer
pub mod traits;                // Infrastructure traits

// Re-export core infrastructure components
pub use pool::{ConnectionManager, ConnectionPool, PoolConfig, PoolError, PoolSnapshot, PooledConnection};
pub use sqlite_database::{connect_pool, SqliteManager, SqlitePool};
pub use health::{DatabaseProber, HealthRecord, HealthState, ProbeError};
pub use monitoring::{initialize_tracing, CheckOutcome, DatabaseMonitor, MonitorConfig, ServiceStatus};
pub use rolling_log::RollingLog;
pub use traits::{HealthProbe, Remediation};
