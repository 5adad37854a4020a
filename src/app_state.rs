use std::sync::Arc;
use tracing::{error, info};

use crate::{
    config::Config,
    data_seeder, database,
    infrastructure::{
        health::DatabaseProber,
        middleware::MiddlewareStack,
        monitoring::DatabaseMonitor,
        sqlite_database::{connect_pool, SqliteManager, SqlitePool},
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub prober: Arc<DatabaseProber<SqliteManager>>,
    pub monitor: Arc<DatabaseMonitor>,
    pub middleware: MiddlewareStack,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // Initialize database
        let pool = connect_pool(&config.database, config.pool.clone())?;
        {
            let mut conn = pool.acquire().await?;
            database::ensure_schema(&mut conn).await?;
            if config.seed_demo_data {
                data_seeder::seed_demo_data(&mut conn).await?;
            }
        }

        let prober = Arc::new(DatabaseProber::new(
            pool.clone(),
            config.database.read_timeout,
        ));
        let monitor = Arc::new(DatabaseMonitor::new(
            config.monitor.clone(),
            prober.clone(),
            Arc::new(pool.clone()),
        ));
        let middleware = MiddlewareStack::new(config.request.clone(), &config.circuit_breaker);

        Ok(Self {
            config: Arc::new(config),
            pool,
            prober,
            monitor,
            middleware,
        })
    }

    /// Stop background monitoring, then release every pooled connection
    pub async fn shutdown(&self) {
        self.monitor.stop().await;
        match self.pool.close().await {
            Ok(closed) => info!(closed, "Connection pool closed"),
            Err(e) => error!("Failed to close connection pool cleanly: {}", e),
        }
    }
}
