use async_trait::async_trait;

use crate::error::AppResult;
use crate::infrastructure::health::HealthRecord;
use crate::infrastructure::pool::PoolSnapshot;

/// Source of health records sampled by the periodic monitor
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self) -> HealthRecord;
    fn snapshot_pool(&self) -> PoolSnapshot;
}

/// Corrective action taken after sustained health-check failure
#[async_trait]
pub trait Remediation: Send + Sync {
    /// Returns a human-readable summary of what was done
    async fn remediate(&self) -> AppResult<String>;
}
