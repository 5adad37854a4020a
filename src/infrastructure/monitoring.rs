// Database Monitoring - periodic health sampling with automatic remediation
// Keeps a rolling health log, counts consecutive failures and disposes the pool when they pile up

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, AppResult};
use crate::infrastructure::health::HealthRecord;
use crate::infrastructure::rolling_log::RollingLog;
use crate::infrastructure::traits::{HealthProbe, Remediation};

/// Records considered by the summary view and written to the metrics file
const RECENT_WINDOW: usize = 10;
/// Healthy records in the recent window required for `healthy`; a young log stays `degraded`
const HEALTHY_MIN_COUNT: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    /// Consecutive failures that trigger remediation
    pub alert_threshold: u32,
    pub max_records: usize,
    pub metrics_file: Option<PathBuf>,
    /// Reset the failure counter even when remediation itself failed
    pub reset_after_failed_remediation: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            alert_threshold: 3,
            max_records: 1000,
            metrics_file: None,
            reset_after_failed_remediation: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
    #[serde(rename = "no_data")]
    NoData,
}

/// Result of a single monitor iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Healthy,
    Unhealthy { consecutive_failures: u32 },
    Remediated { succeeded: bool },
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: ServiceStatus,
    pub health_percentage: f64,
    pub consecutive_failures: u32,
    pub total_records: usize,
    pub last_check: Option<DateTime<Utc>>,
    pub last_cleanup: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetailedMetrics {
    pub total_records: usize,
    pub healthy_records: usize,
    pub unhealthy_records: usize,
    pub health_percentage: f64,
    /// Mean probe latency in seconds over healthy records only
    pub average_response_time: Option<f64>,
    pub consecutive_failures: u32,
    pub monitoring_duration_secs: f64,
    pub last_cleanup: Option<DateTime<Utc>>,
    pub remediations: u64,
    pub running: bool,
}

#[derive(Debug, Serialize)]
struct MetricsFile<'a> {
    timestamp: DateTime<Utc>,
    consecutive_failures: u32,
    total_records: usize,
    last_cleanup: Option<DateTime<Utc>>,
    recent_records: Vec<&'a HealthRecord>,
}

struct MonitorState {
    records: RollingLog<HealthRecord>,
    consecutive_failures: u32,
    last_cleanup: Option<DateTime<Utc>>,
    remediations: u64,
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DatabaseMonitor {
    config: MonitorConfig,
    probe: Arc<dyn HealthProbe>,
    remediation: Arc<dyn Remediation>,
    state: Mutex<MonitorState>,
    task: StdMutex<Option<RunningTask>>,
    created_at: DateTime<Utc>,
}

impl DatabaseMonitor {
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        remediation: Arc<dyn Remediation>,
    ) -> Self {
        let records = RollingLog::new(config.max_records);
        Self {
            config,
            probe,
            remediation,
            state: Mutex::new(MonitorState {
                records,
                consecutive_failures: 0,
                last_cleanup: None,
                remediations: 0,
            }),
            task: StdMutex::new(None),
            created_at: Utc::now(),
        }
    }

    /// One monitoring iteration: probe, record, remediate when the threshold is crossed
    pub async fn run_check(&self) -> CheckOutcome {
        let record = self.probe.probe().await;
        let healthy = record.is_healthy();
        let error_message = record.error.clone();

        let consecutive_failures = {
            let mut state = self.state.lock().await;
            state.records.push(record);
            if healthy {
                state.consecutive_failures = 0;
            } else {
                state.consecutive_failures += 1;
            }
            state.consecutive_failures
        };

        let outcome = if healthy {
            CheckOutcome::Healthy
        } else {
            warn!(
                consecutive_failures,
                "⚠️ Database health check failed: {}",
                error_message.as_deref().unwrap_or("unknown error")
            );
            if consecutive_failures >= self.config.alert_threshold {
                CheckOutcome::Remediated {
                    succeeded: self.remediate(consecutive_failures).await,
                }
            } else {
                CheckOutcome::Unhealthy {
                    consecutive_failures,
                }
            }
        };

        if let Some(path) = &self.config.metrics_file {
            if let Err(e) = self.save_metrics(path).await {
                warn!("Failed to write monitoring metrics to {}: {}", path.display(), e);
            }
        }

        outcome
    }

    async fn remediate(&self, consecutive_failures: u32) -> bool {
        error!(
            consecutive_failures,
            "🚨 Database unhealthy past alert threshold, disposing connection pool"
        );

        let result = self.remediation.remediate().await;
        let succeeded = result.is_ok();
        match result {
            Ok(message) => info!("🧹 Remediation completed: {}", message),
            Err(e) => error!("❌ CRITICAL: remediation failed: {}", e),
        }

        // every attempt counts as a cleanup, successful or not
        let mut state = self.state.lock().await;
        state.remediations += 1;
        state.last_cleanup = Some(Utc::now());
        if succeeded || self.config.reset_after_failed_remediation {
            state.consecutive_failures = 0;
        }
        succeeded
    }

    /// Spawn the background loop; rejected when already running
    pub fn start(self: &Arc<Self>) -> AppResult<()> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.is_some() {
            return Err(AppError::BadRequest(
                "database monitor is already running".to_string(),
            ));
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let monitor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            info!(
                interval_secs = monitor.config.check_interval.as_secs_f64(),
                "🔍 Database monitoring started"
            );
            // interval() rejects a zero period
            let period = monitor.config.check_interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        tokio::select! {
                            _ = cancelled.cancelled() => break,
                            _ = monitor.run_check() => {}
                        }
                    }
                }
            }
            info!("🛑 Database monitoring stopped");
        });

        *task = Some(RunningTask { token, handle });
        Ok(())
    }

    /// Cancel the background loop and wait for it to finish
    pub async fn stop(&self) {
        let running = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(RunningTask { token, handle }) = running {
            token.cancel();
            if let Err(e) = handle.await {
                error!("Database monitor task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub async fn summary(&self) -> HealthSummary {
        let state = self.state.lock().await;
        let recent: Vec<&HealthRecord> = state.records.recent(RECENT_WINDOW).collect();

        let (status, health_percentage) = if recent.is_empty() {
            (ServiceStatus::NoData, 0.0)
        } else {
            let healthy = recent.iter().filter(|r| r.is_healthy()).count();
            let status = if healthy >= HEALTHY_MIN_COUNT {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Degraded
            };
            (status, healthy as f64 / recent.len() as f64 * 100.0)
        };

        HealthSummary {
            status,
            health_percentage,
            consecutive_failures: state.consecutive_failures,
            total_records: state.records.len(),
            last_check: state.records.latest().map(|r| r.timestamp),
            last_cleanup: state.last_cleanup,
        }
    }

    pub async fn detailed_metrics(&self) -> DetailedMetrics {
        let state = self.state.lock().await;
        let total = state.records.len();
        let response_times: Vec<f64> = state
            .records
            .iter()
            .filter(|r| r.is_healthy())
            .filter_map(|r| r.response_time)
            .collect();
        let healthy = state.records.iter().filter(|r| r.is_healthy()).count();

        DetailedMetrics {
            total_records: total,
            healthy_records: healthy,
            unhealthy_records: total - healthy,
            health_percentage: if total == 0 {
                0.0
            } else {
                healthy as f64 / total as f64 * 100.0
            },
            average_response_time: if response_times.is_empty() {
                None
            } else {
                Some(response_times.iter().sum::<f64>() / response_times.len() as f64)
            },
            consecutive_failures: state.consecutive_failures,
            monitoring_duration_secs: (Utc::now() - self.created_at)
                .to_std()
                .unwrap_or_default()
                .as_secs_f64(),
            last_cleanup: state.last_cleanup,
            remediations: state.remediations,
            running: self.is_running(),
        }
    }

    /// Most recent records, oldest first
    pub async fn recent_records(&self, n: usize) -> Vec<HealthRecord> {
        let state = self.state.lock().await;
        state.records.recent(n).cloned().collect()
    }

    async fn save_metrics(&self, path: &Path) -> anyhow::Result<()> {
        let payload = {
            let state = self.state.lock().await;
            serde_json::to_vec_pretty(&MetricsFile {
                timestamp: Utc::now(),
                consecutive_failures: state.consecutive_failures,
                total_records: state.records.len(),
                last_cleanup: state.last_cleanup,
                recent_records: state.records.recent(RECENT_WINDOW).collect(),
            })?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

/// Install the global tracing subscriber (`RUST_LOG` overrides the `info` default)
pub fn initialize_tracing() {
    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if initialized.is_ok() {
        info!("Logging initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::health::ProbeError;
    use crate::infrastructure::pool::PoolSnapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct ScriptedProbe {
        failing: AtomicBool,
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self) -> HealthRecord {
            let result = if self.failing.load(Ordering::SeqCst) {
                Err(ProbeError::Query("connection refused".to_string()))
            } else {
                Ok(Duration::from_millis(2))
            };
            HealthRecord::from_check(result, self.snapshot_pool())
        }

        fn snapshot_pool(&self) -> PoolSnapshot {
            PoolSnapshot {
                size: 1,
                max_overflow: 0,
                checked_in: 0,
                checked_out: 0,
                overflow: 0,
                invalidated: 0,
                generation: 0,
                recycle_secs: 3600,
                pre_ping: true,
            }
        }
    }

    #[derive(Default)]
    struct CountingRemediation {
        calls: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl Remediation for CountingRemediation {
        async fn remediate(&self) -> AppResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                Err(AppError::RemediationFailure("dispose failed".to_string()))
            } else {
                Ok("disposed".to_string())
            }
        }
    }

    fn monitor_with(
        config: MonitorConfig,
    ) -> (Arc<DatabaseMonitor>, Arc<ScriptedProbe>, Arc<CountingRemediation>) {
        let probe = Arc::new(ScriptedProbe::default());
        let remediation = Arc::new(CountingRemediation::default());
        let monitor = Arc::new(DatabaseMonitor::new(
            config,
            probe.clone(),
            remediation.clone(),
        ));
        (monitor, probe, remediation)
    }

    #[tokio::test]
    async fn test_successful_checks_keep_counter_at_zero() {
        let (monitor, _, remediation) = monitor_with(MonitorConfig::default());

        for _ in 0..12 {
            assert_eq!(monitor.run_check().await, CheckOutcome::Healthy);
        }

        let summary = monitor.summary().await;
        assert_eq!(summary.consecutive_failures, 0);
        assert_eq!(summary.total_records, 12);
        assert_eq!(summary.status, ServiceStatus::Healthy);
        assert_eq!(remediation.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_health_log_keeps_only_latest_records() {
        let (monitor, probe, _) = monitor_with(MonitorConfig {
            max_records: 5,
            alert_threshold: 1000,
            ..MonitorConfig::default()
        });

        probe.failing.store(true, Ordering::SeqCst);
        for _ in 0..45 {
            monitor.run_check().await;
        }
        probe.failing.store(false, Ordering::SeqCst);
        for _ in 0..5 {
            monitor.run_check().await;
        }

        let records = monitor.recent_records(usize::MAX).await;
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.is_healthy()));
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        let summary = monitor.summary().await;
        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.last_check, Some(records[4].timestamp));
    }

    #[tokio::test]
    async fn test_young_log_needs_seven_healthy_records() {
        let (monitor, probe, _) = monitor_with(MonitorConfig {
            alert_threshold: 100,
            ..MonitorConfig::default()
        });

        probe.failing.store(true, Ordering::SeqCst);
        monitor.run_check().await;
        probe.failing.store(false, Ordering::SeqCst);
        for _ in 0..4 {
            monitor.run_check().await;
        }

        let summary = monitor.summary().await;
        assert_eq!(summary.status, ServiceStatus::Degraded);
        assert!((summary.health_percentage - 80.0).abs() < 1e-9);

        for _ in 0..3 {
            monitor.run_check().await;
        }
        assert_eq!(monitor.summary().await.status, ServiceStatus::Healthy);
    }

    #[tokio::test]
    async fn test_remediation_fires_once_per_threshold_crossing() {
        let (monitor, probe, remediation) = monitor_with(MonitorConfig::default());
        probe.failing.store(true, Ordering::SeqCst);

        assert_eq!(
            monitor.run_check().await,
            CheckOutcome::Unhealthy {
                consecutive_failures: 1
            }
        );
        monitor.run_check().await;
        assert_eq!(
            monitor.run_check().await,
            CheckOutcome::Remediated { succeeded: true }
        );
        assert_eq!(remediation.calls.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.summary().await.consecutive_failures, 0);

        // the fourth failure starts a new count
        assert_eq!(
            monitor.run_check().await,
            CheckOutcome::Unhealthy {
                consecutive_failures: 1
            }
        );
        monitor.run_check().await;
        assert_eq!(remediation.calls.load(Ordering::SeqCst), 1);

        monitor.run_check().await;
        assert_eq!(remediation.calls.load(Ordering::SeqCst), 2);

        let details = monitor.detailed_metrics().await;
        assert_eq!(details.remediations, 2);
        assert_eq!(details.unhealthy_records, 6);
        assert!(details.last_cleanup.is_some());
        assert!(details.average_response_time.is_none());
    }

    #[tokio::test]
    async fn test_failed_remediation_reset_policy() {
        let (monitor, probe, remediation) = monitor_with(MonitorConfig {
            alert_threshold: 1,
            ..MonitorConfig::default()
        });
        probe.failing.store(true, Ordering::SeqCst);
        remediation.fail.store(true, Ordering::SeqCst);

        assert_eq!(
            monitor.run_check().await,
            CheckOutcome::Remediated { succeeded: false }
        );
        let summary = monitor.summary().await;
        assert_eq!(summary.consecutive_failures, 0);
        assert!(summary.last_cleanup.is_some());
        assert_eq!(monitor.detailed_metrics().await.remediations, 1);

        let (monitor, probe, remediation) = monitor_with(MonitorConfig {
            alert_threshold: 1,
            reset_after_failed_remediation: false,
            ..MonitorConfig::default()
        });
        probe.failing.store(true, Ordering::SeqCst);
        remediation.fail.store(true, Ordering::SeqCst);

        monitor.run_check().await;
        assert_eq!(monitor.summary().await.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_summary_views() {
        let (monitor, probe, _) = monitor_with(MonitorConfig {
            alert_threshold: 100,
            ..MonitorConfig::default()
        });
        assert_eq!(monitor.summary().await.status, ServiceStatus::NoData);

        for _ in 0..6 {
            monitor.run_check().await;
        }
        probe.failing.store(true, Ordering::SeqCst);
        for _ in 0..4 {
            monitor.run_check().await;
        }

        let summary = monitor.summary().await;
        assert_eq!(summary.status, ServiceStatus::Degraded);
        assert!((summary.health_percentage - 60.0).abs() < 1e-9);
        assert_eq!(summary.consecutive_failures, 4);

        let details = monitor.detailed_metrics().await;
        assert_eq!(details.healthy_records, 6);
        assert!((details.average_response_time.unwrap() - 0.002).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let (monitor, _, _) = monitor_with(MonitorConfig {
            check_interval: Duration::from_millis(10),
            ..MonitorConfig::default()
        });

        monitor.start().unwrap();
        assert!(monitor.is_running());
        assert!(monitor.start().is_err());

        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;
        assert!(!monitor.is_running());
        assert!(monitor.summary().await.total_records >= 1);

        // can be started again after a stop
        monitor.start().unwrap();
        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_metrics_file_written_after_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics/db_health.json");
        let (monitor, _, _) = monitor_with(MonitorConfig {
            metrics_file: Some(path.clone()),
            ..MonitorConfig::default()
        });

        for _ in 0..12 {
            monitor.run_check().await;
        }

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert_eq!(written["total_records"], 12);
        assert_eq!(written["recent_records"].as_array().unwrap().len(), 10);
    }
}
