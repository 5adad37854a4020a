// Service routes - root, health, metrics, admin cleanup and monitoring views

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::app_state::AppState;
use crate::infrastructure::health::HealthRecord;
use crate::infrastructure::middleware::{CircuitSnapshot, CircuitState};
use crate::infrastructure::monitoring::{HealthSummary, ServiceStatus};
use crate::infrastructure::pool::PoolSnapshot;
use crate::infrastructure::traits::Remediation;

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/api", get(root))
        .route("/api/", get(root))
        .route("/api/health", get(health_check))
        .route("/api/metrics", get(metrics))
        .route("/api/admin/cleanup", post(admin_cleanup))
        .route("/api/monitoring/summary", get(monitoring_summary))
        .route("/api/monitoring/details", get(monitoring_details))
        .route("/api/monitoring/requests", get(monitoring_requests))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Portfolio API is running" }))
}

/// Saturated when every slot, overflow included, is checked out
fn pool_saturated(pool: &PoolSnapshot) -> bool {
    pool.checked_out >= pool.size + pool.max_overflow
}

pub fn overall_status(record: &HealthRecord, circuit: &CircuitSnapshot) -> ServiceStatus {
    if !record.is_healthy() {
        ServiceStatus::Unhealthy
    } else if circuit.state != CircuitState::Closed || pool_saturated(&record.pool) {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Healthy
    }
}

fn database_section(record: &HealthRecord) -> Value {
    json!({
        "status": record.status,
        "response_time": record.response_time,
        "error": record.error,
    })
}

async fn health_check(State(state): State<AppState>) -> Response {
    let record = state.prober.probe().await;
    let circuit = state.middleware.breaker.snapshot().await;
    let status = overall_status(&record, &circuit);

    let code = if status == ServiceStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(json!({
            "status": status,
            "database": database_section(&record),
            "connection_pool": record.pool,
            "circuit_breaker": circuit,
            "timestamp": record.timestamp.to_rfc3339(),
        })),
    )
        .into_response()
}

async fn metrics(State(state): State<AppState>) -> Json<Value> {
    let record = state.prober.probe().await;
    let requests = state.middleware.requests.stats().await;

    Json(json!({
        "database": database_section(&record),
        "connection_pool": record.pool,
        "requests": requests,
        "timestamp": record.timestamp.to_rfc3339(),
    }))
}

async fn admin_cleanup(State(state): State<AppState>) -> Response {
    match state.pool.remediate().await {
        Ok(message) => Json(json!({
            "success": true,
            "message": message,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => {
            error!("Manual connection cleanup failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": e.to_string(),
                    "timestamp": Utc::now().to_rfc3339(),
                })),
            )
                .into_response()
        }
    }
}

async fn monitoring_summary(State(state): State<AppState>) -> Json<HealthSummary> {
    Json(state.monitor.summary().await)
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

async fn monitoring_details(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(10);
    Json(json!({
        "metrics": state.monitor.detailed_metrics().await,
        "recent_records": state.monitor.recent_records(limit).await,
        "circuit_breaker": state.middleware.breaker.snapshot().await,
        "connection_pool": state.prober.snapshot_pool(),
    }))
}

async fn monitoring_requests(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(20);
    let stats = match state.middleware.requests.stats().await {
        Some(stats) => json!(stats),
        None => json!({ "message": "No completed requests" }),
    };
    Json(json!({
        "stats": stats,
        "recent": state.middleware.requests.recent(limit).await,
    }))
}
