// Request Tracking Middleware - request ids, timing, timeouts and panic containment
// Outermost layer: every response leaving the app carries X-Request-ID

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::ErrorBody;
use crate::infrastructure::rolling_log::RollingLog;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTrackingConfig {
    pub timeout: Duration,
    /// Requests slower than this are logged at warn level
    pub slow_threshold: Duration,
    pub max_records: usize,
}

impl Default for RequestTrackingConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            slow_threshold: Duration::from_secs(5),
            max_records: 1000,
        }
    }
}

/// Request-scoped context injected into request extensions for handlers
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    db_operations: Arc<AtomicU32>,
}

impl RequestContext {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            db_operations: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn record_db_operation(&self) {
        self.db_operations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn db_operations(&self) -> u32 {
        self.db_operations.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestMetrics {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds
    pub duration: Option<f64>,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub db_operations: u32,
}

impl RequestMetrics {
    fn start(request_id: &str, request: &Request) -> Self {
        Self {
            request_id: request_id.to_string(),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            status_code: None,
            error: None,
            db_operations: 0,
        }
    }

    fn finish(&mut self, status: StatusCode, elapsed: Duration, db_operations: u32) {
        self.end_time = Some(Utc::now());
        self.duration = Some(elapsed.as_secs_f64());
        self.status_code = Some(status.as_u16());
        self.db_operations = db_operations;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub total_requests: usize,
    pub active_requests: usize,
    pub average_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
    pub slow_requests: usize,
    pub error_requests: usize,
    pub error_rate: f64,
    pub slow_request_rate: f64,
}

/// Process-wide request statistics shared by the middleware and the monitoring routes
pub struct RequestTracker {
    config: RequestTrackingConfig,
    active: AtomicUsize,
    completed: Mutex<RollingLog<RequestMetrics>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl RequestTracker {
    pub fn new(config: RequestTrackingConfig) -> Self {
        let completed = Mutex::new(RollingLog::new(config.max_records));
        Self {
            config,
            active: AtomicUsize::new(0),
            completed,
        }
    }

    pub fn active_requests(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn enter(&self) -> ActiveGuard<'_> {
        self.active.fetch_add(1, Ordering::Relaxed);
        ActiveGuard(&self.active)
    }

    async fn complete(&self, metrics: RequestMetrics) {
        let duration = metrics.duration.unwrap_or_default();
        let status = metrics.status_code.unwrap_or_default();
        if duration > self.config.slow_threshold.as_secs_f64() {
            warn!(
                request_id = %metrics.request_id,
                status,
                db_operations = metrics.db_operations,
                "🐌 Slow request: {} {} took {:.3}s",
                metrics.method,
                metrics.path,
                duration
            );
        } else {
            info!(
                request_id = %metrics.request_id,
                status,
                db_operations = metrics.db_operations,
                "{} {} completed in {:.3}s",
                metrics.method,
                metrics.path,
                duration
            );
        }

        self.completed.lock().await.push(metrics);
    }

    pub async fn stats(&self) -> Option<PerformanceStats> {
        let completed = self.completed.lock().await;
        if completed.is_empty() {
            return None;
        }

        let durations: Vec<f64> = completed.iter().filter_map(|m| m.duration).collect();
        let slow_limit = self.config.slow_threshold.as_secs_f64();
        let total = completed.len();
        let slow = durations.iter().filter(|d| **d > slow_limit).count();
        let errors = completed.iter().filter(|m| m.error.is_some()).count();
        let fastest = durations.iter().copied().fold(f64::INFINITY, f64::min);

        Some(PerformanceStats {
            total_requests: total,
            active_requests: self.active_requests(),
            average_duration: if durations.is_empty() {
                0.0
            } else {
                durations.iter().sum::<f64>() / durations.len() as f64
            },
            min_duration: if fastest.is_finite() { fastest } else { 0.0 },
            max_duration: durations.iter().copied().fold(0.0, f64::max),
            slow_requests: slow,
            error_requests: errors,
            error_rate: errors as f64 / total as f64 * 100.0,
            slow_request_rate: slow as f64 / total as f64 * 100.0,
        })
    }

    /// Most recent completed requests, oldest first
    pub async fn recent(&self, n: usize) -> Vec<RequestMetrics> {
        self.completed.lock().await.recent(n).cloned().collect()
    }
}

/// First 8 characters of a v4 UUID
pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

pub async fn request_tracking_middleware(
    State(tracker): State<Arc<RequestTracker>>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = new_request_id();
    let context = RequestContext::new(request_id.clone());
    request.extensions_mut().insert(context.clone());

    let mut metrics = RequestMetrics::start(&request_id, &request);
    let _active = tracker.enter();
    let started = Instant::now();
    let timeout = tracker.config.timeout;

    let outcome =
        tokio::time::timeout(timeout, AssertUnwindSafe(next.run(request)).catch_unwind()).await;
    let elapsed = started.elapsed();

    let mut timed_out = false;
    let mut response = match outcome {
        Err(_) => {
            timed_out = true;
            error!(request_id = %request_id, "⏰ {} {} timed out", metrics.method, metrics.path);
            metrics.error = Some("Request timeout".to_string());
            timeout_response(&request_id, timeout)
        }
        Ok(Err(panic)) => {
            let message = panic_message(&*panic);
            error!(request_id = %request_id, "💥 {} {} panicked: {}", metrics.method, metrics.path, message);
            metrics.error = Some(message);
            internal_error_response(&request_id)
        }
        Ok(Ok(mut response)) => match response.extensions_mut().remove::<ErrorBody>() {
            Some(ErrorBody { message, body }) => {
                metrics.error = Some(message);
                stamp_request_id(response, body, &request_id)
            }
            None => response,
        },
    };

    metrics.finish(response.status(), elapsed, context.db_operations());

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    if !timed_out {
        if let Ok(value) = HeaderValue::from_str(&format!("{:.3}", elapsed.as_secs_f64())) {
            headers.insert(PROCESS_TIME_HEADER, value);
        }
    }

    tracker.complete(metrics).await;
    response
}

fn timeout_response(request_id: &str, timeout: Duration) -> Response {
    (
        StatusCode::GATEWAY_TIMEOUT,
        Json(json!({
            "error": "Request timeout",
            "request_id": request_id,
            "timeout": timeout.as_secs_f64(),
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

fn internal_error_response(request_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": "Internal server error",
            "request_id": request_id,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
        .into_response()
}

/// Rebuild an error response body with the request id added
fn stamp_request_id(response: Response, mut body: Value, request_id: &str) -> Response {
    let (mut parts, _) = response.into_parts();
    if let Value::Object(map) = &mut body {
        map.insert("request_id".to_string(), json!(request_id));
    }

    match serde_json::to_vec(&body) {
        Ok(bytes) => {
            parts.headers.remove(header::CONTENT_LENGTH);
            Response::from_parts(parts, Body::from(bytes))
        }
        Err(_) => internal_error_response(request_id),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
