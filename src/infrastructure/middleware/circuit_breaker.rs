// Circuit Breaker Middleware - process-wide guard in front of every handler
// Rejects requests with 503 while open so a failing database is not hammered

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Breaker state machine; time is passed in so transitions are deterministic
#[derive(Debug, Clone)]
pub struct CircuitBreakerState {
    state: CircuitState,
    failures: u32,
    last_failure_time: Option<Instant>,
    failure_threshold: u32,
    recovery_timeout: Duration,
}

impl CircuitBreakerState {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            last_failure_time: None,
            failure_threshold: config.failure_threshold.max(1),
            recovery_timeout: config.recovery_timeout,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Decide whether a request may proceed; `Err` carries the remaining cooldown
    pub fn admit(&mut self, now: Instant) -> Result<(), Duration> {
        if self.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = self
            .last_failure_time
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default();

        if elapsed > self.recovery_timeout {
            self.state = CircuitState::HalfOpen;
            Ok(())
        } else {
            Err(self.recovery_timeout.saturating_sub(elapsed))
        }
    }

    /// Only a half-open success closes the breaker; closed successes leave the count alone
    pub fn on_success(&mut self) -> bool {
        if self.state == CircuitState::HalfOpen {
            self.failures = 0;
            self.state = CircuitState::Closed;
            return true;
        }
        false
    }

    /// Returns true when this failure opened the breaker
    pub fn on_failure(&mut self, now: Instant) -> bool {
        self.failures += 1;
        self.last_failure_time = Some(now);

        if self.failures >= self.failure_threshold && self.state != CircuitState::Open {
            self.state = CircuitState::Open;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub recovery_timeout: f64,
}

pub struct CircuitBreaker {
    state: Arc<RwLock<CircuitBreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(CircuitBreakerState::new(config))),
        }
    }

    pub async fn admit(&self) -> AppResult<()> {
        let mut state = self.state.write().await;
        let before = state.state();
        match state.admit(Instant::now()) {
            Ok(()) => {
                if before == CircuitState::Open {
                    info!("🔌 Circuit breaker half-open, letting a trial request through");
                }
                Ok(())
            }
            Err(retry_after) => Err(AppError::CircuitOpen { retry_after }),
        }
    }

    pub async fn record_success(&self) {
        if self.state.write().await.on_success() {
            info!("✅ Circuit breaker closed");
        }
    }

    pub async fn record_failure(&self) {
        let mut state = self.state.write().await;
        if state.on_failure(Instant::now()) {
            warn!(
                failures = state.failures(),
                "🚨 Circuit breaker opened after {} failures",
                state.failures()
            );
        }
    }

    pub async fn snapshot(&self) -> CircuitSnapshot {
        let state = self.state.read().await;
        CircuitSnapshot {
            state: state.state,
            failure_count: state.failures,
            failure_threshold: state.failure_threshold,
            recovery_timeout: state.recovery_timeout.as_secs_f64(),
        }
    }
}

/// A server error or a panic downstream counts as a failure
pub async fn circuit_breaker_middleware(
    State(breaker): State<Arc<CircuitBreaker>>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(rejection) = breaker.admit().await {
        return rejection.into_response();
    }

    match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => {
            if response.status().is_server_error() {
                breaker.record_failure().await;
            } else {
                breaker.record_success().await;
            }
            response
        }
        Err(panic) => {
            breaker.record_failure().await;
            std::panic::resume_unwind(panic)
        }
    }
}
