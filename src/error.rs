use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

use crate::infrastructure::pool::PoolError;

#[derive(Debug)]
pub enum AppError {
    DatabaseError(String),
    NotFound(String),
    BadRequest(String),
    Internal(String),
    Validation(String),
    SerializationError(String),
    // Resilience layer
    PoolExhausted(String),
    CircuitOpen { retry_after: Duration },
    RemediationFailure(String),
}

/// Error body attached to error responses so the request middleware can
/// stamp the request id onto it before it leaves the process.
#[derive(Debug, Clone)]
pub struct ErrorBody {
    pub message: String,
    pub body: Value,
}

impl AppError {
    /// Short machine-readable classification used in error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::DatabaseError(_) => "database_error",
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
            AppError::Validation(_) => "validation_error",
            AppError::SerializationError(_) => "serialization_error",
            AppError::PoolExhausted(_) => "pool_exhausted",
            AppError::CircuitOpen { .. } => "circuit_open",
            AppError::RemediationFailure(_) => "remediation_failure",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PoolExhausted(_) | AppError::CircuitOpen { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::SerializationError(_)
            | AppError::RemediationFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::PoolExhausted(msg) => write!(f, "Connection pool exhausted: {}", msg),
            AppError::CircuitOpen { retry_after } => write!(
                f,
                "Circuit breaker is open, retry after {:.3}s",
                retry_after.as_secs_f64()
            ),
            AppError::RemediationFailure(msg) => write!(f, "Remediation failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::RemediationFailure(msg) => {
                tracing::error!("Remediation failed: {}", msg);
                msg.clone()
            }
            AppError::NotFound(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg)
            | AppError::SerializationError(msg)
            | AppError::PoolExhausted(msg) => msg.clone(),
            AppError::CircuitOpen { .. } => "Service temporarily unavailable".to_string(),
        };

        let mut body = json!({
            "error": self.kind(),
            "detail": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut retry_header = None;
        if let AppError::CircuitOpen { retry_after } = &self {
            body["circuit_breaker"] = json!("open");
            body["retry_after"] = json!(retry_after.as_secs_f64());
            // Retry-After only carries whole seconds
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            retry_header = HeaderValue::from_str(&secs.to_string()).ok();
        }

        let mut response = (status, Json(body.clone())).into_response();
        if let Some(value) = retry_header {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        response.extensions_mut().insert(ErrorBody {
            message: self.to_string(),
            body,
        });
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { .. } => AppError::PoolExhausted(err.to_string()),
            PoolError::Connect(_) | PoolError::Backend(_) | PoolError::Closed => {
                AppError::DatabaseError(err.to_string())
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
