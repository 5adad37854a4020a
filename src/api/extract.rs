// Request extractors shared by the API handlers

use axum::{
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use sqlx::sqlite::SqliteConnection;

use crate::app_state::AppState;
use crate::database::StoreConnection;
use crate::error::AppError;
use crate::infrastructure::middleware::RequestContext;
use crate::infrastructure::pool::PooledConnection;
use crate::infrastructure::sqlite_database::SqliteManager;

/// One pooled connection per request; every statement the store runs on it
/// is counted into the request metrics
pub struct DbConn {
    conn: PooledConnection<SqliteManager>,
    context: Option<RequestContext>,
}

impl StoreConnection for DbConn {
    fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    fn record_query(&self) {
        if let Some(context) = &self.context {
            context.record_db_operation();
        }
    }
}

impl FromRequestParts<AppState> for DbConn {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = parts.extensions.get::<RequestContext>().cloned();
        let conn = state.pool.acquire().await?;
        Ok(Self { conn, context })
    }
}

/// JSON body whose rejections become 422 validation errors
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}
