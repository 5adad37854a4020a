// HTTP interface - assembles the full router behind the middleware stack

pub mod extract;
pub mod portfolio;
pub mod system;

use axum::{http::Uri, Router};

use crate::app_state::AppState;
use crate::error::AppError;

pub fn create_app(state: AppState) -> Router {
    let router = Router::new()
        .merge(system::system_routes())
        .nest("/api/portfolio", portfolio::portfolio_routes())
        .fallback(route_not_found);

    state.middleware.apply(router).with_state(state)
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("No route for {}", uri.path()))
}
