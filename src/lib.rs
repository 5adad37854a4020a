// Portfolio API - portfolio content service on a resilient database layer

// HTTP routes and extractors
pub mod api;

// Application wiring and configuration
pub mod app_state;
pub mod config;

// Connection pool, health probing, monitoring and request middleware
pub mod infrastructure;

// Portfolio content
pub mod database;
pub mod models;

// Common utilities
pub mod data_seeder;
pub mod error;

// Re-exports for convenience
pub use error::{AppError, AppResult};
