// Portfolio API Server

use tokio::net::TcpListener;
use tracing::info;

use portfolio_api::{
    api::create_app, app_state::AppState, config::Config,
    infrastructure::monitoring::initialize_tracing,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Optional .env file
    dotenvy::dotenv().ok();
    initialize_tracing();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize application state
    let app_state = AppState::new(config.clone()).await?;
    app_state.monitor.start()?;

    let app = create_app(app_state.clone());

    // Start server
    let addr = config.server_address();
    let listener = TcpListener::bind(&addr).await?;
    info!("🚀 Portfolio API starting on http://{}", addr);
    info!("📋 Endpoints:");
    info!("  GET    /api/health                  - Database and pool health");
    info!("  GET    /api/metrics                 - Pool and request metrics");
    info!("  POST   /api/admin/cleanup           - Dispose idle connections");
    info!("  GET    /api/monitoring/summary      - Rolling health summary");
    info!("  *      /api/portfolio/...           - Portfolio content");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Shutting down");
    app_state.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
