//! Warden API Server
//!
//! REST API server for authentication, sessions and data records.
//!
//! Author: hephaex@gmail.com

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use warden_api::{create_router, state::AppState};
use warden_core::config::{AppConfig, LoggingConfig};
use warden_core::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    init_tracing(&config.logging);

    config.validate()?;
    if config.auth.uses_development_secret() {
        tracing::warn!("SECRET_KEY is not set; using the development signing key");
    }

    // Connect and migrate
    let pool = db::connect(&config.database).await?;
    if config.database.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // Create application state
    let state = Arc::new(AppState::from_pool(config, pool)?);

    // Create router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Warden API Server starting on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/api/docs", addr);
    tracing::info!("OpenAPI document at http://{}/api/openapi.json", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Warden API Server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warden_api={level},warden_core={level},audit=info,tower_http=info",
            level = logging.level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
