mod api;
mod config;
mod db;
mod errors;
mod models;
mod state;

use crate::config::{Config, DEV_API_KEY};
use crate::errors::ApiError;
use crate::state::AppState;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env().map_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
        ApiError::Internal
    })?;
    if config.api_key == DEV_API_KEY {
        tracing::warn!("API_KEY not set; protected routes accept the development key");
    }

    std::fs::create_dir_all(&config.data_dir).map_err(|e| {
        tracing::error!(path = %config.data_dir.display(), error = %e, "cannot create data dir");
        ApiError::Internal
    })?;

    let db_path = config.data_dir.join("wellness.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    let addr = config.addr.clone();
    let state = AppState::initialize(config, db).await?;

    // Expired proofs are otherwise only dropped on lookup.
    let proofs = state.proofs.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(60));
        loop {
            tick.tick().await;
            let purged = proofs.cache().purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "expired proofs purged");
            }
        }
    });

    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(%addr, error = %e, "cannot bind");
        ApiError::Internal
    })?;

    tracing::info!(%addr, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!("backend stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
