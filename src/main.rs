use std::net::SocketAddr;
use std::sync::Arc;

use agri_advisory::api::router;
use agri_advisory::config::Config;
use agri_advisory::store::connect_store;
use agri_advisory::types::AppState;
use agri_advisory::utils::init_tracing;
use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cfg = Arc::new(Config::from_env()?);

    let http = Client::builder()
        .timeout(cfg.request_timeout)
        .user_agent("agri-advisory-api/1.0")
        .build()
        .context("Failed to build reqwest client")?;

    if cfg.openweather_api_key.is_none() {
        warn!("OPENWEATHER_API_KEY is not set; only cached forecasts can be served");
    }

    let store = connect_store(&cfg).await;
    let state = AppState {
        cfg: cfg.clone(),
        http,
        store,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

    info!("Agri advisory API listening on {}", cfg.listen_addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server failed")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
