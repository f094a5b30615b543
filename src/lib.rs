pub mod capture;
pub mod commands;
pub mod config;
pub mod error;
pub mod logger;
pub mod peer;
pub mod reaper;
pub mod registry;
pub mod screen_share;
pub mod session;
pub mod signaling;
pub mod utils;

use crate::config::Settings;
use crate::screen_share::ScreenShare;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run() -> anyhow::Result<()> {
    let settings = Settings::load()?;
    logger::init(settings.log_filter.as_deref());

    let addr = settings.listen_addr()?;
    let share = Arc::new(ScreenShare::from_settings(&settings));
    let app = commands::router(share.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Screen share signaling listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    share.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
