//! HTTP server lifecycle.

use crate::web::{routes, AppState};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use tokio::sync::watch;

/// Serve the gateway API on `bind` until the shutdown signal fires.
pub async fn serve(
    bind: SocketAddr,
    state: AppState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind web listener on {bind}"))?;
    tracing::info!(%bind, "web gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown_rx.borrow() {
                if shutdown_rx.changed().await.is_err() {
                    break;
                }
            }
            tracing::info!("web gateway shutting down");
        })
        .await
        .context("web server failed")?;
    Ok(())
}
