//! Axum HTTP server, routing, and middleware.
//!
//! # Responsibilities
//! - Bind the TCP listener; a bind failure is the process's only fatal error.
//! - Define the Axum router with the greeting and health routes.
//! - Wrap the router in the tracing → logging → session pipeline.

pub mod handlers;
pub mod middleware;
pub mod router;

use anyhow::{Context, Result};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Bind `addr` and serve `app` until the listener fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server stops.
pub async fn serve(addr: &str, app: Router) -> Result<()> {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(addr, error = %e, "failed to bind listener");
            return Err(e).with_context(|| format!("failed to bind {addr}"));
        }
    };
    serve_on(listener, app).await
}

async fn serve_on(listener: TcpListener, app: Router) -> Result<()> {
    let local = listener.local_addr().context("listener has no local address")?;
    info!(addr = %local, "listening");
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")
}
