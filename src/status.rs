//! Rotation counter and HTTP status endpoint
//!
//! `GET /` returns `{"Status": "OK", "RotationCount": <n>}`. There are no
//! other routes.

use anyhow::{Context, Result};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-wide count of successful creates and updates
#[derive(Debug, Default)]
pub struct RotationStats {
    rotations: AtomicU64,
}

impl RotationStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful create or update
    pub fn record_rotation(&self) -> u64 {
        self.rotations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn rotation_count(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }
}

/// Body of the status response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReport {
    pub status: &'static str,
    pub rotation_count: u64,
}

/// Build the status router
pub fn router(stats: Arc<RotationStats>) -> Router {
    Router::new()
        .route("/", get(status_handler))
        .with_state(stats)
}

async fn status_handler(State(stats): State<Arc<RotationStats>>) -> Json<StatusReport> {
    Json(StatusReport {
        status: "OK",
        rotation_count: stats.rotation_count(),
    })
}

/// Serve the status endpoint on all interfaces until `shutdown` fires
pub async fn start_server(
    port: u16,
    stats: Arc<RotationStats>,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status server to {}", addr))?;

    info!("Status server listening on {}", addr);

    axum::serve(listener, router(stats))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Status server failed")?;

    info!("Status server stopped");
    Ok(())
}
