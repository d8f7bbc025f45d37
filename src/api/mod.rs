//! REST API server for audioscribe.
//!
//! Provides HTTP endpoints for:
//! - Uploading media for transcription
//! - Polling job status
//! - Downloading transcripts and summaries

pub mod error;
pub mod routes;

use crate::config::ServerConfig;
use crate::service::TranscriptionService;
use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, response::Json, routing::get, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tracing::info;

pub use routes::transcriptions::TranscriptionState;

pub struct ApiServer {
    host: String,
    port: u16,
    max_upload_bytes: usize,
    state: TranscriptionState,
}

impl ApiServer {
    pub fn new(config: &ServerConfig, service: TranscriptionService) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            max_upload_bytes: config.max_upload_bytes,
            state: TranscriptionState { service },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(status))
            .nest(
                "/api/transcriptions",
                routes::transcriptions::router(self.state.clone()),
            )
            .layer(ServiceBuilder::new().layer(DefaultBodyLimit::max(self.max_upload_bytes)))
    }

    /// Serves until `cancel` fires.
    pub async fn start(self, cancel: CancellationToken) -> Result<()> {
        let app = self.router();
        let addr = format!("{}:{}", self.host, self.port);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind API server to {}", addr))?;

        info!("API server listening on http://{}", addr);
        info!("Endpoints:");
        info!("  GET  /                                  - Service info");
        info!("  POST /api/transcriptions                - Upload a file (multipart field 'file')");
        info!("  GET  /api/transcriptions/:id            - Job status");
        info!("  GET  /api/transcriptions/:id/download   - Download transcript (?key=, ?summary=true)");

        axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
            .context("API server failed")?;

        info!("API server stopped");
        Ok(())
    }
}

async fn status() -> Json<Value> {
    Json(json!({
        "service": "audioscribe",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}
