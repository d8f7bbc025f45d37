use crate::api::ApiServer;
use crate::cleanup::CleanupScheduler;
use crate::config::{Config, DurableConfig};
use crate::jobs::JobQueue;
use crate::service::TranscriptionService;
use crate::store::{JobStore, RedisPersistence};
use crate::transcription::{ExcerptSummarizer, TranscriptionWorker};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub async fn run_service(config: Config) -> Result<()> {
    info!("Starting audioscribe service");

    let dirs = config.storage.resolve()?;
    dirs.ensure()?;
    info!(
        "Managed directories: uploads={:?} processing={:?} output={:?}",
        dirs.upload, dirs.processing, dirs.output
    );

    let store = Arc::new(build_store(&config.durable, config.durable_expiration_days())?);
    info!("Job store backend: {}", store.backend_name());

    let cancel = CancellationToken::new();
    let (queue, consumer) = JobQueue::new();

    let mut worker = TranscriptionWorker::new(
        store.clone(),
        dirs.clone(),
        resolve_executable(&config.transcriber.executable),
        config.transcriber.profiles.clone(),
    );
    if config.transcriber.summarize {
        worker = worker.with_summarizer(Arc::new(ExcerptSummarizer::default()));
    }
    let worker_handle = worker.spawn(consumer, cancel.clone());

    let cleanup_handle = CleanupScheduler::new(&config.cleanup, &dirs).spawn(cancel.clone());

    let service = TranscriptionService::new(store, queue, dirs.upload.clone(), cancel.clone());
    let api_server = ApiServer::new(&config.server, service);
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api_server.start(server_cancel.clone()).await {
            error!("API server failed: {:#}", e);
            server_cancel.cancel();
        }
    });

    info!("audioscribe is ready!");
    info!(
        "Try: curl -F file=@recording.mp3 http://{}:{}/api/transcriptions",
        config.server.host, config.server.port
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
        }
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();

    for (name, handle) in [
        ("API server", server_handle),
        ("transcription worker", worker_handle),
        ("cleanup scheduler", cleanup_handle),
    ] {
        if let Err(e) = handle.await {
            warn!("{} task ended abnormally: {}", name, e);
        }
    }

    info!("audioscribe stopped");
    Ok(())
}

fn build_store(durable: &DurableConfig, expiration_days: u32) -> Result<JobStore> {
    if !durable.is_enabled() {
        return Ok(JobStore::volatile());
    }

    let persistence = RedisPersistence::new(&durable.url, durable.key_prefix.clone())
        .context("Failed to configure durable job store")?;
    Ok(JobStore::with_persistence(
        Arc::new(persistence),
        expiration_days,
    ))
}

/// Resolves the transcriber on PATH; an unresolved name is kept so each job
/// reports the failure instead of the service refusing to start.
fn resolve_executable(executable: &str) -> PathBuf {
    match which::which(executable) {
        Ok(path) => {
            info!("Using transcriber at {:?}", path);
            path
        }
        Err(e) => {
            warn!(
                "Transcriber '{}' not found ({}); jobs will fail until it is installed",
                executable, e
            );
            PathBuf::from(executable)
        }
    }
}
