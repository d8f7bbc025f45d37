//! Operations the HTTP layer needs from the pipeline: submit an upload,
//! report a job, and locate a finished job's files.

use crate::jobs::{new_job_id, normalize_id, Job, JobQueue, JobStatus};
use crate::store::JobStore;
use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Job {0} not found")]
    NotFound(String),
    #[error("Job {id} is not completed (status: {status})")]
    NotCompleted { id: String, status: JobStatus },
    #[error("{0}")]
    FileMissing(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// A file ready to be streamed back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub path: PathBuf,
    /// Suggested name for `Content-Disposition`.
    pub file_name: String,
}

#[derive(Clone)]
pub struct TranscriptionService {
    store: Arc<JobStore>,
    queue: JobQueue,
    upload_dir: PathBuf,
    cancel: CancellationToken,
}

impl TranscriptionService {
    pub fn new(
        store: Arc<JobStore>,
        queue: JobQueue,
        upload_dir: impl Into<PathBuf>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            queue,
            upload_dir: upload_dir.into(),
            cancel,
        }
    }

    /// Saves the upload under a fresh job id, records the job and queues it.
    pub async fn submit<R>(&self, original_file_name: &str, mut content: R) -> ServiceResult<Job>
    where
        R: AsyncRead + Unpin + Send,
    {
        let file_name = base_name(original_file_name).ok_or_else(|| {
            ServiceError::InvalidRequest("A file name is required".to_string())
        })?;

        let id = new_job_id();
        let stored_path = self.upload_dir.join(format!("{}{}", id, dotted_extension(&file_name)));

        let written = async {
            let mut file = tokio::fs::File::create(&stored_path)
                .await
                .with_context(|| format!("Failed to create upload file {:?}", stored_path))?;
            let written = tokio::io::copy(&mut content, &mut file)
                .await
                .context("Failed to write uploaded file")?;
            file.flush().await.context("Failed to flush uploaded file")?;
            anyhow::Ok(written)
        }
        .await;

        let written = match written {
            Ok(written) => written,
            Err(e) => {
                discard_upload(&stored_path).await;
                return Err(e.into());
            }
        };
        if written == 0 {
            discard_upload(&stored_path).await;
            return Err(ServiceError::InvalidRequest(
                "Uploaded file is empty".to_string(),
            ));
        }

        let job = self
            .store
            .upsert(Job::new(id, file_name, stored_path.clone()))
            .await;

        if let Err(e) = self.queue.enqueue(job.clone(), &self.cancel) {
            discard_upload(&stored_path).await;
            return Err(anyhow::anyhow!("Job queue is not accepting work: {}", e).into());
        }

        info!(
            "Accepted job {} for {:?} ({} bytes)",
            job.id, job.original_file_name, written
        );
        Ok(job)
    }

    pub async fn status(&self, id: &str) -> ServiceResult<Job> {
        let id = normalize_id(id);
        if id.is_empty() {
            return Err(ServiceError::InvalidRequest("A job id is required".to_string()));
        }
        self.store
            .get(&id)
            .await
            .ok_or(ServiceError::NotFound(id))
    }

    /// Locates a completed job's summary, the output under `key`, or its
    /// first output in key order when no key is given.
    pub async fn resolve_download(
        &self,
        id: &str,
        key: Option<&str>,
        summary: bool,
    ) -> ServiceResult<Download> {
        let job = self.status(id).await?;
        if job.status != JobStatus::Completed {
            return Err(ServiceError::NotCompleted {
                id: job.id,
                status: job.status,
            });
        }

        let stem = file_stem(&job.original_file_name);
        let (path, file_name) = if summary {
            let path = job.summary_path.clone().ok_or_else(|| {
                ServiceError::FileMissing(format!("Job {} has no summary", job.id))
            })?;
            (path, format!("{}_summary.txt", stem))
        } else {
            let key = key.map(str::trim).filter(|k| !k.is_empty());
            let entry = match key {
                Some(key) => job.output_files.get_key_value(key),
                None => job.output_files.iter().next(),
            };
            let (key, path) = entry.ok_or_else(|| {
                ServiceError::FileMissing(match key {
                    Some(key) => format!("Job {} has no output '{}'", job.id, key),
                    None => format!("Job {} has no outputs", job.id),
                })
            })?;
            (path.clone(), format!("{}_{}", stem, key))
        };

        let exists = tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !exists {
            warn!("File for job {} is gone: {:?}", job.id, path);
            return Err(ServiceError::FileMissing(format!(
                "File for job {} no longer exists",
                job.id
            )));
        }

        Ok(Download { path, file_name })
    }
}

/// Last path component of a client-supplied name, if any.
fn base_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let base = trimmed.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(trimmed).trim();
    if base.is_empty() || base == "." || base == ".." {
        None
    } else {
        Some(base.to_string())
    }
}

fn dotted_extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("transcript")
        .to_string()
}

async fn discard_upload(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove rejected upload {:?}: {}", path, e);
        }
    }
}
