//! Single consumer of the job queue.
//!
//! Per job: claim (Processing) → move upload into the processing directory →
//! run every profile in order → collect and rename transcripts into the
//! output directory → drop the processing copy → Completed or Failed.
//! One profile failing never stops the others; anything unexpected fails
//! only the job at hand.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ManagedDirs;
use crate::global;
use crate::jobs::{Job, JobConsumer, JobStatus, QueueError};
use crate::store::{JobStore, StatusUpdate};

use super::files::{self, transcript_extension};
use super::profile::Profile;
use super::runner::{run_transcriber, RunOutcome};
use super::summarizer::Summarizer;

pub const NO_OUTPUT_MESSAGE: &str = "no output files generated from any profile";
pub const CANCELLED_MESSAGE: &str = "transcription cancelled: service shutting down";

/// What running all profiles for one job produced.
struct ProfilesRun {
    outputs: BTreeMap<String, PathBuf>,
    cancelled: bool,
}

pub struct TranscriptionWorker {
    store: Arc<JobStore>,
    dirs: ManagedDirs,
    executable: PathBuf,
    profiles: Vec<Profile>,
    summarizer: Option<Arc<dyn Summarizer>>,
}

impl TranscriptionWorker {
    pub fn new(
        store: Arc<JobStore>,
        dirs: ManagedDirs,
        executable: impl Into<PathBuf>,
        profiles: Vec<Profile>,
    ) -> Self {
        let profiles = if profiles.is_empty() {
            vec![Profile::default()]
        } else {
            profiles
        };
        Self {
            store,
            dirs,
            executable: executable.into(),
            profiles,
            summarizer: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn spawn(self, consumer: JobConsumer, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(consumer, cancel).await })
    }

    /// Drains the queue one job at a time until shutdown.
    pub async fn run(self, mut consumer: JobConsumer, cancel: CancellationToken) {
        info!(
            "Transcription worker started ({} profile(s), executable {:?})",
            self.profiles.len(),
            self.executable
        );

        loop {
            let job = match consumer.dequeue(&cancel).await {
                Ok(job) => job,
                Err(QueueError::Cancelled) => break,
                Err(QueueError::Closed) => {
                    info!("Job queue closed");
                    break;
                }
            };
            self.process(job, &cancel).await;
        }

        info!("Transcription worker stopped");
    }

    /// Takes one job to a terminal status. Never returns an error: failures
    /// end up in the job record.
    pub async fn process(&self, job: Job, cancel: &CancellationToken) {
        let id = job.id.clone();
        if self
            .store
            .set_status(&id, StatusUpdate::new(JobStatus::Processing))
            .await
            .is_none()
        {
            warn!("Job {} was queued without a store record", id);
        }
        info!("Processing job {} for file {}", id, job.original_file_name);

        let update = match self.transcribe(&job, cancel).await {
            Ok(run) if run.cancelled => {
                warn!("Job {} interrupted by shutdown", id);
                StatusUpdate::failed(CANCELLED_MESSAGE)
            }
            Ok(run) if run.outputs.is_empty() => {
                error!("Job {} failed: {}", id, NO_OUTPUT_MESSAGE);
                StatusUpdate::failed(NO_OUTPUT_MESSAGE)
            }
            Ok(run) => {
                let summary = self.write_summary(&id, &run.outputs).await;
                info!(
                    "Job {} completed. Outputs: {}",
                    id,
                    run.outputs.keys().cloned().collect::<Vec<_>>().join(", ")
                );
                StatusUpdate::new(JobStatus::Completed)
                    .with_outputs(run.outputs)
                    .with_summary(summary)
            }
            Err(e) => {
                error!("Job {} failed: {:#}", id, e);
                StatusUpdate::failed(format!("{:#}", e))
            }
        };

        self.store.set_status(&id, update).await;
    }

    async fn transcribe(&self, job: &Job, cancel: &CancellationToken) -> Result<ProfilesRun> {
        let stored = global::absolute(&job.stored_file_path)?;
        let file_name = stored
            .file_name()
            .with_context(|| format!("Stored file path {:?} has no file name", stored))?;
        let processing_path = self.dirs.processing.join(file_name);

        self.store
            .update(&job.id, |record| {
                record.processing_file_path = Some(processing_path.clone())
            })
            .await;

        if stored != processing_path {
            files::move_file(&stored, &processing_path)
                .await
                .with_context(|| format!("Failed to move upload for job {}", job.id))?;
            debug!("Job {} moved to {:?}", job.id, processing_path);
        }

        let run = self.run_profiles(job, &processing_path, cancel).await;

        if let Err(e) = tokio::fs::remove_file(&processing_path).await {
            warn!(
                "Failed to delete processing copy {:?} for job {}: {}",
                processing_path, job.id, e
            );
        }

        run
    }

    async fn run_profiles(
        &self,
        job: &Job,
        processing_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<ProfilesRun> {
        let mut outputs = BTreeMap::new();

        for profile in &self.profiles {
            if cancel.is_cancelled() {
                return Ok(ProfilesRun {
                    outputs,
                    cancelled: true,
                });
            }
            match self.run_profile(job, profile, processing_path, cancel).await? {
                Some(produced) => outputs.extend(produced),
                None => {
                    return Ok(ProfilesRun {
                        outputs,
                        cancelled: true,
                    })
                }
            }
        }

        Ok(ProfilesRun {
            outputs,
            cancelled: false,
        })
    }

    /// `None` when cancelled; an empty map when the profile failed or wrote nothing.
    async fn run_profile(
        &self,
        job: &Job,
        profile: &Profile,
        processing_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Option<BTreeMap<String, PathBuf>>> {
        let profile_id = profile.identifier();
        let working_dir = processing_path
            .parent()
            .context("Processing path has no parent directory")?;
        let args = profile.build_arguments(processing_path);

        let stale = files::remove_transcripts(working_dir, processing_path).await?;
        if stale > 0 {
            warn!(
                "Removed {} stale transcript(s) before profile {} for job {}",
                stale, profile_id, job.id
            );
        }

        info!("Running profile {} for job {}", profile_id, job.id);
        debug!("{:?} {:?}", self.executable, args);

        let output = match run_transcriber(&self.executable, &args, working_dir, cancel).await? {
            RunOutcome::Exited(output) => output,
            RunOutcome::Cancelled => return Ok(None),
        };

        let mut produced = BTreeMap::new();

        if !output.status.success() {
            error!(
                "Profile {} for job {} exited with {}. stderr: {}",
                profile_id,
                job.id,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            if let Err(e) = files::remove_transcripts(working_dir, processing_path).await {
                warn!(
                    "Failed to discard partial output of profile {} for job {}: {:#}",
                    profile_id, job.id, e
                );
            }
            return Ok(Some(produced));
        }

        for found in files::find_transcripts(working_dir, processing_path).await? {
            let Some(ext) = transcript_extension(&found) else {
                continue;
            };
            let key = format!("{}.{}", profile_id, ext);
            if produced.contains_key(&key) {
                warn!(
                    "Profile {} for job {} wrote more than one .{} file, ignoring {:?}",
                    profile_id, job.id, ext, found
                );
                continue;
            }

            let target = self
                .dirs
                .output
                .join(format!("{}_{}.{}", job.id, profile_id, ext));
            files::move_file(&found, &target).await?;
            produced.insert(key, target);
        }

        if produced.is_empty() {
            warn!(
                "Profile {} for job {} exited successfully but wrote no transcripts",
                profile_id, job.id
            );
        }

        Ok(Some(produced))
    }

    /// Best effort: a summary problem never fails the job.
    async fn write_summary(&self, id: &str, outputs: &BTreeMap<String, PathBuf>) -> Option<PathBuf> {
        let summarizer = self.summarizer.as_ref()?;
        let source = pick_summary_source(outputs)?;

        let result: Result<Option<PathBuf>> = async {
            let transcript = tokio::fs::read_to_string(source)
                .await
                .with_context(|| format!("Failed to read {:?}", source))?;
            let summary = summarizer.summarize(&transcript).await?;
            if summary.is_empty() {
                return Ok(None);
            }
            let path = self.dirs.output.join(format!("{}_summary.txt", id));
            tokio::fs::write(&path, summary)
                .await
                .with_context(|| format!("Failed to write {:?}", path))?;
            Ok(Some(path))
        }
        .await;

        match result {
            Ok(path) => path,
            Err(e) => {
                warn!(
                    "{} summary failed for job {}: {:#}",
                    summarizer.name(),
                    id,
                    e
                );
                None
            }
        }
    }
}

fn pick_summary_source(outputs: &BTreeMap<String, PathBuf>) -> Option<&PathBuf> {
    ["txt", "srt"].iter().find_map(|ext| {
        outputs
            .values()
            .find(|p| transcript_extension(p).as_deref() == Some(*ext))
    })
}
