//! End-to-end run of the pipeline: upload -> queue -> worker -> store -> download.
#![cfg(unix)]

use audioscribe::config::ManagedDirs;
use audioscribe::jobs::{Job, JobQueue, JobStatus};
use audioscribe::service::{ServiceError, TranscriptionService};
use audioscribe::store::JobStore;
use audioscribe::transcription::{ExcerptSummarizer, Profile, TranscriptionWorker, NO_OUTPUT_MESSAGE};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes `<stem>.txt` and, with `--srt`, `<stem>.srt` next to the input.
/// Inputs whose content mentions `mute` produce nothing.
const FAKE_TRANSCRIBER: &str = r#"#!/bin/sh
for arg; do input="$arg"; done
if grep -q mute "$input"; then exit 0; fi
stem="${input%.*}"
echo "the quick brown fox from $(basename "$input")" > "$stem.txt"
case " $* " in
  *" --srt "*) printf '1\n00:00:00,000 --> 00:00:01,000\nfox\n' > "$stem.srt" ;;
esac
exit 0
"#;

struct Pipeline {
    _root: TempDir,
    dirs: ManagedDirs,
    service: TranscriptionService,
    cancel: CancellationToken,
    worker: tokio::task::JoinHandle<()>,
}

impl Pipeline {
    fn start(profiles: Vec<Profile>) -> Self {
        let root = tempfile::tempdir().unwrap();
        let dirs = ManagedDirs {
            upload: root.path().join("uploads"),
            processing: root.path().join("processing"),
            output: root.path().join("output"),
        };
        dirs.ensure().unwrap();

        let executable = root.path().join("fake-buzz");
        std::fs::write(&executable, FAKE_TRANSCRIBER).unwrap();
        std::fs::set_permissions(&executable, std::fs::Permissions::from_mode(0o755)).unwrap();

        let store = Arc::new(JobStore::volatile());
        let cancel = CancellationToken::new();
        let (queue, consumer) = JobQueue::new();

        let worker = TranscriptionWorker::new(store.clone(), dirs.clone(), executable, profiles)
            .with_summarizer(Arc::new(ExcerptSummarizer::default()))
            .spawn(consumer, cancel.clone());
        let service = TranscriptionService::new(store, queue, dirs.upload.clone(), cancel.clone());

        Self {
            _root: root,
            dirs,
            service,
            cancel,
            worker,
        }
    }

    /// Polls until the job is terminal, returning every distinct status seen.
    async fn wait_for_terminal(&self, id: &str) -> (Job, Vec<JobStatus>) {
        let mut seen: Vec<JobStatus> = Vec::new();
        for _ in 0..500 {
            let job = self.service.status(id).await.unwrap();
            if seen.last() != Some(&job.status) {
                seen.push(job.status);
            }
            if job.status.is_terminal() {
                return (job, seen);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("job {} did not finish, statuses seen: {:?}", id, seen);
    }

    async fn shutdown(self) {
        self.cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.worker)
            .await
            .expect("worker should stop after cancellation")
            .unwrap();
    }
}

fn profile(name: &str, srt: bool) -> Profile {
    Profile {
        name: name.to_string(),
        output_srt: srt,
        ..Profile::default()
    }
}

fn assert_lifecycle(seen: &[JobStatus], terminal: JobStatus) {
    let full = [JobStatus::Pending, JobStatus::Processing, terminal];
    assert_eq!(seen.last(), Some(&terminal));
    assert!(
        full.ends_with(seen),
        "unexpected status sequence {:?}",
        seen
    );
}

#[tokio::test]
async fn test_upload_is_transcribed_and_downloadable() {
    let pipeline = Pipeline::start(vec![profile("Fast", false), profile("Subtitles", true)]);

    let job = pipeline
        .service
        .submit("Standup Notes.m4a", &b"fake media"[..])
        .await
        .unwrap();
    let (job, seen) = pipeline.wait_for_terminal(&job.id).await;

    assert_lifecycle(&seen, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert_eq!(
        job.output_files.keys().collect::<Vec<_>>(),
        vec!["fast.txt", "subtitles.srt", "subtitles.txt"]
    );
    for path in job.output_files.values() {
        assert!(path.starts_with(&pipeline.dirs.output));
        assert!(path.is_file());
    }
    assert!(!job.stored_file_path.exists());
    assert_eq!(
        std::fs::read_dir(&pipeline.dirs.processing).unwrap().count(),
        0
    );

    let download = pipeline
        .service
        .resolve_download(&job.id, Some("subtitles.srt"), false)
        .await
        .unwrap();
    assert_eq!(download.file_name, "Standup Notes_subtitles.srt");
    assert!(std::fs::read_to_string(&download.path).unwrap().contains("fox"));

    let summary = pipeline
        .service
        .resolve_download(&job.id, None, true)
        .await
        .unwrap();
    assert!(std::fs::read_to_string(&summary.path)
        .unwrap()
        .starts_with("the quick brown fox"));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_jobs_finish_in_submission_order() {
    let pipeline = Pipeline::start(vec![profile("default", false)]);

    let mut ids = Vec::new();
    for (name, content) in [("one.wav", "x"), ("two.wav", "mute"), ("three.wav", "x")] {
        let job = pipeline
            .service
            .submit(name, content.as_bytes())
            .await
            .unwrap();
        ids.push(job.id);
    }

    let mut finished = Vec::new();
    for id in &ids {
        let (job, seen) = pipeline.wait_for_terminal(id).await;
        finished.push(job);
        assert!(seen.last().map(JobStatus::is_terminal).unwrap_or(false));
    }

    assert_eq!(finished[0].status, JobStatus::Completed);
    assert_eq!(finished[1].status, JobStatus::Failed);
    assert_eq!(finished[1].error_message.as_deref(), Some(NO_OUTPUT_MESSAGE));
    assert_eq!(finished[2].status, JobStatus::Completed);

    let completions: Vec<_> = finished.iter().map(|j| j.completed_at.unwrap()).collect();
    assert!(completions.windows(2).all(|w| w[0] <= w[1]));

    let err = pipeline
        .service
        .resolve_download(&ids[1], None, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotCompleted { .. }));

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_submissions_after_shutdown_are_refused() {
    let pipeline = Pipeline::start(vec![profile("default", false)]);
    pipeline.cancel.cancel();

    let err = pipeline
        .service
        .submit("late.wav", &b"x"[..])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Internal(_)));

    let leftovers: Vec<PathBuf> = std::fs::read_dir(&pipeline.dirs.upload)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert!(leftovers.is_empty());

    pipeline.shutdown().await;
}
