use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted_files: usize,
    pub freed_bytes: u64,
    pub removed_dirs: usize,
    /// Files or directories that could not be removed.
    pub failures: usize,
}

impl SweepReport {
    fn absorb(&mut self, other: SweepReport) {
        self.deleted_files += other.deleted_files;
        self.freed_bytes += other.freed_bytes;
        self.removed_dirs += other.removed_dirs;
        self.failures += other.failures;
    }

    pub fn freed_megabytes(&self) -> f64 {
        self.freed_bytes as f64 / 1024.0 / 1024.0
    }
}

/// One pass of the cleanup scheduler.
#[async_trait]
pub trait Sweep: Send + Sync {
    async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepReport>;
}

/// Deletes files older than the retention window from a set of directories,
/// then prunes the subdirectories that became empty.
pub struct RetentionSweep {
    dirs: Vec<PathBuf>,
    retention: Duration,
}

impl RetentionSweep {
    pub fn new(dirs: Vec<PathBuf>, retention_days: u32) -> Self {
        Self {
            dirs,
            retention: Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY),
        }
    }

    pub fn run_blocking(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .context("Retention window reaches before the epoch")?;
        Ok(sweep_directories(&self.dirs, cutoff, cancel))
    }
}

#[async_trait]
impl Sweep for RetentionSweep {
    async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepReport> {
        let dirs = self.dirs.clone();
        let retention = self.retention;
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            RetentionSweep { dirs, retention }.run_blocking(&cancel)
        })
        .await
        .context("Cleanup sweep task panicked")?
    }
}

/// Sweeps each directory in turn. Missing directories are skipped.
pub fn sweep_directories(
    dirs: &[PathBuf],
    cutoff: SystemTime,
    cancel: &CancellationToken,
) -> SweepReport {
    info!("Starting cleanup sweep");
    let mut total = SweepReport::default();

    for dir in dirs {
        if cancel.is_cancelled() {
            break;
        }
        if !dir.is_dir() {
            debug!("Directory {:?} does not exist, skipping", dir);
            continue;
        }

        let mut report = delete_expired_files(dir, cutoff, cancel);
        let (removed, failures) = prune_empty_dirs(dir);
        report.removed_dirs += removed;
        report.failures += failures;

        info!(
            "Cleaned {:?}: deleted {} file(s), removed {} empty director(ies)",
            dir, report.deleted_files, report.removed_dirs
        );
        total.absorb(report);
    }

    info!(
        "Cleanup sweep finished: deleted {} file(s), freed {:.2} MB",
        total.deleted_files,
        total.freed_megabytes()
    );
    total
}

fn delete_expired_files(dir: &Path, cutoff: SystemTime, cancel: &CancellationToken) -> SweepReport {
    let mut report = SweepReport::default();

    for entry in WalkDir::new(dir).min_depth(1) {
        if cancel.is_cancelled() {
            break;
        }
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to read entry under {:?}: {}", dir, e);
                report.failures += 1;
                continue;
            }
        };
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Failed to read metadata for {:?}: {}", path, e);
                report.failures += 1;
                continue;
            }
        };
        let expired = metadata.modified().map(|m| m < cutoff).unwrap_or(false);
        if !expired {
            continue;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                report.deleted_files += 1;
                report.freed_bytes += metadata.len();
                debug!("Deleted expired file {:?}", path);
            }
            Err(e) => {
                warn!("Failed to delete {:?}: {}", path, e);
                report.failures += 1;
            }
        }
    }

    report
}

/// Removes empty subdirectories bottom-up; `root` itself is kept.
fn prune_empty_dirs(root: &Path) -> (usize, usize) {
    let mut removed = 0;
    let mut failures = 0;

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let Ok(entry) = entry else {
            continue;
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let is_empty = match std::fs::read_dir(path) {
            Ok(mut entries) => entries.next().is_none(),
            Err(e) => {
                warn!("Failed to inspect directory {:?}: {}", path, e);
                failures += 1;
                continue;
            }
        };
        if !is_empty {
            continue;
        }

        match std::fs::remove_dir(path) {
            Ok(()) => {
                removed += 1;
                debug!("Removed empty directory {:?}", path);
            }
            Err(e) => {
                warn!("Failed to remove directory {:?}: {}", path, e);
                failures += 1;
            }
        }
    }

    (removed, failures)
}
