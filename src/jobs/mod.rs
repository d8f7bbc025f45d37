//! Transcription job records and their status lifecycle.
//!
//! A job moves `Pending -> Processing -> Completed | Failed` and never
//! leaves a terminal state.

pub mod queue;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub use queue::{JobConsumer, JobQueue, QueueError};

/// Length of generated job ids.
pub const JOB_ID_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "Pending",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether a record in `self` may be moved to `next`.
    ///
    /// Re-applying a non-terminal status is allowed so repeated updates while
    /// processing can merge outputs.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Pending, JobStatus::Pending | JobStatus::Processing) => true,
            (
                JobStatus::Processing,
                JobStatus::Processing | JobStatus::Completed | JobStatus::Failed,
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub original_file_name: String,
    pub stored_file_path: PathBuf,
    pub processing_file_path: Option<PathBuf>,
    /// Output key (`<profile>.<ext>`) to transcript path.
    #[serde(default)]
    pub output_files: BTreeMap<String, PathBuf>,
    pub summary_path: Option<PathBuf>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(
        id: impl Into<String>,
        original_file_name: impl Into<String>,
        stored_file_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: normalize_id(&id.into()),
            original_file_name: original_file_name.into(),
            stored_file_path: stored_file_path.into(),
            processing_file_path: None,
            output_files: BTreeMap::new(),
            summary_path: None,
            status: JobStatus::Pending,
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Short random id: the first characters of a v4 UUID in simple form.
pub fn new_job_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(JOB_ID_LEN);
    id
}

/// Job ids compare case-insensitively.
pub fn normalize_id(id: &str) -> String {
    id.trim().to_ascii_lowercase()
}
