//! Data models for jobs.
//!
//! Defines job types, the status state machine and the persisted job record.

use crate::timestamps::{serialize_ms, serialize_opt_ms};
use serde::{Deserialize, Serialize};

/// Opaque key-value bag forwarded untouched to workers.
pub type Bag = serde_json::Map<String, serde_json::Value>;

/// Upper bound on error messages retained on a single job.
pub const MAX_JOB_ERRORS: usize = 100;

pub const DEFAULT_COMMAND_MODE: &str = "UPDATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Export,
    Import,
    Template,
    Backup,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Export => "export",
            JobType::Import => "import",
            JobType::Template => "template",
            JobType::Backup => "backup",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "export" => Some(JobType::Export),
            "import" => Some(JobType::Import),
            "template" => Some(JobType::Template),
            "backup" => Some(JobType::Backup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,           // terminal
    CompletedWithErrors, // terminal
    Failed,              // terminal
    Cancelled,           // terminal
}

impl JobStatus {
    pub const ALL: [JobStatus; 7] = [
        JobStatus::Pending,
        JobStatus::Scheduled,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::CompletedWithErrors,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        JobStatus::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    /// States a job may move to from this one.
    pub fn allowed_transitions(&self) -> &'static [JobStatus] {
        match self {
            JobStatus::Scheduled => &[JobStatus::Pending, JobStatus::Cancelled],
            JobStatus::Pending => &[
                JobStatus::Processing,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::Processing => &[
                JobStatus::Completed,
                JobStatus::CompletedWithErrors,
                JobStatus::Failed,
                JobStatus::Cancelled,
            ],
            JobStatus::Completed
            | JobStatus::CompletedWithErrors
            | JobStatus::Failed
            | JobStatus::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    #[default]
    Csv,
    Xlsx,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Xlsx => "xlsx",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(FileFormat::Csv),
            "xlsx" => Some(FileFormat::Xlsx),
            _ => None,
        }
    }
}

/// A unit of export/import/template/backup work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: String,
    pub shop: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub entity: String,
    pub status: JobStatus,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<FileFormat>,
    pub file_key: Option<String>,
    pub file_url: Option<String>,
    pub filename: Option<String>,
    pub command_mode: Option<String>,
    pub schedule_id: Option<String>,
    pub progress: u8,
    pub progress_message: Option<String>,
    pub total_records: Option<i64>,
    pub success_count: Option<i64>,
    pub error_count: Option<i64>,
    pub error: Option<String>,
    pub errors: Vec<String>,
    #[serde(serialize_with = "serialize_ms")]
    pub created_at: i64,
    #[serde(serialize_with = "serialize_ms")]
    pub updated_at: i64,
    #[serde(serialize_with = "serialize_opt_ms")]
    pub started_at: Option<i64>,
    #[serde(serialize_with = "serialize_opt_ms")]
    pub completed_at: Option<i64>,
    #[serde(serialize_with = "serialize_opt_ms")]
    pub failed_at: Option<i64>,
}

/// Fields supplied when creating a job. Identity and timestamps are
/// assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub shop: String,
    pub job_type: JobType,
    pub entity: String,
    pub status: JobStatus,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<FileFormat>,
    pub file_key: Option<String>,
    pub command_mode: Option<String>,
    pub schedule_id: Option<String>,
}

/// Extra fields a status change may carry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JobStatusUpdate {
    pub file_key: Option<String>,
    pub file_url: Option<String>,
    pub filename: Option<String>,
    pub error: Option<String>,
    pub total_records: Option<i64>,
    pub success_count: Option<i64>,
    pub error_count: Option<i64>,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_db_string() {
        for status in JobStatus::ALL {
            assert_eq!(JobStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(JobStatus::from_str("queued"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::CompletedWithErrors.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Scheduled.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_transitions_are_forward_only() {
        assert!(JobStatus::Scheduled.can_transition_to(JobStatus::Pending));
        assert!(JobStatus::Pending.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::CompletedWithErrors));
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pending));
        assert!(!JobStatus::Scheduled.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Cancelled));
        for status in JobStatus::ALL {
            if !status.is_terminal() {
                assert!(status.can_transition_to(JobStatus::Cancelled));
            }
        }
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&JobStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");
    }
}
