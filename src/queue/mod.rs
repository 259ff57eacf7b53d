//! Work queue between the job service and out-of-process workers.
//!
//! Publishing appends a message to the durable `shopify_jobs` queue and
//! broadcasts it on the `job_created` side channel for live listeners.

mod events;
mod schema;
mod sqlite_queue;

pub use events::JobEvents;
pub use sqlite_queue::SqliteJobQueue;

use crate::jobs::Job;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const QUEUE_NAME: &str = "shopify_jobs";
pub const JOB_CREATED_CHANNEL: &str = "job_created";

/// `{job_id, data}` as handed to workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub job_id: String,
    pub data: serde_json::Value,
}

impl QueueMessage {
    pub fn for_job(job: &Job) -> Self {
        let mut data = json!({
            "shop": job.shop,
            "type": job.job_type,
            "entity": job.entity,
            "params": job.params,
            "filters": job.filters,
        });
        if let Some(fields) = data.as_object_mut() {
            if let Some(format) = job.format {
                fields.insert("format".to_string(), json!(format));
            }
            if let Some(file_key) = &job.file_key {
                fields.insert("file_key".to_string(), json!(file_key));
            }
            if let Some(command_mode) = &job.command_mode {
                fields.insert("command_mode".to_string(), json!(command_mode));
            }
            if let Some(schedule_id) = &job.schedule_id {
                fields.insert("schedule_id".to_string(), json!(schedule_id));
            }
        }
        QueueMessage {
            job_id: job.id.clone(),
            data,
        }
    }
}

/// Producer side of the work queue. Delivery is at-least-once.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait QueuePublisher: Send + Sync {
    async fn publish(&self, message: QueueMessage) -> Result<()>;

    /// Whether a message for `job_id` is waiting to be claimed.
    async fn is_enqueued(&self, job_id: &str) -> Result<bool>;

    /// Number of messages waiting to be claimed.
    async fn depth(&self) -> Result<usize>;
}

/// Consumer side, used by the worker feedback routes.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Remove and return the oldest message.
    async fn claim_next(&self) -> Result<Option<QueueMessage>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Bag, FileFormat, JobStatus, JobType};

    #[test]
    fn test_message_carries_worker_fields() {
        let mut params = Bag::new();
        params.insert("limit".to_string(), json!(100));
        let job = Job {
            id: "job-1".to_string(),
            shop: "a.myshopify.com".to_string(),
            job_type: JobType::Import,
            entity: "products".to_string(),
            status: JobStatus::Pending,
            params,
            filters: Bag::new(),
            format: None,
            file_key: Some("imports/a.myshopify.com/abc.csv".to_string()),
            file_url: None,
            filename: None,
            command_mode: Some("UPDATE".to_string()),
            schedule_id: None,
            progress: 0,
            progress_message: None,
            total_records: None,
            success_count: None,
            error_count: None,
            error: None,
            errors: vec![],
            created_at: 0,
            updated_at: 0,
            started_at: None,
            completed_at: None,
            failed_at: None,
        };

        let message = QueueMessage::for_job(&job);
        assert_eq!(message.job_id, "job-1");
        assert_eq!(message.data["type"], "import");
        assert_eq!(message.data["entity"], "products");
        assert_eq!(message.data["params"]["limit"], 100);
        assert_eq!(message.data["file_key"], "imports/a.myshopify.com/abc.csv");
        assert_eq!(message.data["command_mode"], "UPDATE");
        assert!(message.data.get("format").is_none());

        let export = Job {
            job_type: JobType::Export,
            format: Some(FileFormat::Xlsx),
            file_key: None,
            command_mode: None,
            ..job
        };
        assert_eq!(QueueMessage::for_job(&export).data["format"], "xlsx");
    }
}
