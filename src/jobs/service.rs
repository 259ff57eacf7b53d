//! Job orchestration: validated submission, cancellation and worker feedback.

use super::models::*;
use super::store::JobStore;
use crate::catalog::{self, BACKUP_ENTITY};
use crate::error::{ServiceError, ServiceResult, ValidationCode};
use crate::pagination::{PageRequest, Pagination};
use crate::queue::{QueueConsumer, QueueMessage, QueuePublisher};
use crate::schedules::{build_schedule, Schedule, ScheduleSpec, ScheduleStore};
use crate::server::metrics;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Validated description of the work a job performs. Shared by direct
/// submissions and by schedules that materialize jobs later.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTemplate {
    pub job_type: JobType,
    pub entity: String,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<FileFormat>,
    pub file_key: Option<String>,
    pub command_mode: Option<String>,
}

impl JobTemplate {
    pub fn validate(
        job_type: JobType,
        entity: &str,
        params: Bag,
        filters: Bag,
        format: Option<&str>,
        file_key: Option<String>,
        command_mode: Option<String>,
    ) -> ServiceResult<Self> {
        let entity = if job_type == JobType::Backup {
            validate_backup_entities(&params)?;
            BACKUP_ENTITY
        } else {
            entity
        };

        if !catalog::is_supported(entity) {
            return Err(ServiceError::validation(
                ValidationCode::UnsupportedEntity,
                "Unsupported entity type",
            ));
        }

        let format = match format {
            Some(raw) => Some(FileFormat::from_str(raw).ok_or_else(|| {
                ServiceError::validation(
                    ValidationCode::InvalidFormat,
                    format!("Unsupported format '{}', expected csv or xlsx", raw),
                )
            })?),
            None if job_type == JobType::Import => None,
            None => Some(FileFormat::default()),
        };

        let (file_key, command_mode) = if job_type == JobType::Import {
            if catalog::is_read_only(entity) {
                return Err(ServiceError::validation(
                    ValidationCode::ReadOnlyEntity,
                    format!("Entity '{}' is read-only and cannot be imported", entity),
                ));
            }
            let file_key = file_key.filter(|k| !k.trim().is_empty()).ok_or_else(|| {
                ServiceError::validation(ValidationCode::MissingFileKey, "file_key is required")
            })?;
            let command_mode = command_mode
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_COMMAND_MODE.to_string());
            (Some(file_key), Some(command_mode))
        } else {
            (None, None)
        };

        Ok(JobTemplate {
            job_type,
            entity: entity.to_string(),
            params,
            filters,
            format,
            file_key,
            command_mode,
        })
    }

    /// The job a firing of `schedule` runs. An import schedule's `action`
    /// is its command mode.
    pub fn from_schedule(schedule: &Schedule) -> Self {
        let command_mode = match schedule.job_type {
            JobType::Import => schedule.action.clone(),
            _ => None,
        };
        JobTemplate {
            job_type: schedule.job_type,
            entity: schedule.entity.clone(),
            params: schedule.params.clone(),
            filters: schedule.filters.clone(),
            format: schedule.format,
            file_key: schedule.file_key.clone(),
            command_mode,
        }
    }

    pub fn new_job(&self, shop: &str, status: JobStatus, schedule_id: Option<String>) -> NewJob {
        NewJob {
            shop: shop.to_string(),
            job_type: self.job_type,
            entity: self.entity.clone(),
            status,
            params: self.params.clone(),
            filters: self.filters.clone(),
            format: self.format,
            file_key: self.file_key.clone(),
            command_mode: self.command_mode.clone(),
            schedule_id,
        }
    }
}

fn validate_backup_entities(params: &Bag) -> ServiceResult<()> {
    let invalid = || {
        ServiceError::validation(
            ValidationCode::InvalidRequest,
            "Backup requires a non-empty list of supported entities",
        )
    };
    let entities = params
        .get("entities")
        .and_then(|v| v.as_array())
        .filter(|list| !list.is_empty())
        .ok_or_else(invalid)?;
    for entity in entities {
        match entity.as_str() {
            Some(name) if catalog::is_supported(name) => {}
            _ => return Err(invalid()),
        }
    }
    Ok(())
}

/// Everything a caller may send when asking for work to be done.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitRequest {
    pub job_type: JobType,
    pub entity: String,
    pub params: Bag,
    pub filters: Bag,
    pub format: Option<String>,
    pub file_key: Option<String>,
    pub command_mode: Option<String>,
    pub schedule: Option<ScheduleSpec>,
}

impl SubmitRequest {
    pub fn new(job_type: JobType, entity: impl Into<String>) -> Self {
        SubmitRequest {
            job_type,
            entity: entity.into(),
            params: Bag::new(),
            filters: Bag::new(),
            format: None,
            file_key: None,
            command_mode: None,
            schedule: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub job: Job,
    /// Companion schedule, when the request carried one.
    pub schedule: Option<Schedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobPage {
    pub jobs: Vec<Job>,
    pub pagination: Pagination,
}

/// Publish `job` and account for the outcome.
pub async fn publish_job(queue: &dyn QueuePublisher, job: &Job) -> anyhow::Result<()> {
    match queue.publish(QueueMessage::for_job(job)).await {
        Ok(()) => {
            metrics::record_queue_publish(true);
            Ok(())
        }
        Err(e) => {
            metrics::record_queue_publish(false);
            Err(e)
        }
    }
}

pub struct JobService {
    jobs: Arc<dyn JobStore>,
    schedules: Arc<dyn ScheduleStore>,
    queue: Arc<dyn QueuePublisher>,
}

impl JobService {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        queue: Arc<dyn QueuePublisher>,
    ) -> Self {
        JobService {
            jobs,
            schedules,
            queue,
        }
    }

    /// Create a job. Without a schedule it is persisted as `pending` and
    /// published right away; with one it is persisted as `scheduled` and
    /// becomes the first occurrence of a new schedule.
    pub async fn submit(&self, shop: &str, request: SubmitRequest) -> ServiceResult<Submission> {
        let template = JobTemplate::validate(
            request.job_type,
            &request.entity,
            request.params,
            request.filters,
            request.format.as_deref(),
            request.file_key,
            request.command_mode,
        )?;

        let Some(spec) = request.schedule else {
            let job = self
                .jobs
                .create(template.new_job(shop, JobStatus::Pending, None))?;
            if let Err(e) = publish_job(self.queue.as_ref(), &job).await {
                error!("Failed to publish job {}: {:#}", job.id, e);
                let extra = JobStatusUpdate {
                    error: Some("Failed to enqueue job".to_string()),
                    ..Default::default()
                };
                self.jobs.set_status(&job.id, JobStatus::Failed, &extra)?;
                return Err(e.into());
            }
            metrics::record_job_submitted(job.job_type.as_str(), "immediate");
            info!(
                "Queued {} job {} for {} ({})",
                job.job_type.as_str(),
                job.id,
                shop,
                job.entity
            );
            return Ok(Submission {
                job,
                schedule: None,
            });
        };

        let new_schedule = build_schedule(shop, &template, &spec, Utc::now())?;
        let mut job = self
            .jobs
            .create(template.new_job(shop, JobStatus::Scheduled, None))?;
        let schedule = self.schedules.create(new_schedule.with_pending_job(&job.id))?;
        self.jobs.attach_schedule(&job.id, &schedule.id)?;
        job.schedule_id = Some(schedule.id.clone());

        metrics::record_job_submitted(job.job_type.as_str(), "scheduled");
        info!(
            "Scheduled {} job {} for {} under schedule {} ({})",
            job.job_type.as_str(),
            job.id,
            shop,
            schedule.id,
            schedule.schedule_type
        );
        Ok(Submission {
            job,
            schedule: Some(schedule),
        })
    }

    /// Fetch a job owned by `shop`. Foreign jobs are reported as missing.
    pub fn get_for_tenant(&self, shop: &str, id: &str) -> ServiceResult<Job> {
        match self.jobs.get(id)? {
            Some(job) if job.shop == shop => Ok(job),
            _ => Err(ServiceError::NotFound("Job")),
        }
    }

    pub fn list_for_tenant(&self, shop: &str, page: PageRequest) -> ServiceResult<JobPage> {
        let (jobs, total) = self.jobs.list_by_tenant(shop, page)?;
        Ok(JobPage {
            jobs,
            pagination: Pagination::new(page, total),
        })
    }

    /// Tenant-unscoped listing for the admin portal.
    pub fn list_all(&self, shop: Option<&str>, page: PageRequest) -> ServiceResult<JobPage> {
        let (jobs, total) = self.jobs.list_all(shop, page)?;
        Ok(JobPage {
            jobs,
            pagination: Pagination::new(page, total),
        })
    }

    /// Advisory cancellation: a worker already running the job has to notice
    /// the status change on its own.
    pub fn cancel(&self, shop: &str, id: &str) -> ServiceResult<Job> {
        let job = self.get_for_tenant(shop, id)?;
        if !job.status.can_transition_to(JobStatus::Cancelled) {
            warn!("Refusing to cancel job {} in status {}", id, job.status.as_str());
            return Err(ServiceError::InvalidState(
                "Cannot cancel completed or failed job".to_string(),
            ));
        }

        let updated = self.jobs.transition_status(
            id,
            job.status,
            JobStatus::Cancelled,
            &JobStatusUpdate::default(),
        )?;
        if updated == 0 {
            // A worker moved the job between the read and the write.
            return Err(ServiceError::InvalidState(
                "Job changed status while being cancelled".to_string(),
            ));
        }
        metrics::record_job_transition(JobStatus::Cancelled.as_str());
        info!("Cancelled job {} for {}", id, shop);
        self.jobs.get(id)?.ok_or(ServiceError::NotFound("Job"))
    }

    /// Status report from a worker, checked against the state machine.
    pub fn report_status(
        &self,
        id: &str,
        status: JobStatus,
        extra: JobStatusUpdate,
    ) -> ServiceResult<Job> {
        let job = self.jobs.get(id)?.ok_or(ServiceError::NotFound("Job"))?;

        if extra.file_url.is_some() && status != JobStatus::Completed {
            return Err(ServiceError::validation(
                ValidationCode::InvalidRequest,
                "file_url is only accepted with status 'completed'",
            ));
        }
        if job.status.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "Job is already {}",
                job.status.as_str()
            )));
        }
        if !job.status.can_transition_to(status) {
            return Err(ServiceError::validation(
                ValidationCode::InvalidTransition,
                format!(
                    "Cannot move job from '{}' to '{}'",
                    job.status.as_str(),
                    status.as_str()
                ),
            ));
        }

        if self.jobs.transition_status(id, job.status, status, &extra)? == 0 {
            return Err(ServiceError::InvalidState(
                "Job changed status concurrently".to_string(),
            ));
        }
        metrics::record_job_transition(status.as_str());
        debug!(
            "Job {} moved from {} to {}",
            id,
            job.status.as_str(),
            status.as_str()
        );
        self.jobs.get(id)?.ok_or(ServiceError::NotFound("Job"))
    }

    /// Progress report from a worker. Out-of-range values are clamped.
    pub fn record_progress(&self, id: &str, percent: i64, message: Option<&str>) -> ServiceResult<()> {
        let percent = percent.clamp(0, 100) as u8;
        if self.jobs.set_progress(id, percent, message)? == 0 {
            return Err(ServiceError::NotFound("Job"));
        }
        Ok(())
    }

    /// Hand the next runnable message to a worker. Messages whose job is no
    /// longer `pending` (cancelled, or already picked up through a duplicate
    /// delivery) are dropped.
    pub async fn claim_next(&self, consumer: &dyn QueueConsumer) -> ServiceResult<Option<QueueMessage>> {
        while let Some(message) = consumer.claim_next().await? {
            match self.jobs.get(&message.job_id)? {
                Some(job) if job.status == JobStatus::Pending => return Ok(Some(message)),
                Some(job) => debug!(
                    "Discarding queue message for job {} in status {}",
                    job.id,
                    job.status.as_str()
                ),
                None => warn!("Discarding queue message for unknown job {}", message.job_id),
            }
        }
        Ok(None)
    }

    /// Re-publish `pending` jobs that have no message in the queue, closing
    /// the window between persisting a job and publishing it.
    pub async fn reconcile_orphans(&self) -> ServiceResult<usize> {
        let mut republished = 0;
        for job in self.jobs.list_by_status(JobStatus::Pending)? {
            if self.queue.is_enqueued(&job.id).await? {
                continue;
            }
            publish_job(self.queue.as_ref(), &job).await?;
            republished += 1;
        }
        if republished > 0 {
            info!("Re-published {} orphaned pending jobs", republished);
        }
        Ok(republished)
    }
}
