//! Tenant-scoped schedule management.

use super::models::*;
use super::next_run::{first_run, NextRunError, Timing};
use super::store::ScheduleStore;
use crate::error::{ServiceError, ServiceResult, ValidationCode};
use crate::jobs::{Bag, JobStatus, JobStatusUpdate, JobStore, JobTemplate, JobType};
use crate::server::metrics;
use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

impl From<NextRunError> for ServiceError {
    fn from(e: NextRunError) -> Self {
        ServiceError::validation(ValidationCode::InvalidSchedule, e.to_string())
    }
}

/// Build a schedule that runs `template` on the timing in `spec`, with its
/// first run computed at `now`.
pub fn build_schedule(
    shop: &str,
    template: &JobTemplate,
    spec: &ScheduleSpec,
    now: DateTime<Utc>,
) -> ServiceResult<NewSchedule> {
    let schedule_type = spec.resolved_type();
    // Monthly schedules remember the day they aim for, so a run clamped to a
    // short month recovers on the next one.
    let day_of_month = match schedule_type {
        ScheduleType::Monthly => spec.day_of_month.or(Some(now.day() as i64)),
        _ => spec.day_of_month,
    };
    let timing = Timing {
        schedule_type: schedule_type.clone(),
        schedule_time: spec.schedule_time.as_deref(),
        interval: spec.interval,
        day_of_month,
    };
    let next_run = first_run(&timing, now)?;

    if let ScheduleType::Unrecognized(raw) = &schedule_type {
        warn!(
            "Schedule type '{}' is not recognized, it will fire once on the next evaluation",
            raw
        );
    }

    Ok(NewSchedule {
        shop: shop.to_string(),
        name: spec
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SCHEDULE_NAME.to_string()),
        job_type: template.job_type,
        entity: template.entity.clone(),
        action: template.command_mode.clone(),
        params: template.params.clone(),
        filters: template.filters.clone(),
        format: template.format,
        file_key: template.file_key.clone(),
        schedule_type: schedule_type.as_str().to_string(),
        schedule_time: spec.schedule_time.clone(),
        interval: spec.interval,
        day_of_week: spec.day_of_week,
        day_of_month,
        next_run: next_run.timestamp_millis(),
        pending_job_id: None,
    })
}

/// Body of an explicit schedule creation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateScheduleRequest {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub job_type: Option<String>,
    pub entity: Option<String>,
    pub action: Option<String>,
    #[serde(default)]
    pub params: Bag,
    #[serde(default)]
    pub filters: Bag,
    pub format: Option<String>,
    pub file_key: Option<String>,
    pub schedule_type: Option<String>,
    pub schedule_time: Option<String>,
    pub repeat: Option<String>,
    pub interval: Option<i64>,
    pub day_of_week: Option<i64>,
    pub day_of_month: Option<i64>,
}

fn required(value: Option<String>, field: &str) -> ServiceResult<String> {
    value.filter(|v| !v.trim().is_empty()).ok_or_else(|| {
        ServiceError::validation(
            ValidationCode::InvalidRequest,
            format!("Missing required field: {}", field),
        )
    })
}

pub struct ScheduleService {
    schedules: Arc<dyn ScheduleStore>,
    jobs: Arc<dyn JobStore>,
}

impl ScheduleService {
    pub fn new(schedules: Arc<dyn ScheduleStore>, jobs: Arc<dyn JobStore>) -> Self {
        ScheduleService { schedules, jobs }
    }

    /// Cancel the placeholder job waiting for the schedule's first firing.
    /// A placeholder that already left `scheduled` is left alone.
    fn settle_placeholder(&self, schedule: &Schedule) -> ServiceResult<()> {
        let Some(job_id) = schedule.pending_job_id.as_deref() else {
            return Ok(());
        };
        let cancelled = self.jobs.transition_status(
            job_id,
            JobStatus::Scheduled,
            JobStatus::Cancelled,
            &JobStatusUpdate::default(),
        )?;
        if cancelled > 0 {
            metrics::record_job_transition(JobStatus::Cancelled.as_str());
            info!(
                "Cancelled job {} waiting on schedule {}",
                job_id, schedule.id
            );
        }
        self.schedules.set_pending_job(&schedule.id, None)?;
        Ok(())
    }

    pub fn create(&self, shop: &str, request: CreateScheduleRequest) -> ServiceResult<Schedule> {
        let job_type = required(request.job_type, "type")?;
        let entity = required(request.entity, "entity")?;
        let schedule_type = required(request.schedule_type, "schedule_type")?;
        let job_type = JobType::from_str(&job_type).ok_or_else(|| {
            ServiceError::validation(
                ValidationCode::InvalidJobType,
                format!("Unknown job type '{}'", job_type),
            )
        })?;

        let mut template = JobTemplate::validate(
            job_type,
            &entity,
            request.params,
            request.filters,
            request.format.as_deref(),
            request.file_key,
            request.action.clone(),
        )?;
        // Only imports interpret the action; keep it verbatim for the others.
        if template.command_mode.is_none() {
            template.command_mode = request.action;
        }

        let spec = ScheduleSpec {
            name: request.name,
            schedule_type,
            schedule_time: request.schedule_time,
            repeat: request.repeat,
            interval: request.interval,
            day_of_week: request.day_of_week,
            day_of_month: request.day_of_month,
        };
        let new_schedule = build_schedule(shop, &template, &spec, Utc::now())?;
        let schedule = self.schedules.create(new_schedule)?;
        info!(
            "Created {} schedule {} for {} ({} {})",
            schedule.schedule_type,
            schedule.id,
            shop,
            schedule.job_type.as_str(),
            schedule.entity
        );
        Ok(schedule)
    }

    pub fn list(&self, shop: &str) -> ServiceResult<Vec<Schedule>> {
        Ok(self.schedules.list_by_tenant(shop)?)
    }

    /// Fetch a schedule owned by `shop`. Foreign schedules are reported as
    /// missing.
    pub fn get(&self, shop: &str, id: &str) -> ServiceResult<Schedule> {
        match self.schedules.get(id)? {
            Some(schedule) if schedule.shop == shop => Ok(schedule),
            _ => Err(ServiceError::NotFound("Schedule")),
        }
    }

    /// Apply a user edit. A change to any timing field recomputes
    /// `next_run` from now.
    pub fn update(&self, shop: &str, id: &str, patch: SchedulePatch) -> ServiceResult<Schedule> {
        let existing = self.get(shop, id)?;
        let patch = patch.resolve_recurring();

        let next_run = if patch.changes_timing() {
            let schedule_type = ScheduleType::parse(
                patch
                    .schedule_type
                    .as_deref()
                    .unwrap_or(&existing.schedule_type),
            );
            let timing = Timing {
                schedule_type,
                schedule_time: patch
                    .schedule_time
                    .as_deref()
                    .or(existing.schedule_time.as_deref()),
                interval: patch.interval.or(existing.interval),
                day_of_month: existing.day_of_month,
            };
            Some(first_run(&timing, Utc::now())?.timestamp_millis())
        } else {
            None
        };

        if self.schedules.update(id, &patch, next_run)? == 0 {
            return Err(ServiceError::NotFound("Schedule"));
        }
        // A disabled schedule never fires, so its placeholder would never run.
        if patch.enabled == Some(false) {
            self.settle_placeholder(&existing)?;
        }
        info!("Updated schedule {} for {}", id, shop);
        self.get(shop, id)
    }

    pub fn delete(&self, shop: &str, id: &str) -> ServiceResult<()> {
        let schedule = self.get(shop, id)?;
        self.settle_placeholder(&schedule)?;
        self.schedules.delete(id)?;
        info!("Deleted schedule {} for {}", id, shop);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{FileFormat, SqliteJobStore};
    use crate::schedules::SqliteScheduleStore;
    use crate::timestamps::now_ms;
    use chrono::TimeZone;

    const SHOP_A: &str = "a.myshopify.com";
    const SHOP_B: &str = "b.myshopify.com";
    const MINUTE_MS: i64 = 60 * 1000;

    fn service() -> ScheduleService {
        with_jobs().0
    }

    fn with_jobs() -> (ScheduleService, Arc<SqliteJobStore>) {
        let jobs = Arc::new(SqliteJobStore::in_memory().unwrap());
        let service = ScheduleService::new(
            Arc::new(SqliteScheduleStore::in_memory().unwrap()),
            jobs.clone(),
        );
        (service, jobs)
    }

    /// A daily export schedule with a `scheduled` job waiting on it, as a
    /// submission carrying a schedule leaves them.
    fn schedule_with_placeholder(service: &ScheduleService, jobs: &SqliteJobStore) -> (Schedule, String) {
        let schedule = service
            .create(SHOP_A, request("export", "products", "daily"))
            .unwrap();
        let template = JobTemplate::from_schedule(&schedule);
        let job = jobs
            .create(template.new_job(SHOP_A, JobStatus::Scheduled, Some(schedule.id.clone())))
            .unwrap();
        service
            .schedules
            .set_pending_job(&schedule.id, Some(&job.id))
            .unwrap();
        (schedule, job.id)
    }

    fn request(job_type: &str, entity: &str, schedule_type: &str) -> CreateScheduleRequest {
        CreateScheduleRequest {
            job_type: Some(job_type.to_string()),
            entity: Some(entity.to_string()),
            schedule_type: Some(schedule_type.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_build_schedule_pins_monthly_day() {
        let template = JobTemplate::validate(
            JobType::Export,
            "products",
            Bag::new(),
            Bag::new(),
            Some("xlsx"),
            None,
            None,
        )
        .unwrap();
        let spec = ScheduleSpec {
            schedule_type: "recurring".to_string(),
            repeat: Some("monthly".to_string()),
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();

        let schedule = build_schedule(SHOP_A, &template, &spec, now).unwrap();
        assert_eq!(schedule.schedule_type, "monthly");
        assert_eq!(schedule.day_of_month, Some(31));
        assert_eq!(schedule.format, Some(FileFormat::Xlsx));
        assert_eq!(schedule.name, DEFAULT_SCHEDULE_NAME);
        assert_eq!(
            schedule.next_run,
            Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0)
                .unwrap()
                .timestamp_millis()
        );
    }

    #[test]
    fn test_create_requires_fields() {
        let service = service();
        let err = service
            .create(SHOP_A, CreateScheduleRequest::default())
            .unwrap_err();
        assert_eq!(err.code(), "invalid_request");
        assert_eq!(err.to_string(), "Missing required field: type");

        let err = service
            .create(SHOP_A, request("sync", "products", "daily"))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_job_type");

        let err = service
            .create(SHOP_A, request("import", "payouts", "daily"))
            .unwrap_err();
        assert_eq!(err.code(), "read_only_entity");

        let err = service
            .create(SHOP_A, request("export", "products", "custom"))
            .unwrap_err();
        assert_eq!(err.code(), "invalid_schedule");
    }

    #[test]
    fn test_create_computes_next_run() {
        let service = service();
        let mut custom = request("export", "customers", "custom");
        custom.interval = Some(30);
        custom.name = Some("Half-hourly customers".to_string());

        let before = now_ms();
        let schedule = service.create(SHOP_A, custom).unwrap();
        assert!(schedule.next_run >= before + 30 * MINUTE_MS);
        assert!(schedule.next_run <= now_ms() + 30 * MINUTE_MS);
        assert_eq!(schedule.name, "Half-hourly customers");
        assert!(schedule.enabled);
        assert_eq!(schedule.pending_job_id, None);
    }

    #[test]
    fn test_tenant_scoping() {
        let service = service();
        let schedule = service
            .create(SHOP_A, request("export", "products", "daily"))
            .unwrap();

        assert_eq!(service.list(SHOP_A).unwrap().len(), 1);
        assert!(service.list(SHOP_B).unwrap().is_empty());
        assert!(matches!(
            service.get(SHOP_B, &schedule.id),
            Err(ServiceError::NotFound("Schedule"))
        ));
        assert!(matches!(
            service.update(SHOP_B, &schedule.id, SchedulePatch::default()),
            Err(ServiceError::NotFound("Schedule"))
        ));
        assert!(matches!(
            service.delete(SHOP_B, &schedule.id),
            Err(ServiceError::NotFound("Schedule"))
        ));
        assert!(service.get(SHOP_A, &schedule.id).is_ok());
    }

    #[test]
    fn test_update_recomputes_next_run_only_on_timing_change() {
        let service = service();
        let schedule = service
            .create(SHOP_A, request("export", "products", "weekly"))
            .unwrap();

        let renamed = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    name: Some("Weekly products".to_string()),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(renamed.next_run, schedule.next_run);
        assert!(!renamed.enabled);

        let before = now_ms();
        let retimed = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    schedule_type: Some("custom".to_string()),
                    interval: Some(10),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(retimed.schedule_type, "custom");
        assert!(retimed.next_run >= before + 10 * MINUTE_MS);
        assert!(retimed.next_run < schedule.next_run);

        let err = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    interval: Some(0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "invalid_schedule");
    }

    #[test]
    fn test_delete() {
        let service = service();
        let schedule = service
            .create(SHOP_A, request("export", "products", "daily"))
            .unwrap();
        service.delete(SHOP_A, &schedule.id).unwrap();
        assert!(matches!(
            service.get(SHOP_A, &schedule.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_cancels_waiting_placeholder() {
        let (service, jobs) = with_jobs();
        let (schedule, job_id) = schedule_with_placeholder(&service, &jobs);

        service.delete(SHOP_A, &schedule.id).unwrap();

        let job = jobs.get(&job_id).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[test]
    fn test_disable_cancels_placeholder_and_forgets_it() {
        let (service, jobs) = with_jobs();
        let (schedule, job_id) = schedule_with_placeholder(&service, &jobs);

        let disabled = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(!disabled.enabled);
        assert_eq!(disabled.pending_job_id, None);
        assert_eq!(jobs.get(&job_id).unwrap().unwrap().status, JobStatus::Cancelled);
    }

    #[test]
    fn test_placeholder_already_running_is_left_alone() {
        let (service, jobs) = with_jobs();
        let (schedule, job_id) = schedule_with_placeholder(&service, &jobs);
        jobs.set_status(&job_id, JobStatus::Processing, &JobStatusUpdate::default())
            .unwrap();

        service.delete(SHOP_A, &schedule.id).unwrap();

        assert_eq!(jobs.get(&job_id).unwrap().unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_update_resolves_recurring_type() {
        let service = service();
        let schedule = service
            .create(SHOP_A, request("export", "products", "daily"))
            .unwrap();

        let updated = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    schedule_type: Some("recurring".to_string()),
                    repeat: Some("weekly".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        assert_eq!(updated.schedule_type, "weekly");
        assert!(updated.next_run > schedule.next_run);
    }

    #[test]
    fn test_update_rejects_oversized_interval() {
        let service = service();
        let schedule = service
            .create(SHOP_A, request("export", "products", "daily"))
            .unwrap();

        let err = service
            .update(
                SHOP_A,
                &schedule.id,
                SchedulePatch {
                    schedule_type: Some("custom".to_string()),
                    interval: Some(i64::MAX),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), "invalid_schedule");
        assert_eq!(service.get(SHOP_A, &schedule.id).unwrap(), schedule);
    }
}
