//! Periodic promotion of due schedules into queued jobs.

use super::models::{Schedule, ScheduleType};
use super::next_run::{following_run, Timing};
use super::store::{ScheduleRun, ScheduleStore};
use crate::jobs::{publish_job, Job, JobStatus, JobStatusUpdate, JobStore, JobTemplate};
use crate::queue::QueuePublisher;
use crate::server::metrics;
use crate::timestamps::to_datetime;
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Name of the lease row that keeps evaluator passes from overlapping.
pub const EVALUATOR_LEASE: &str = "schedule_evaluator";

const COMMAND_CHANNEL_CAPACITY: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvaluationReport {
    /// False when another evaluator held the lease and the pass was skipped.
    pub lease_acquired: bool,
    pub due: usize,
    pub fired: usize,
    pub skipped: usize,
    pub failed: usize,
    pub disabled: usize,
}

/// What a due schedule's current occurrence amounts to.
enum Occurrence {
    Publish(Job),
    /// Published by an earlier pass that could not record the run.
    AlreadyQueued,
    Skip(String),
}

/// Command sent to the evaluator loop.
pub enum EvaluatorCommand {
    RunNow {
        response: oneshot::Sender<Result<EvaluationReport>>,
    },
}

/// Handle used by the admin routes to trigger a pass.
#[derive(Clone)]
pub struct EvaluatorHandle {
    command_tx: mpsc::Sender<EvaluatorCommand>,
}

impl EvaluatorHandle {
    pub fn channel() -> (Self, mpsc::Receiver<EvaluatorCommand>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        (EvaluatorHandle { command_tx }, command_rx)
    }

    /// Run a pass now and wait for its report.
    pub async fn run_now(&self) -> Result<EvaluationReport> {
        let (response, rx) = oneshot::channel();
        self.command_tx
            .send(EvaluatorCommand::RunNow { response })
            .await
            .map_err(|_| anyhow!("Schedule evaluator is not running"))?;
        rx.await
            .map_err(|_| anyhow!("Schedule evaluator stopped before answering"))?
    }
}

pub struct ScheduleEvaluator {
    jobs: Arc<dyn JobStore>,
    schedules: Arc<dyn ScheduleStore>,
    queue: Arc<dyn QueuePublisher>,
    holder: String,
    lease_ttl: Duration,
}

impl ScheduleEvaluator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        schedules: Arc<dyn ScheduleStore>,
        queue: Arc<dyn QueuePublisher>,
        lease_ttl: Duration,
    ) -> Self {
        ScheduleEvaluator {
            jobs,
            schedules,
            queue,
            holder: uuid::Uuid::new_v4().to_string(),
            lease_ttl,
        }
    }

    /// Evaluate on a fixed interval until `shutdown_token` is cancelled.
    pub async fn run(
        self,
        interval: Duration,
        mut command_rx: mpsc::Receiver<EvaluatorCommand>,
        shutdown_token: CancellationToken,
    ) {
        info!("Starting schedule evaluator, interval {:?}", interval);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(e) = self.run_pass(Utc::now()).await {
                        error!("Schedule evaluation failed: {:#}", e);
                    }
                }
                Some(command) = command_rx.recv() => {
                    match command {
                        EvaluatorCommand::RunNow { response } => {
                            info!("Running schedule evaluation on request");
                            let _ = response.send(self.run_pass(Utc::now()).await);
                        }
                    }
                }
                _ = shutdown_token.cancelled() => {
                    info!("Schedule evaluator received shutdown signal");
                    break;
                }
            }
        }
        info!("Schedule evaluator stopped");
    }

    /// One sweep over the schedules due at `now`. Failures are isolated per
    /// schedule; only a failure to list due schedules fails the pass.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<EvaluationReport> {
        let started = Instant::now();
        let now_ms = now.timestamp_millis();
        let ttl_ms = self.lease_ttl.as_millis() as i64;

        if !self
            .schedules
            .try_acquire_lease(EVALUATOR_LEASE, &self.holder, now_ms, ttl_ms)?
        {
            debug!("Schedule evaluator lease is held elsewhere, skipping pass");
            return Ok(EvaluationReport::default());
        }

        let result = self.sweep(now).await;
        if let Err(e) = self.schedules.release_lease(EVALUATOR_LEASE, &self.holder) {
            warn!("Failed to release schedule evaluator lease: {:#}", e);
        }
        if let Ok(depth) = self.queue.depth().await {
            metrics::set_queue_depth(depth);
        }
        metrics::record_evaluator_pass(started.elapsed());

        let report = result?;
        if report.due > 0 {
            info!(
                "Schedule evaluation: {} due, {} fired, {} skipped, {} failed, {} disabled",
                report.due, report.fired, report.skipped, report.failed, report.disabled
            );
        }
        Ok(report)
    }

    async fn sweep(&self, now: DateTime<Utc>) -> Result<EvaluationReport> {
        let due = self.schedules.list_due(now.timestamp_millis())?;
        let mut report = EvaluationReport {
            lease_acquired: true,
            due: due.len(),
            ..Default::default()
        };

        for schedule in &due {
            match self.fire(schedule, now).await {
                Ok((fired, enabled)) => {
                    if fired {
                        report.fired += 1;
                        metrics::record_schedule_firing("fired");
                    } else {
                        report.skipped += 1;
                        metrics::record_schedule_firing("skipped");
                    }
                    if !enabled {
                        report.disabled += 1;
                        metrics::record_schedule_firing("disabled");
                    }
                }
                Err(e) => {
                    error!("Failed to fire schedule {}: {:#}", schedule.id, e);
                    report.failed += 1;
                    metrics::record_schedule_firing("failed");
                }
            }
        }
        Ok(report)
    }

    /// Returns whether a job was published and whether the schedule stays
    /// enabled. `next_run` only moves once the occurrence is settled.
    async fn fire(&self, schedule: &Schedule, now: DateTime<Utc>) -> Result<(bool, bool)> {
        let fired = match self.occurrence(schedule).await? {
            Occurrence::Publish(job) => {
                publish_job(self.queue.as_ref(), &job).await?;
                info!("Schedule {} queued job {}", schedule.id, job.id);
                true
            }
            Occurrence::AlreadyQueued => true,
            Occurrence::Skip(reason) => {
                info!("Schedule {} skipped this occurrence: {}", schedule.id, reason);
                false
            }
        };

        let kind = schedule.kind();
        let timing = Timing {
            schedule_type: kind.clone(),
            schedule_time: schedule.schedule_time.as_deref(),
            interval: schedule.interval,
            day_of_month: schedule.day_of_month,
        };
        let run = match following_run(&timing, to_datetime(schedule.next_run), now) {
            Some(next) => ScheduleRun {
                last_run: now.timestamp_millis(),
                next_run: next.timestamp_millis(),
                enabled: true,
            },
            None => {
                if kind != ScheduleType::Once {
                    warn!(
                        "Schedule {} of type '{}' cannot recur, disabling it",
                        schedule.id, schedule.schedule_type
                    );
                }
                ScheduleRun {
                    last_run: now.timestamp_millis(),
                    next_run: schedule.next_run,
                    enabled: false,
                }
            }
        };
        self.schedules.record_run(&schedule.id, run)?;
        Ok((fired, run.enabled))
    }

    async fn occurrence(&self, schedule: &Schedule) -> Result<Occurrence> {
        if let Some(job_id) = &schedule.pending_job_id {
            match self.jobs.get(job_id)? {
                Some(job) if job.status == JobStatus::Scheduled => {
                    let promoted = self.jobs.transition_status(
                        &job.id,
                        JobStatus::Scheduled,
                        JobStatus::Pending,
                        &JobStatusUpdate::default(),
                    )?;
                    if promoted == 0 {
                        return Ok(Occurrence::Skip(format!(
                            "job {} changed status while being promoted",
                            job.id
                        )));
                    }
                    metrics::record_job_transition(JobStatus::Pending.as_str());
                    return Ok(Occurrence::Publish(Job {
                        status: JobStatus::Pending,
                        ..job
                    }));
                }
                Some(job) if job.status == JobStatus::Pending => {
                    if self.queue.is_enqueued(&job.id).await? {
                        return Ok(Occurrence::AlreadyQueued);
                    }
                    return Ok(Occurrence::Publish(job));
                }
                Some(job) => {
                    return Ok(Occurrence::Skip(format!(
                        "job {} is {}",
                        job.id,
                        job.status.as_str()
                    )));
                }
                None => warn!(
                    "Job {} linked to schedule {} no longer exists",
                    job_id, schedule.id
                ),
            }
        }

        let job = self.jobs.create(JobTemplate::from_schedule(schedule).new_job(
            &schedule.shop,
            JobStatus::Pending,
            Some(schedule.id.clone()),
        ))?;
        // Linked before publishing so a failed publish is retried with the
        // same job instead of materializing another one.
        self.schedules.set_pending_job(&schedule.id, Some(&job.id))?;
        Ok(Occurrence::Publish(job))
    }
}
