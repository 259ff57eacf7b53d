use axum::extract::FromRef;

use crate::jobs::{JobService, JobStore};
use crate::queue::{JobEvents, QueueConsumer, QueuePublisher};
use crate::schedules::{EvaluatorHandle, ScheduleService, ScheduleStore};
use crate::tenants::TenantStore;
use crate::uploads::UploadStore;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedJobService = Arc<JobService>;
pub type GuardedScheduleService = Arc<ScheduleService>;
pub type GuardedJobStore = Arc<dyn JobStore>;
pub type GuardedScheduleStore = Arc<dyn ScheduleStore>;
pub type GuardedTenantStore = Arc<dyn TenantStore>;
pub type GuardedQueuePublisher = Arc<dyn QueuePublisher>;
pub type GuardedQueueConsumer = Arc<dyn QueueConsumer>;
pub type GuardedUploadStore = Arc<UploadStore>;
pub type OptionalEvaluatorHandle = Option<EvaluatorHandle>;

/// Stores and channels the application is assembled from.
#[derive(Clone)]
pub struct ServerComponents {
    pub job_store: GuardedJobStore,
    pub schedule_store: GuardedScheduleStore,
    pub tenant_store: GuardedTenantStore,
    pub queue: GuardedQueuePublisher,
    pub queue_consumer: GuardedQueueConsumer,
    pub job_events: JobEvents,
    pub uploads: GuardedUploadStore,
    /// Absent when the evaluator is disabled.
    pub evaluator: OptionalEvaluatorHandle,
}

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub job_service: GuardedJobService,
    pub schedule_service: GuardedScheduleService,
    pub job_store: GuardedJobStore,
    pub schedule_store: GuardedScheduleStore,
    pub tenant_store: GuardedTenantStore,
    pub queue: GuardedQueuePublisher,
    pub queue_consumer: GuardedQueueConsumer,
    pub job_events: JobEvents,
    pub uploads: GuardedUploadStore,
    pub evaluator: OptionalEvaluatorHandle,
}

impl ServerState {
    pub fn new(config: ServerConfig, components: ServerComponents) -> ServerState {
        let job_service = Arc::new(JobService::new(
            components.job_store.clone(),
            components.schedule_store.clone(),
            components.queue.clone(),
        ));
        let schedule_service = Arc::new(ScheduleService::new(
            components.schedule_store.clone(),
            components.job_store.clone(),
        ));
        ServerState {
            config,
            start_time: Instant::now(),
            job_service,
            schedule_service,
            job_store: components.job_store,
            schedule_store: components.schedule_store,
            tenant_store: components.tenant_store,
            queue: components.queue,
            queue_consumer: components.queue_consumer,
            job_events: components.job_events,
            uploads: components.uploads,
            evaluator: components.evaluator,
        }
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}

impl FromRef<ServerState> for GuardedJobService {
    fn from_ref(input: &ServerState) -> Self {
        input.job_service.clone()
    }
}

impl FromRef<ServerState> for GuardedScheduleService {
    fn from_ref(input: &ServerState) -> Self {
        input.schedule_service.clone()
    }
}

impl FromRef<ServerState> for GuardedTenantStore {
    fn from_ref(input: &ServerState) -> Self {
        input.tenant_store.clone()
    }
}

impl FromRef<ServerState> for GuardedQueueConsumer {
    fn from_ref(input: &ServerState) -> Self {
        input.queue_consumer.clone()
    }
}

impl FromRef<ServerState> for GuardedUploadStore {
    fn from_ref(input: &ServerState) -> Self {
        input.uploads.clone()
    }
}

impl FromRef<ServerState> for JobEvents {
    fn from_ref(input: &ServerState) -> Self {
        input.job_events.clone()
    }
}

impl FromRef<ServerState> for OptionalEvaluatorHandle {
    fn from_ref(input: &ServerState) -> Self {
        input.evaluator.clone()
    }
}
