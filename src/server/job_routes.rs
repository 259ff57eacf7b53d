//! Generic job endpoints: submit, list, inspect and cancel.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::api_error::{ApiError, ApiJson, ApiQuery, ApiResult};
use super::session::ShopSession;
use super::state::{GuardedJobService, ServerState};
use crate::error::{ServiceError, ValidationCode};
use crate::jobs::{Bag, JobType, SubmitRequest, Submission};
use crate::pagination::PageRequest;
use crate::schedules::ScheduleSpec;

pub const DEFAULT_JOBS_PAGE_SIZE: usize = 20;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CreateJobBody {
    #[serde(rename = "type")]
    job_type: Option<String>,
    entity: Option<String>,
    params: Bag,
    filters: Bag,
    format: Option<String>,
    file_key: Option<String>,
    command_mode: Option<String>,
    schedule: Option<ScheduleSpec>,
}

/// 201 body shared by every submission endpoint.
pub(super) fn submission_body(submission: &Submission, status: &str) -> Value {
    let mut body = json!({
        "job_id": submission.job.id,
        "status": status,
    });
    if let Some(schedule) = &submission.schedule {
        body["schedule_id"] = json!(schedule.id);
    }
    body
}

fn missing_field(field: &str) -> ApiError {
    ServiceError::validation(
        ValidationCode::InvalidRequest,
        format!("Missing required field: {}", field),
    )
    .into()
}

pub(super) fn created(body: Value) -> Response {
    (StatusCode::CREATED, Json(body)).into_response()
}

/// POST /api/jobs
async fn create_job(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<CreateJobBody>,
) -> ApiResult<Response> {
    let raw_type = body
        .job_type
        .filter(|t| !t.is_empty())
        .ok_or_else(|| missing_field("type"))?;
    let job_type = JobType::from_str(&raw_type).ok_or_else(|| {
        ServiceError::validation(
            ValidationCode::InvalidJobType,
            format!("Unknown job type '{}'", raw_type),
        )
    })?;
    // Backups carry their entities in params.
    let entity = match (job_type, body.entity) {
        (_, Some(entity)) if !entity.is_empty() => entity,
        (JobType::Backup, _) => String::new(),
        _ => return Err(missing_field("entity")),
    };

    let request = SubmitRequest {
        params: body.params,
        filters: body.filters,
        format: body.format,
        file_key: body.file_key,
        command_mode: body.command_mode,
        schedule: body.schedule,
        ..SubmitRequest::new(job_type, entity)
    };
    let submission = jobs.submit(&session.shop, request).await?;
    Ok(created(submission_body(
        &submission,
        submission.job.status.as_str(),
    )))
}

/// GET /api/jobs
async fn list_jobs(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_JOBS_PAGE_SIZE);
    Ok(Json(jobs.list_for_tenant(&session.shop, page)?))
}

/// GET /api/jobs/{id}
async fn get_job(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = jobs.get_for_tenant(&session.shop, &id)?;
    Ok(Json(json!({ "job": job })))
}

/// DELETE /api/jobs/{id}
async fn cancel_job(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    debug!("{} cancelling job {}", session.shop, id);
    let job = jobs.cancel(&session.shop, &id)?;
    Ok(Json(json!({ "message": "Job cancelled", "job": job })))
}

pub fn job_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_jobs).post(create_job))
        .route("/{id}", get(get_job).delete(cancel_job))
}
