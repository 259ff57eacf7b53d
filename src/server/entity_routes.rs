//! Entity-oriented submission endpoints used by the embedded app.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::api_error::{ApiJson, ApiQuery, ApiResult};
use super::job_routes::{created, submission_body};
use super::session::ShopSession;
use super::state::{GuardedJobService, ServerState};
use crate::catalog::{BACKUP_ENTITY, READ_ONLY_ENTITIES, SUPPORTED_ENTITIES};
use crate::jobs::{Bag, JobType, SubmitRequest, Submission};
use crate::schedules::ScheduleSpec;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExportBody {
    params: Bag,
    filters: Bag,
    format: Option<String>,
    schedule: Option<ScheduleSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ImportBody {
    file_key: Option<String>,
    params: Bag,
    command_mode: Option<String>,
    schedule: Option<ScheduleSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackupBody {
    entities: Vec<String>,
    format: Option<String>,
    params: Bag,
    schedule: Option<ScheduleSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TemplateQuery {
    format: Option<String>,
}

fn respond(submission: Submission, message: String) -> Response {
    let mut body = submission_body(&submission, submission.job.status.as_str());
    body["message"] = Value::String(message);
    created(body)
}

async fn list_entities(_session: ShopSession) -> impl IntoResponse {
    Json(json!({
        "entities": SUPPORTED_ENTITIES,
        "read_only": READ_ONLY_ENTITIES,
    }))
}

async fn export_entity(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(entity): Path<String>,
    ApiJson(body): ApiJson<ExportBody>,
) -> ApiResult<Response> {
    let request = SubmitRequest {
        params: body.params,
        filters: body.filters,
        format: body.format,
        schedule: body.schedule,
        ..SubmitRequest::new(JobType::Export, entity.clone())
    };
    let submission = jobs.submit(&session.shop, request).await?;
    Ok(respond(
        submission,
        format!("Export job created for {}", entity),
    ))
}

async fn import_entity(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(entity): Path<String>,
    ApiJson(body): ApiJson<ImportBody>,
) -> ApiResult<Response> {
    let request = SubmitRequest {
        params: body.params,
        file_key: body.file_key,
        command_mode: body.command_mode,
        schedule: body.schedule,
        ..SubmitRequest::new(JobType::Import, entity.clone())
    };
    let submission = jobs.submit(&session.shop, request).await?;
    Ok(respond(
        submission,
        format!("Import job created for {}", entity),
    ))
}

async fn entity_template(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(entity): Path<String>,
    ApiQuery(query): ApiQuery<TemplateQuery>,
) -> ApiResult<Response> {
    let request = SubmitRequest {
        format: query.format,
        ..SubmitRequest::new(JobType::Template, entity.clone())
    };
    let submission = jobs.submit(&session.shop, request).await?;
    Ok(respond(
        submission,
        format!("Template generation job created for {}", entity),
    ))
}

async fn backup_export(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<BackupBody>,
) -> ApiResult<Response> {
    let count = body.entities.len();
    let mut params = body.params;
    params.insert("entities".to_string(), json!(body.entities));
    let request = SubmitRequest {
        params,
        format: body.format,
        schedule: body.schedule,
        ..SubmitRequest::new(JobType::Backup, BACKUP_ENTITY)
    };
    let submission = jobs.submit(&session.shop, request).await?;
    Ok(respond(
        submission,
        format!("Backup job created for {} entities", count),
    ))
}

pub fn entity_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_entities))
        .route("/backup/export", post(backup_export))
        .route("/{entity}/export", post(export_entity))
        .route("/{entity}/import", post(import_entity))
        .route("/{entity}/template", get(entity_template))
}
