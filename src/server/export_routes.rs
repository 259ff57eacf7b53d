//! Fixed-entity export shortcuts and export downloads.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::api_error::{ApiError, ApiJson, ApiResult};
use super::job_routes::{created, submission_body};
use super::session::ShopSession;
use super::state::{GuardedJobService, ServerState};
use crate::jobs::{Bag, JobStatus, JobType, SubmitRequest};

/// Reported to callers of the shortcut routes regardless of the stored status.
pub(super) const QUEUED_STATUS: &str = "queued";

const DEFAULT_DOWNLOAD_FILENAME: &str = "export.csv";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShortcutExportBody {
    params: Bag,
    filters: Bag,
    format: Option<String>,
}

async fn submit_export(
    shop: &str,
    jobs: &GuardedJobService,
    entity: &str,
    body: ShortcutExportBody,
) -> ApiResult<Response> {
    let request = SubmitRequest {
        params: body.params,
        filters: body.filters,
        format: body.format,
        ..SubmitRequest::new(JobType::Export, entity)
    };
    let submission = jobs.submit(shop, request).await?;
    let mut body = submission_body(&submission, QUEUED_STATUS);
    body["message"] = json!(format!("{} export job created", entity));
    Ok(created(body))
}

async fn export_products(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<ShortcutExportBody>,
) -> ApiResult<Response> {
    submit_export(&session.shop, &jobs, "products", body).await
}

async fn export_customers(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<ShortcutExportBody>,
) -> ApiResult<Response> {
    submit_export(&session.shop, &jobs, "customers", body).await
}

async fn export_orders(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<ShortcutExportBody>,
) -> ApiResult<Response> {
    submit_export(&session.shop, &jobs, "orders", body).await
}

async fn download_export(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = jobs.get_for_tenant(&session.shop, &job_id)?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::bad_request(
            "job_not_completed",
            "Job not completed yet",
        ));
    }
    let download_url = job
        .file_url
        .ok_or_else(|| ApiError::not_found("no_file", "No file available"))?;
    Ok(Json(json!({
        "download_url": download_url,
        "filename": job
            .filename
            .unwrap_or_else(|| DEFAULT_DOWNLOAD_FILENAME.to_string()),
    })))
}

pub fn export_routes() -> Router<ServerState> {
    Router::new()
        .route("/products", post(export_products))
        .route("/customers", post(export_customers))
        .route("/orders", post(export_orders))
        .route("/download/{job_id}", get(download_export))
}
