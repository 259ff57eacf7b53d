//! Fixed-entity import shortcuts and import file uploads.

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Response,
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{info, warn};

use super::api_error::{ApiError, ApiJson, ApiResult};
use super::export_routes::QUEUED_STATUS;
use super::job_routes::{created, submission_body};
use super::session::ShopSession;
use super::state::{GuardedJobService, GuardedUploadStore, ServerState};
use crate::jobs::{Bag, JobType, SubmitRequest};

const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ShortcutImportBody {
    file_key: Option<String>,
    params: Bag,
    command_mode: Option<String>,
}

async fn submit_import(
    shop: &str,
    jobs: &GuardedJobService,
    entity: &str,
    body: ShortcutImportBody,
) -> ApiResult<Response> {
    let request = SubmitRequest {
        params: body.params,
        file_key: body.file_key,
        command_mode: body.command_mode,
        ..SubmitRequest::new(JobType::Import, entity)
    };
    let submission = jobs.submit(shop, request).await?;
    let mut body = submission_body(&submission, QUEUED_STATUS);
    body["message"] = json!(format!("{} import job created", entity));
    Ok(created(body))
}

async fn import_products(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<ShortcutImportBody>,
) -> ApiResult<Response> {
    submit_import(&session.shop, &jobs, "products", body).await
}

async fn import_customers(
    session: ShopSession,
    State(jobs): State<GuardedJobService>,
    ApiJson(body): ApiJson<ShortcutImportBody>,
) -> ApiResult<Response> {
    submit_import(&session.shop, &jobs, "customers", body).await
}

fn upload_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    warn!("Upload rejected: {}", err.body_text());
    ApiError::new(err.status(), "upload_error", "File upload error")
}

async fn upload_file(
    session: ShopSession,
    State(uploads): State<GuardedUploadStore>,
    mut multipart: Multipart,
) -> ApiResult<Response> {
    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(upload_error)?;
        let file_key = uploads
            .save(&session.shop, filename.as_deref(), &bytes)
            .await?;
        info!(
            "Stored {} byte upload for {} as {}",
            bytes.len(),
            session.shop,
            file_key
        );
        return Ok(created(json!({
            "file_key": file_key,
            "message": "File uploaded successfully",
        })));
    }
    Err(ApiError::bad_request("no_file", "No file uploaded"))
}

pub fn import_routes(max_upload_bytes: usize) -> Router<ServerState> {
    let upload = Router::new()
        .route("/upload", post(upload_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(RequestBodyLimitLayer::new(max_upload_bytes));
    Router::new()
        .route("/products", post(import_products))
        .route("/customers", post(import_customers))
        .merge(upload)
}
