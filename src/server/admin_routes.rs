//! Operator portal endpoints. Every handler requires an admin token.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::api_error::{ApiError, ApiQuery, ApiResult};
use super::health;
use super::metrics;
use super::session::AdminSession;
use super::state::{OptionalEvaluatorHandle, ServerState};
use crate::jobs::JobStatus;
use crate::pagination::PageRequest;

pub const DEFAULT_ADMIN_JOBS_PAGE_SIZE: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AdminJobsQuery {
    page: Option<usize>,
    limit: Option<usize>,
    shop: Option<String>,
}

async fn stats(_admin: AdminSession, State(state): State<ServerState>) -> ApiResult<Response> {
    let tenants = state.tenant_store.stats()?;
    let counts = state.job_store.count_by_status()?;
    let jobs_by_status: BTreeMap<&str, usize> = JobStatus::ALL
        .iter()
        .map(|status| (status.as_str(), counts.get(status).copied().unwrap_or(0)))
        .collect();
    let queue_depth = state.queue.depth().await?;
    metrics::set_queue_depth(queue_depth);

    Ok(Json(json!({
        "total_stores": tenants.total_stores,
        "active_stores": tenants.active_stores,
        "inactive_stores": tenants.inactive_stores,
        "jobs_by_status": jobs_by_status,
        "queue_depth": queue_depth,
    }))
    .into_response())
}

async fn list_jobs(
    _admin: AdminSession,
    State(state): State<ServerState>,
    ApiQuery(query): ApiQuery<AdminJobsQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = PageRequest::new(query.page, query.limit, DEFAULT_ADMIN_JOBS_PAGE_SIZE);
    let shop = query.shop.as_deref().filter(|s| !s.is_empty());
    Ok(Json(state.job_service.list_all(shop, page)?))
}

async fn system_health(_admin: AdminSession, state: State<ServerState>) -> Response {
    health::health(state).await
}

async fn system_test(_admin: AdminSession, state: State<ServerState>) -> Response {
    health::system_test(state).await
}

async fn run_scheduler(
    admin: AdminSession,
    State(evaluator): State<OptionalEvaluatorHandle>,
) -> ApiResult<Response> {
    let unavailable = || {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "scheduler_unavailable",
            "Schedule evaluator is not running",
        )
    };
    let evaluator = evaluator.ok_or_else(unavailable)?;
    info!(
        "Evaluator pass requested by {}",
        admin.subject.as_deref().unwrap_or("unknown admin")
    );
    let report = evaluator.run_now().await.map_err(|e| {
        warn!("Requested evaluator pass failed: {:#}", e);
        unavailable()
    })?;
    Ok((StatusCode::ACCEPTED, Json(report)).into_response())
}

pub fn admin_routes() -> Router<ServerState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/jobs", get(list_jobs))
        .route("/system/health", get(system_health))
        .route("/system/test", get(system_test))
        .route("/scheduler/run", post(run_scheduler))
}
