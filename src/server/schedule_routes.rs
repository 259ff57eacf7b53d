use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use super::api_error::{ApiJson, ApiResult};
use super::job_routes::created;
use super::session::ShopSession;
use super::state::{GuardedScheduleService, ServerState};
use crate::schedules::{CreateScheduleRequest, SchedulePatch};

async fn create_schedule(
    session: ShopSession,
    State(schedules): State<GuardedScheduleService>,
    ApiJson(request): ApiJson<CreateScheduleRequest>,
) -> ApiResult<Response> {
    let schedule = schedules.create(&session.shop, request)?;
    Ok(created(json!({
        "schedule_id": schedule.id,
        "message": "Schedule created successfully",
    })))
}

async fn list_schedules(
    session: ShopSession,
    State(schedules): State<GuardedScheduleService>,
) -> ApiResult<impl IntoResponse> {
    let schedules = schedules.list(&session.shop)?;
    Ok(Json(json!({ "schedules": schedules })))
}

async fn get_schedule(
    session: ShopSession,
    State(schedules): State<GuardedScheduleService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let schedule = schedules.get(&session.shop, &id)?;
    Ok(Json(json!({ "schedule": schedule })))
}

async fn update_schedule(
    session: ShopSession,
    State(schedules): State<GuardedScheduleService>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<SchedulePatch>,
) -> ApiResult<impl IntoResponse> {
    let schedule = schedules.update(&session.shop, &id, patch)?;
    Ok(Json(json!({
        "message": "Schedule updated successfully",
        "schedule": schedule,
    })))
}

async fn delete_schedule(
    session: ShopSession,
    State(schedules): State<GuardedScheduleService>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    schedules.delete(&session.shop, &id)?;
    Ok(Json(json!({ "message": "Schedule deleted successfully" })))
}

pub fn schedule_routes() -> Router<ServerState> {
    Router::new()
        .route("/", get(list_schedules).post(create_schedule))
        .route(
            "/{id}",
            get(get_schedule)
                .put(update_schedule)
                .delete(delete_schedule),
        )
}
