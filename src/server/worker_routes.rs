//! Endpoints for out-of-process workers: claim queued work, report status
//! and progress, and listen for new jobs.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::api_error::{ApiJson, ApiResult};
use super::session::WorkerAuth;
use super::state::{GuardedJobService, GuardedQueueConsumer, ServerState};
use crate::error::{ServiceError, ValidationCode};
use crate::jobs::{JobStatus, JobStatusUpdate};
use crate::queue::{JobEvents, QueueMessage, JOB_CREATED_CHANNEL};

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
    #[serde(flatten)]
    update: JobStatusUpdate,
}

#[derive(Debug, Deserialize)]
struct ProgressBody {
    progress: i64,
    message: Option<String>,
}

/// Frame pushed to event listeners.
#[derive(Debug, Serialize)]
struct JobEvent<'a> {
    event: &'static str,
    job_id: &'a str,
    data: &'a serde_json::Value,
}

async fn claim_job(
    _worker: WorkerAuth,
    State(jobs): State<GuardedJobService>,
    State(consumer): State<GuardedQueueConsumer>,
) -> ApiResult<Response> {
    match jobs.claim_next(consumer.as_ref()).await? {
        Some(message) => {
            debug!("Handing job {} to a worker", message.job_id);
            Ok(Json(message).into_response())
        }
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn report_status(
    _worker: WorkerAuth,
    State(jobs): State<GuardedJobService>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<StatusBody>,
) -> ApiResult<impl IntoResponse> {
    let status = JobStatus::from_str(&body.status).ok_or_else(|| {
        ServiceError::validation(
            ValidationCode::InvalidStatus,
            format!("Unknown status '{}'", body.status),
        )
    })?;
    let job = jobs.report_status(&id, status, body.update)?;
    Ok(Json(json!({ "job": job })))
}

async fn report_progress(
    _worker: WorkerAuth,
    State(jobs): State<GuardedJobService>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ProgressBody>,
) -> ApiResult<impl IntoResponse> {
    jobs.record_progress(&id, body.progress, body.message.as_deref())?;
    Ok(Json(json!({ "job_id": id, "progress": body.progress.clamp(0, 100) })))
}

async fn job_events(
    _worker: WorkerAuth,
    ws: WebSocketUpgrade,
    State(events): State<JobEvents>,
) -> Response {
    let receiver = events.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, receiver))
}

async fn handle_socket(socket: WebSocket, events: broadcast::Receiver<QueueMessage>) {
    info!("Worker event listener connected");
    let (ws_sink, mut ws_stream) = socket.split();
    let forward_handle = tokio::spawn(forward_events(ws_sink, events));

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => debug!("Ignoring message from event listener"),
        }
    }

    forward_handle.abort();
    info!("Worker event listener disconnected");
}

async fn forward_events(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut events: broadcast::Receiver<QueueMessage>,
) {
    loop {
        let message = match events.recv().await {
            Ok(message) => message,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event listener lagged, {} job events dropped", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        let frame = JobEvent {
            event: JOB_CREATED_CHANNEL,
            job_id: &message.job_id,
            data: &message.data,
        };
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize job event: {}", e);
                continue;
            }
        };
        if ws_sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
}

pub fn worker_routes() -> Router<ServerState> {
    Router::new()
        .route("/jobs/claim", post(claim_job))
        .route("/jobs/{id}/status", put(report_status))
        .route("/jobs/{id}/progress", put(report_progress))
        .route("/events", get(job_events))
}
