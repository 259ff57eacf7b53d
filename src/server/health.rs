//! Dependency health report and the more thorough admin system test.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

use super::metrics;
use super::state::ServerState;

pub fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;

    format!("{}d {}h {}m", days, hours, minutes)
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub timestamp: String,
    pub status: &'static str,
    pub uptime: String,
    pub services: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: &'static str,
    pub message: String,
    pub response_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SystemTestReport {
    pub timestamp: String,
    pub overall: &'static str,
    pub checks: BTreeMap<&'static str, CheckResult>,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn service_status(name: &str, result: anyhow::Result<()>) -> &'static str {
    match result {
        Ok(()) => "ok",
        Err(e) => {
            warn!("Health check for {} failed: {:#}", name, e);
            "error"
        }
    }
}

async fn check_queue(state: &ServerState) -> anyhow::Result<()> {
    let depth = state.queue.depth().await?;
    metrics::set_queue_depth(depth);
    Ok(())
}

pub async fn health_report(state: &ServerState) -> HealthReport {
    let mut services = BTreeMap::new();
    services.insert("job_store", service_status("job_store", state.job_store.ping()));
    services.insert(
        "schedule_store",
        service_status("schedule_store", state.schedule_store.count().map(|_| ())),
    );
    services.insert("queue", service_status("queue", check_queue(state).await));

    let healthy = services.values().all(|status| *status == "ok");
    HealthReport {
        timestamp: now_rfc3339(),
        status: if healthy { "ok" } else { "degraded" },
        uptime: format_uptime(state.start_time.elapsed()),
        services,
    }
}

/// GET /api/health and /api/admin/system/health
pub async fn health(State(state): State<ServerState>) -> Response {
    let report = health_report(&state).await;
    let status = if report.status == "ok" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

async fn timed_check<F>(ok_message: &str, check: F) -> CheckResult
where
    F: Future<Output = anyhow::Result<()>>,
{
    let start = Instant::now();
    let result = check.await;
    let response_time_ms = start.elapsed().as_millis() as u64;
    match result {
        Ok(()) => CheckResult {
            status: "ok",
            message: ok_message.to_string(),
            response_time_ms,
        },
        Err(e) => CheckResult {
            status: "error",
            message: format!("{:#}", e),
            response_time_ms,
        },
    }
}

pub async fn system_test_report(state: &ServerState) -> SystemTestReport {
    let mut checks = BTreeMap::new();
    checks.insert(
        "job_store",
        timed_check("Job store reachable", async { state.job_store.ping() }).await,
    );
    checks.insert(
        "schedule_store",
        timed_check("Schedule store reachable", async {
            state.schedule_store.count().map(|_| ())
        })
        .await,
    );
    checks.insert(
        "queue",
        timed_check("Queue reachable", check_queue(state)).await,
    );
    checks.insert(
        "uploads",
        timed_check("Upload directory writable", state.uploads.check_writable()).await,
    );

    let healthy = checks.values().all(|check| check.status == "ok");
    SystemTestReport {
        timestamp: now_rfc3339(),
        overall: if healthy { "healthy" } else { "unhealthy" },
        checks,
    }
}

/// GET /api/admin/system/test
pub async fn system_test(State(state): State<ServerState>) -> Response {
    let report = system_test_report(&state).await;
    let status = if report.overall == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}
