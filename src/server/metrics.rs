use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounter, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all bulk manager metrics
const PREFIX: &str = "bulk_manager";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Job Metrics
    pub static ref JOBS_SUBMITTED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_submitted_total"), "Jobs accepted by type and mode"),
        &["type", "mode"]
    ).expect("Failed to create jobs_submitted_total metric");

    pub static ref JOB_TRANSITIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_job_transitions_total"), "Job status transitions by target status"),
        &["status"]
    ).expect("Failed to create job_transitions_total metric");

    // Queue Metrics
    pub static ref QUEUE_PUBLISHES_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_queue_publishes_total"),
        "Messages published to the work queue"
    ).expect("Failed to create queue_publishes_total metric");

    pub static ref QUEUE_PUBLISH_FAILURES_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_queue_publish_failures_total"),
        "Failed publishes to the work queue"
    ).expect("Failed to create queue_publish_failures_total metric");

    pub static ref QUEUE_DEPTH: Gauge = Gauge::new(
        format!("{PREFIX}_queue_depth"),
        "Messages waiting to be claimed by a worker"
    ).expect("Failed to create queue_depth metric");

    // Scheduler Metrics
    pub static ref SCHEDULE_FIRINGS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_schedule_firings_total"), "Schedule firings by result"),
        &["result"]
    ).expect("Failed to create schedule_firings_total metric");

    pub static ref EVALUATOR_PASS_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_evaluator_pass_duration_seconds"),
            "Schedule evaluator pass duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("Failed to create evaluator_pass_duration_seconds metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOBS_SUBMITTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_TRANSITIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_PUBLISHES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_PUBLISH_FAILURES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_DEPTH.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULE_FIRINGS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(EVALUATOR_PASS_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record an accepted job. `mode` is `immediate` or `scheduled`.
pub fn record_job_submitted(job_type: &str, mode: &str) {
    JOBS_SUBMITTED_TOTAL
        .with_label_values(&[job_type, mode])
        .inc();
}

pub fn record_job_transition(status: &str) {
    JOB_TRANSITIONS_TOTAL.with_label_values(&[status]).inc();
}

pub fn record_queue_publish(success: bool) {
    if success {
        QUEUE_PUBLISHES_TOTAL.inc();
    } else {
        QUEUE_PUBLISH_FAILURES_TOTAL.inc();
    }
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

/// Record a schedule firing: `fired`, `skipped`, `failed` or `disabled`.
pub fn record_schedule_firing(result: &str) {
    SCHEDULE_FIRINGS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_evaluator_pass(duration: Duration) {
    EVALUATOR_PASS_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
