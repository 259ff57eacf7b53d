use anyhow::{Context, Result};
use axum::{extract::State, middleware, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::admin_routes::admin_routes;
use super::entity_routes::entity_routes;
use super::export_routes::export_routes;
use super::health::{self, format_uptime};
use super::import_routes::import_routes;
use super::job_routes::job_routes;
use super::metrics::metrics_handler;
use super::schedule_routes::schedule_routes;
use super::store_routes::store_routes;
use super::webhook_routes::webhook_routes;
use super::worker_routes::worker_routes;
use super::{log_requests, state::*, ServerConfig};

#[derive(Serialize)]
struct ServerStats {
    pub app: &'static str,
    pub version: &'static str,
    pub status: &'static str,
    pub uptime: String,
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    Json(ServerStats {
        app: "Shopify Bulk Manager",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
        uptime: format_uptime(state.start_time.elapsed()),
    })
}

pub fn make_app(config: ServerConfig, components: ServerComponents) -> Result<Router> {
    let state = ServerState::new(config.clone(), components);

    let mut api_routes: Router<ServerState> = Router::new()
        .route("/health", get(health::health))
        .nest("/entities", entity_routes())
        .nest("/jobs", job_routes())
        .nest("/export", export_routes())
        .nest("/import", import_routes(config.upload_max_bytes))
        .nest("/schedules", schedule_routes())
        .nest("/stores", store_routes())
        .nest("/admin", admin_routes())
        .nest("/webhooks", webhook_routes());

    if config.worker_token.is_some() {
        api_routes = api_routes.nest("/worker", worker_routes());
    } else {
        info!("No worker token configured, worker routes disabled");
    }

    let app: Router = Router::new()
        .route("/", get(home))
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), log_requests))
        .with_state(state);

    Ok(app)
}

async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    info!("Metrics available at port {}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

/// Serve the API until `shutdown` is cancelled. Metrics are exposed on their
/// own port.
pub async fn run_server(
    config: ServerConfig,
    metrics_port: u16,
    components: ServerComponents,
    shutdown: CancellationToken,
) -> Result<()> {
    let port = config.port;
    let app = make_app(config, components)?;

    let metrics_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_port, metrics_shutdown).await {
            error!("Metrics server stopped: {:#}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind port {}", port))?;
    info!("Serving on port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
