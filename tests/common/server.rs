//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own databases, upload
//! directory and schedule evaluator.

use super::constants::*;
use bulk_manager_server::jobs::{JobStore, SqliteJobStore};
use bulk_manager_server::queue::{JobEvents, QueuePublisher, SqliteJobQueue};
use bulk_manager_server::schedules::{
    EvaluatorHandle, ScheduleEvaluator, ScheduleStore, SqliteScheduleStore,
};
use bulk_manager_server::server::RequestsLoggingLevel;
use bulk_manager_server::tenants::{SqliteTenantStore, TenantStore};
use bulk_manager_server::uploads::UploadStore;
use bulk_manager_server::{make_app, ServerComponents, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Evaluator passes only run when requested through the admin route.
const EVALUATOR_INTERVAL: Duration = Duration::from_secs(3600);

const EVALUATOR_LEASE_TTL: Duration = Duration::from_secs(60);

/// Test server instance with isolated storage
///
/// When dropped, the server and its evaluator shut down and temp resources
/// are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// The port the server is listening on
    pub port: u16,

    /// Direct store access for arranging and checking state in tests
    pub job_store: Arc<dyn JobStore>,
    pub schedule_store: Arc<dyn ScheduleStore>,
    pub tenant_store: Arc<dyn TenantStore>,
    pub queue: Arc<dyn QueuePublisher>,
    pub uploads: Arc<UploadStore>,

    // Private fields - keep resources alive until drop
    _temp_dir: TempDir,
    shutdown_token: CancellationToken,
}

impl TestServer {
    /// Spawns a server with worker routes and the evaluator enabled.
    pub async fn spawn() -> Self {
        Self::spawn_with(Some(WORKER_TOKEN), true).await
    }

    /// Spawns a server without worker token and without evaluator.
    pub async fn spawn_minimal() -> Self {
        Self::spawn_with(None, false).await
    }

    async fn spawn_with(worker_token: Option<&str>, with_evaluator: bool) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let job_store: Arc<dyn JobStore> = Arc::new(
            SqliteJobStore::new(temp_dir.path().join("jobs.db"))
                .expect("Failed to open job store"),
        );
        let schedule_store: Arc<dyn ScheduleStore> = Arc::new(
            SqliteScheduleStore::new(temp_dir.path().join("schedules.db"))
                .expect("Failed to open schedule store"),
        );
        let tenant_store: Arc<dyn TenantStore> = Arc::new(
            SqliteTenantStore::new(temp_dir.path().join("tenants.db"))
                .expect("Failed to open tenant store"),
        );
        let job_events = JobEvents::new();
        let queue = Arc::new(
            SqliteJobQueue::new(temp_dir.path().join("queue.db"), job_events.clone())
                .expect("Failed to open queue"),
        );
        let uploads = Arc::new(
            UploadStore::new(temp_dir.path().join("uploads"))
                .expect("Failed to create upload dir"),
        );

        let shutdown_token = CancellationToken::new();
        let evaluator = if with_evaluator {
            let (handle, command_rx) = EvaluatorHandle::channel();
            let evaluator = ScheduleEvaluator::new(
                job_store.clone(),
                schedule_store.clone(),
                queue.clone(),
                EVALUATOR_LEASE_TTL,
            );
            tokio::spawn(evaluator.run(
                EVALUATOR_INTERVAL,
                command_rx,
                shutdown_token.clone(),
            ));
            Some(handle)
        } else {
            None
        };

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            shopify_api_secret: SHOPIFY_API_SECRET.to_string(),
            admin_jwt_secret: Some(ADMIN_JWT_SECRET.to_string()),
            worker_token: worker_token.map(str::to_string),
            upload_max_bytes: TEST_UPLOAD_MAX_BYTES,
        };
        let components = ServerComponents {
            job_store: job_store.clone(),
            schedule_store: schedule_store.clone(),
            tenant_store: tenant_store.clone(),
            queue: queue.clone(),
            queue_consumer: queue.clone(),
            job_events,
            uploads: uploads.clone(),
            evaluator,
        };
        let app = make_app(config, components).expect("Failed to build app");

        let server_shutdown = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            job_store,
            schedule_store,
            tenant_store,
            queue,
            uploads,
            _temp_dir: temp_dir,
            shutdown_token,
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the banner endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        loop {
            if start.elapsed() > timeout {
                panic!(
                    "Server did not become ready within {}ms",
                    SERVER_READY_TIMEOUT_MS
                );
            }

            match client.get(format!("{}/", self.base_url)).send().await {
                Ok(response) if response.status().is_success() => return,
                _ => {
                    tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
                }
            }
        }
    }

    /// WebSocket URL of a route, e.g. `/api/worker/events`.
    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}
