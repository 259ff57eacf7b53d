//! HTTP client for end-to-end tests
//!
//! Wraps reqwest with the bearer token of a tenant, an admin or a worker
//! and provides methods for the server endpoints.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Response;
use serde_json::{json, Value};
use std::time::Duration;

fn sign(claims: Value, secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign test token")
}

fn in_one_hour() -> i64 {
    chrono::Utc::now().timestamp() + 3600
}

/// Shopify session token for `shop`.
pub fn session_token(shop: &str) -> String {
    sign(
        json!({
            "iss": format!("https://{}/admin", shop),
            "dest": format!("https://{}", shop),
            "aud": "test-api-key",
            "sub": "42",
            "exp": in_one_hour(),
        }),
        SHOPIFY_API_SECRET,
    )
}

/// Operator portal token; `token_type` is the `type` claim.
pub fn admin_token(token_type: &str) -> String {
    sign(
        json!({"sub": "ops@example.com", "type": token_type, "exp": in_one_hour()}),
        ADMIN_JWT_SECRET,
    )
}

pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    token: Option<String>,
}

impl TestClient {
    /// Creates a client that sends no credentials
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
        }
    }

    pub fn with_token(base_url: String, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Self::new(base_url)
        }
    }

    /// Creates a client acting for `shop`
    pub fn for_shop(base_url: String, shop: &str) -> Self {
        Self::with_token(base_url, session_token(shop))
    }

    pub fn admin(base_url: String) -> Self {
        Self::with_token(base_url, admin_token("admin"))
    }

    pub fn worker(base_url: String) -> Self {
        Self::with_token(base_url, WORKER_TOKEN)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str) -> Response {
        self.request(reqwest::Method::GET, path)
            .send()
            .await
            .expect("GET request failed")
    }

    pub async fn post(&self, path: &str, body: Value) -> Response {
        self.request(reqwest::Method::POST, path)
            .json(&body)
            .send()
            .await
            .expect("POST request failed")
    }

    pub async fn put(&self, path: &str, body: Value) -> Response {
        self.request(reqwest::Method::PUT, path)
            .json(&body)
            .send()
            .await
            .expect("PUT request failed")
    }

    pub async fn delete(&self, path: &str) -> Response {
        self.request(reqwest::Method::DELETE, path)
            .send()
            .await
            .expect("DELETE request failed")
    }

    // ========================================================================
    // Tenant Endpoints
    // ========================================================================

    pub async fn home(&self) -> Response {
        self.get("/").await
    }

    pub async fn health(&self) -> Response {
        self.get("/api/health").await
    }

    pub async fn list_entities(&self) -> Response {
        self.get("/api/entities").await
    }

    pub async fn export_entity(&self, entity: &str, body: Value) -> Response {
        self.post(&format!("/api/entities/{}/export", entity), body)
            .await
    }

    pub async fn import_entity(&self, entity: &str, body: Value) -> Response {
        self.post(&format!("/api/entities/{}/import", entity), body)
            .await
    }

    pub async fn entity_template(&self, entity: &str, format: &str) -> Response {
        self.get(&format!("/api/entities/{}/template?format={}", entity, format))
            .await
    }

    pub async fn backup(&self, body: Value) -> Response {
        self.post("/api/entities/backup/export", body).await
    }

    pub async fn create_job(&self, body: Value) -> Response {
        self.post("/api/jobs", body).await
    }

    pub async fn list_jobs(&self) -> Response {
        self.get("/api/jobs").await
    }

    pub async fn list_jobs_page(&self, page: usize, limit: usize) -> Response {
        self.get(&format!("/api/jobs?page={}&limit={}", page, limit))
            .await
    }

    pub async fn get_job(&self, id: &str) -> Response {
        self.get(&format!("/api/jobs/{}", id)).await
    }

    pub async fn cancel_job(&self, id: &str) -> Response {
        self.delete(&format!("/api/jobs/{}", id)).await
    }

    pub async fn download(&self, job_id: &str) -> Response {
        self.get(&format!("/api/export/download/{}", job_id)).await
    }

    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Response {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);
        self.request(reqwest::Method::POST, "/api/import/upload")
            .multipart(form)
            .send()
            .await
            .expect("Upload request failed")
    }

    pub async fn create_schedule(&self, body: Value) -> Response {
        self.post("/api/schedules", body).await
    }

    pub async fn list_schedules(&self) -> Response {
        self.get("/api/schedules").await
    }

    pub async fn get_schedule(&self, id: &str) -> Response {
        self.get(&format!("/api/schedules/{}", id)).await
    }

    pub async fn update_schedule(&self, id: &str, body: Value) -> Response {
        self.put(&format!("/api/schedules/{}", id), body).await
    }

    pub async fn delete_schedule(&self, id: &str) -> Response {
        self.delete(&format!("/api/schedules/{}", id)).await
    }

    // ========================================================================
    // Admin Endpoints
    // ========================================================================

    pub async fn admin_stats(&self) -> Response {
        self.get("/api/admin/stats").await
    }

    pub async fn admin_jobs(&self, query: &str) -> Response {
        self.get(&format!("/api/admin/jobs{}", query)).await
    }

    pub async fn run_scheduler(&self) -> Response {
        self.post("/api/admin/scheduler/run", json!({})).await
    }

    // ========================================================================
    // Worker Endpoints
    // ========================================================================

    pub async fn claim(&self) -> Response {
        self.post("/api/worker/jobs/claim", json!({})).await
    }

    pub async fn report_status(&self, job_id: &str, body: Value) -> Response {
        self.put(&format!("/api/worker/jobs/{}/status", job_id), body)
            .await
    }

    pub async fn report_progress(&self, job_id: &str, progress: i64, message: &str) -> Response {
        self.put(
            &format!("/api/worker/jobs/{}/progress", job_id),
            json!({"progress": progress, "message": message}),
        )
        .await
    }
}
