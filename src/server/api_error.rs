//! JSON error rendering shared by every route.

use crate::error::ServiceError;
use crate::server::metrics;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// `{"error": message, "code": code}` with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn internal(cause: &anyhow::Error) -> Self {
        error!("Request failed: {:#}", cause);
        metrics::record_error("dependency_failure", "api");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "dependency_failure",
            "Internal server error",
        )
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        let code = err.code();
        match err {
            ServiceError::Validation { message, .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, code, message)
            }
            ServiceError::NotFound(kind) => {
                ApiError::new(StatusCode::NOT_FOUND, code, format!("{} not found", kind))
            }
            ServiceError::InvalidState(message) => {
                ApiError::new(StatusCode::CONFLICT, code, message)
            }
            ServiceError::Dependency(cause) => ApiError::internal(&cause),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(&err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"error": self.message, "code": self.code})),
        )
            .into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json` whose rejections render like every other API error.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// `Query` whose rejections render like every other API error.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "invalid_request", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("invalid_request", rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationCode;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 4096)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_service_errors_map_to_statuses() {
        let response =
            ServiceError::validation(ValidationCode::MissingFileKey, "file_key is required")
                .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "file_key is required");
        assert_eq!(body["code"], "missing_file_key");

        let response = ServiceError::NotFound("Job").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Job not found");

        let response =
            ServiceError::InvalidState("Cannot cancel completed or failed job".to_string())
                .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "invalid_state");
    }

    #[tokio::test]
    async fn test_dependency_failures_hide_the_cause() {
        let response =
            ServiceError::Dependency(anyhow::anyhow!("database is locked")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["code"], "dependency_failure");
    }
}
