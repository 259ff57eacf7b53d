use super::RequestsLoggingLevel;
use crate::config::DEFAULT_UPLOAD_MAX_BYTES;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// HS256 secret of Shopify session tokens.
    pub shopify_api_secret: String,
    pub admin_jwt_secret: Option<String>,
    /// When unset the worker routes are not mounted.
    pub worker_token: Option<String>,
    pub upload_max_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 8000,
            shopify_api_secret: String::new(),
            admin_jwt_secret: None,
            worker_token: None,
            upload_max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("requests_logging_level", &self.requests_logging_level)
            .field("port", &self.port)
            .field("admin_routes", &self.admin_jwt_secret.is_some())
            .field("worker_routes", &self.worker_token.is_some())
            .field("upload_max_bytes", &self.upload_max_bytes)
            .finish()
    }
}
