mod admin_routes;
pub mod api_error;
pub mod config;
mod entity_routes;
mod export_routes;
pub mod health;
mod http_layers;
mod import_routes;
mod job_routes;
pub mod metrics;
mod schedule_routes;
pub mod server;
pub(self) mod session;
pub mod state;
mod store_routes;
mod webhook_routes;
mod worker_routes;

pub use config::ServerConfig;
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use session::{shop_from_session_token, ADMIN_TOKEN_TYPE};
pub use state::{ServerComponents, ServerState};
pub use webhook_routes::{sign_webhook, verify_webhook};
