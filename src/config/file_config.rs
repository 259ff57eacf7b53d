use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    pub auth: Option<AuthConfig>,
    pub scheduler: Option<SchedulerConfig>,
    pub uploads: Option<UploadsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret Shopify signs embedded-app session tokens with.
    pub shopify_api_secret: Option<String>,
    pub admin_jwt_secret: Option<String>,
    /// Bearer token accepted on the worker feedback routes.
    pub worker_token: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: Option<bool>,
    pub evaluation_interval_secs: Option<u64>,
    pub lease_ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploadsConfig {
    pub dir: Option<String>,
    pub max_bytes: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
