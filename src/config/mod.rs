mod file_config;

pub use file_config::{AuthConfig, FileConfig, SchedulerConfig, UploadsConfig};

use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_EVALUATION_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LEASE_TTL_SECS: u64 = 300;
pub const DEFAULT_UPLOAD_MAX_BYTES: usize = 50 * 1024 * 1024;

/// Command line values, the lowest-priority layer of the configuration.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub shopify_api_secret: Option<String>,
    pub admin_jwt_secret: Option<String>,
    pub worker_token: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub evaluation_interval_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub auth: AuthSettings,
    pub scheduler: SchedulerSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub shopify_api_secret: String,
    /// Admin routes reject every request when unset.
    pub admin_jwt_secret: Option<String>,
    /// Worker routes are not mounted when unset.
    pub worker_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub evaluation_interval_secs: u64,
    pub lease_ttl_secs: u64,
}

impl SchedulerSettings {
    pub fn evaluation_interval(&self) -> Duration {
        Duration::from_secs(self.evaluation_interval_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluation_interval_secs: DEFAULT_EVALUATION_INTERVAL_SECS,
            lease_ttl_secs: DEFAULT_LEASE_TTL_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

impl AppConfig {
    /// Layers the TOML file over the command line; built-in defaults fill
    /// whatever neither sets.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());

        let auth_file = file.auth.unwrap_or_default();
        let shopify_api_secret = auth_file
            .shopify_api_secret
            .or_else(|| cli.shopify_api_secret.clone())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "shopify_api_secret must be specified via --shopify-api-secret or in config file"
                )
            })?;
        let auth = AuthSettings {
            shopify_api_secret,
            admin_jwt_secret: auth_file
                .admin_jwt_secret
                .or_else(|| cli.admin_jwt_secret.clone())
                .filter(|s| !s.is_empty()),
            worker_token: auth_file
                .worker_token
                .or_else(|| cli.worker_token.clone())
                .filter(|s| !s.is_empty()),
        };

        let scheduler_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerSettings {
            enabled: scheduler_file.enabled.unwrap_or(true),
            evaluation_interval_secs: scheduler_file
                .evaluation_interval_secs
                .unwrap_or(cli.evaluation_interval_secs)
                .max(1),
            lease_ttl_secs: scheduler_file
                .lease_ttl_secs
                .unwrap_or(DEFAULT_LEASE_TTL_SECS),
        };

        let uploads_file = file.uploads.unwrap_or_default();
        let uploads = UploadSettings {
            dir: uploads_file
                .dir
                .map(PathBuf::from)
                .or_else(|| cli.upload_dir.clone())
                .unwrap_or_else(|| db_dir.join("uploads")),
            max_bytes: uploads_file.max_bytes.unwrap_or(DEFAULT_UPLOAD_MAX_BYTES),
        };

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            auth,
            scheduler,
            uploads,
        })
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }

    pub fn schedules_db_path(&self) -> PathBuf {
        self.db_dir.join("schedules.db")
    }

    pub fn queue_db_path(&self) -> PathBuf {
        self.db_dir.join("queue.db")
    }

    pub fn tenants_db_path(&self) -> PathBuf {
        self.db_dir.join("tenants.db")
    }
}

fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cli_for(dir: &TempDir) -> CliConfig {
        CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            port: 8000,
            metrics_port: 9091,
            shopify_api_secret: Some("cli-secret".to_string()),
            evaluation_interval_secs: DEFAULT_EVALUATION_INTERVAL_SECS,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_logging_level() {
        assert!(matches!(
            parse_logging_level("none"),
            Some(RequestsLoggingLevel::None)
        ));
        assert!(matches!(
            parse_logging_level("BODY"),
            Some(RequestsLoggingLevel::Body)
        ));
        assert!(parse_logging_level("verbose").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            logging_level: RequestsLoggingLevel::Headers,
            worker_token: Some("worker".to_string()),
            ..cli_for(&temp_dir)
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 8000);
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Headers);
        assert_eq!(config.auth.shopify_api_secret, "cli-secret");
        assert_eq!(config.auth.admin_jwt_secret, None);
        assert_eq!(config.auth.worker_token.as_deref(), Some("worker"));
        assert!(config.scheduler.enabled);
        assert_eq!(config.scheduler.evaluation_interval_secs, 60);
        assert_eq!(config.scheduler.lease_ttl_secs, DEFAULT_LEASE_TTL_SECS);
        assert_eq!(config.uploads.dir, temp_dir.path().join("uploads"));
        assert_eq!(config.uploads.max_bytes, DEFAULT_UPLOAD_MAX_BYTES);
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(PathBuf::from("/should/be/overridden")),
            admin_jwt_secret: Some("cli-admin".to_string()),
            ..cli_for(&temp_dir)
        };

        let file_config = FileConfig {
            db_dir: Some(temp_dir.path().to_string_lossy().to_string()),
            port: Some(4000),
            logging_level: Some("body".to_string()),
            auth: Some(AuthConfig {
                shopify_api_secret: Some("toml-secret".to_string()),
                ..Default::default()
            }),
            scheduler: Some(SchedulerConfig {
                enabled: Some(false),
                evaluation_interval_secs: Some(5),
                lease_ttl_secs: Some(30),
            }),
            uploads: Some(UploadsConfig {
                dir: Some("/srv/uploads".to_string()),
                max_bytes: Some(1024),
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.port, 4000);
        assert_eq!(config.logging_level, RequestsLoggingLevel::Body);
        assert_eq!(config.auth.shopify_api_secret, "toml-secret");
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.auth.admin_jwt_secret.as_deref(), Some("cli-admin"));
        assert!(!config.scheduler.enabled);
        assert_eq!(config.scheduler.evaluation_interval(), Duration::from_secs(5));
        assert_eq!(config.scheduler.lease_ttl(), Duration::from_secs(30));
        assert_eq!(config.uploads.dir, PathBuf::from("/srv/uploads"));
        assert_eq!(config.uploads.max_bytes, 1024);
    }

    #[test]
    fn test_resolve_rejects_unusable_db_dir() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cases = [
            (None, "db_dir must be specified"),
            (Some(PathBuf::from("/no/such/bulk-manager/dir")), "does not exist"),
            (Some(temp_file.path().to_path_buf()), "not a directory"),
        ];
        for (db_dir, expected) in cases {
            let cli = CliConfig {
                db_dir,
                shopify_api_secret: Some("cli-secret".to_string()),
                ..Default::default()
            };
            let err = AppConfig::resolve(&cli, None).unwrap_err().to_string();
            assert!(err.contains(expected), "{}", err);
        }
    }

    #[test]
    fn test_resolve_requires_shopify_secret() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            shopify_api_secret: Some(String::new()),
            ..cli_for(&temp_dir)
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("shopify_api_secret must be specified"));
    }

    #[test]
    fn test_zero_interval_is_raised_to_one_second() {
        let temp_dir = TempDir::new().unwrap();
        let cli = CliConfig {
            evaluation_interval_secs: 0,
            ..cli_for(&temp_dir)
        };
        let config = AppConfig::resolve(&cli, None).unwrap();
        assert_eq!(config.scheduler.evaluation_interval_secs, 1);
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::resolve(&cli_for(&temp_dir), None).unwrap();

        assert_eq!(config.jobs_db_path(), temp_dir.path().join("jobs.db"));
        assert_eq!(config.schedules_db_path(), temp_dir.path().join("schedules.db"));
        assert_eq!(config.queue_db_path(), temp_dir.path().join("queue.db"));
        assert_eq!(config.tenants_db_path(), temp_dir.path().join("tenants.db"));
    }
}
