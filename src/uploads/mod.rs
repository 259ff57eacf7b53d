//! Local storage for import source files.
//!
//! Uploaded files are addressed by an opaque key of the form
//! `imports/{shop}/{uuid}.{ext}` relative to the upload directory.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

const FALLBACK_EXTENSION: &str = "dat";

pub struct UploadStore {
    dir: PathBuf,
}

fn is_valid_shop(shop: &str) -> bool {
    !shop.is_empty()
        && !shop.starts_with('.')
        && shop
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

fn extension_of(filename: Option<&str>) -> String {
    filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

impl UploadStore {
    /// Use `dir` as the upload root, creating it if needed.
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create upload directory {:?}", dir))?;
        Ok(UploadStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` for `shop` and return the file key.
    pub async fn save(&self, shop: &str, filename: Option<&str>, bytes: &[u8]) -> Result<String> {
        if !is_valid_shop(shop) {
            bail!("Refusing to store upload for invalid shop '{}'", shop);
        }
        let key = format!(
            "imports/{}/{}.{}",
            shop,
            uuid::Uuid::new_v4(),
            extension_of(filename)
        );
        let path = self.dir.join(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload {}", key))?;
        debug!("Stored {} bytes as {}", bytes.len(), key);
        Ok(key)
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Write and remove a scratch file to prove the directory is writable.
    pub async fn check_writable(&self) -> Result<()> {
        let path = self.dir.join(format!(".write-check-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"ok")
            .await
            .with_context(|| format!("Upload directory {:?} is not writable", self.dir))?;
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
