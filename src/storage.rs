//! External file storage for banner images.
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

use crate::error::{BannerError, Result};

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Persist `bytes` under `suggested_name` and return the public relative path.
    async fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String>;

    /// Remove a file previously returned by `write`. `Ok(false)` when the path
    /// is not managed by this storage or is already gone.
    async fn delete(&self, path: &str) -> Result<bool>;
}

/// Files on local disk, served by the web tier under `public_prefix`.
#[derive(Debug, Clone)]
pub struct LocalFileStorage {
    root: PathBuf,
    public_prefix: String,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_storage_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn public_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.public_prefix, file_name)
    }

    /// Map a public path back to a file under `root`. Anything outside the
    /// prefix or escaping the root yields `None`.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let rest = public_path
            .strip_prefix(&self.public_prefix)?
            .strip_prefix('/')?;
        let rel = Path::new(rest);
        if rest.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            return None;
        }
        Some(self.root.join(rel))
    }
}

fn sanitize_file_name(name: &str) -> Option<String> {
    let name = Path::new(name).file_name()?.to_str()?;
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

#[async_trait]
impl FileStorage for LocalFileStorage {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        let file_name = sanitize_file_name(suggested_name).ok_or_else(|| {
            BannerError::FileWrite(format!("invalid file name: {}", suggested_name))
        })?;
        self.ensure_storage_dir().await.map_err(|e| {
            BannerError::FileWrite(format!(
                "failed to create storage dir {}: {}",
                self.root.display(),
                e
            ))
        })?;

        let target = self.root.join(&file_name);
        fs::write(&target, bytes).await.map_err(|e| {
            BannerError::FileWrite(format!("failed to write {}: {}", target.display(), e))
        })?;
        debug!(path = %target.display(), "stored banner image");
        Ok(self.public_path(&file_name))
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str) -> Result<bool> {
        let Some(full) = self.resolve(path) else {
            return Ok(false);
        };
        match fs::remove_file(&full).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BannerError::FileWrite(format!(
                "failed to remove {}: {}",
                full.display(),
                e
            ))),
        }
    }
}
