//! Configuration loader and validator for the banner service.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::admin::DeleteFilePolicy;
use crate::cache::DEFAULT_TTL_SECS;
use crate::home::{DEFAULT_ACTIVE_LIMIT, DEFAULT_BANNER_TAG};
use crate::migration::DEFAULT_ASSUMED_AVERAGE_FILE_BYTES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    #[serde(default)]
    pub cache: CacheSettings,
    pub storage: Storage,
    #[serde(default)]
    pub migration: Migration,
    #[serde(default)]
    pub banners: Banners,
    #[serde(default)]
    pub revalidate: Revalidate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Overrides `sqlite://<data_dir>/nanbakadai.db`.
    #[serde(default)]
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheSettings {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_active_limit")]
    pub active_limit: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            active_limit: default_active_limit(),
        }
    }
}

/// Where extracted images land and how the web tier serves them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Storage {
    pub upload_dir: String,
    pub public_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Migration {
    #[serde(default = "default_assumed_average_file_bytes")]
    pub assumed_average_file_bytes: u64,
}

impl Default for Migration {
    fn default() -> Self {
        Self {
            assumed_average_file_bytes: default_assumed_average_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Banners {
    #[serde(default)]
    pub delete_files: DeleteFilePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Revalidate {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_tag")]
    pub tag: String,
}

impl Default for Revalidate {
    fn default() -> Self {
        Self {
            webhook_url: None,
            token: None,
            tag: default_tag(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_active_limit() -> i64 {
    DEFAULT_ACTIVE_LIMIT
}

fn default_assumed_average_file_bytes() -> u64 {
    DEFAULT_ASSUMED_AVERAGE_FILE_BYTES
}

fn default_tag() -> String {
    DEFAULT_BANNER_TAG.to_string()
}

impl Config {
    /// Ensure required directories exist (`app.data_dir` and `storage.upload_dir`).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [&self.app.data_dir, &self.storage.upload_dir] {
            if !dir.trim().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        self.app.database_url.clone().unwrap_or_else(|| {
            format!(
                "sqlite://{}/nanbakadai.db",
                self.app.data_dir.trim_end_matches('/')
            )
        })
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if let Some(url) = &cfg.app.database_url {
        if url.trim().is_empty() {
            return Err(ConfigError::Invalid("app.database_url must be non-empty when set"));
        }
    }

    if cfg.cache.ttl_seconds == 0 {
        return Err(ConfigError::Invalid("cache.ttl_seconds must be > 0"));
    }
    if cfg.cache.active_limit <= 0 {
        return Err(ConfigError::Invalid("cache.active_limit must be > 0"));
    }

    if cfg.storage.upload_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("storage.upload_dir must be non-empty"));
    }
    if !cfg.storage.public_prefix.starts_with('/') {
        return Err(ConfigError::Invalid("storage.public_prefix must start with '/'"));
    }

    if let Some(url) = &cfg.revalidate.webhook_url {
        match Url::parse(url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "revalidate.webhook_url must be an http(s) URL",
                ))
            }
        }
    }
    if cfg.revalidate.tag.trim().is_empty() {
        return Err(ConfigError::Invalid("revalidate.tag must be non-empty"));
    }

    Ok(())
}

/// Example configuration with every section spelled out.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

cache:
  ttl_seconds: 300
  active_limit: 3

storage:
  upload_dir: "./public/uploads/banners"
  public_prefix: "/uploads/banners"

migration:
  assumed_average_file_bytes: 100

banners:
  delete_files: retain

revalidate:
  webhook_url: "https://nanbakadai.example.com/api/revalidate"
  token: "YOUR_REVALIDATE_TOKEN"
  tag: "banners"
"#
}
