//! Moves inline (data URI) banner images out of the database into files.
//!
//! Each banner is handled on its own: a bad payload or a failed write is
//! recorded in the report and the row keeps its original image. The row is
//! only rewritten after its file has been written, and the file is removed
//! again if that rewrite fails. A second run finds nothing inline and is a
//! no-op.
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::db::BannerStore;
use crate::error::{BannerError, Result};
use crate::home::BannerCache;
use crate::model::{generate_file_name, Banner, BannerImage, InlineImage};
use crate::storage::FileStorage;

pub const DEFAULT_ASSUMED_AVERAGE_FILE_BYTES: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageCounts {
    pub base64_banners: u64,
    pub file_banners: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StorageEstimate {
    pub estimated_savings: u64,
    pub current_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationStatus {
    Migrated { path: String },
    Failed { reason: String },
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct BannerOutcome {
    pub id: String,
    pub title: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub before: StorageCounts,
    pub after: StorageCounts,
    pub estimate: StorageEstimate,
    pub outcomes: Vec<BannerOutcome>,
}

impl MigrationReport {
    fn count(&self, f: impl Fn(&MigrationStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| f(&o.status)).count()
    }

    pub fn migrated(&self) -> usize {
        self.count(|s| matches!(s, MigrationStatus::Migrated { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, MigrationStatus::Failed { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, MigrationStatus::Skipped))
    }

    pub fn outcome(&self, id: &str) -> Option<&MigrationStatus> {
        self.outcomes.iter().find(|o| o.id == id).map(|o| &o.status)
    }
}

pub struct ImageMigrator {
    store: Arc<dyn BannerStore>,
    files: Arc<dyn FileStorage>,
    cache: Arc<BannerCache>,
    assumed_average_file_bytes: u64,
    running: Mutex<()>,
}

impl ImageMigrator {
    pub fn new(
        store: Arc<dyn BannerStore>,
        files: Arc<dyn FileStorage>,
        cache: Arc<BannerCache>,
    ) -> Self {
        Self {
            store,
            files,
            cache,
            assumed_average_file_bytes: DEFAULT_ASSUMED_AVERAGE_FILE_BYTES,
            running: Mutex::new(()),
        }
    }

    pub fn with_assumed_average_file_bytes(mut self, bytes: u64) -> Self {
        self.assumed_average_file_bytes = bytes;
        self
    }

    /// Classify every banner by where its image lives.
    pub async fn check_database_size(&self) -> Result<StorageCounts> {
        let banners = self.store.list_all().await?;
        Ok(count_images(&banners))
    }

    /// Decoded size of every inline image and what moving them to files saves.
    pub async fn estimate_storage_savings(&self) -> Result<StorageEstimate> {
        let banners = self.store.list_all().await?;
        Ok(estimate(&banners, self.assumed_average_file_bytes))
    }

    #[instrument(skip_all)]
    pub async fn migrate(&self) -> Result<MigrationReport> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| BannerError::MigrationInProgress)?;

        let banners = self.store.list_all().await?;
        let before = count_images(&banners);
        let estimate = estimate(&banners, self.assumed_average_file_bytes);
        info!(
            inline = before.base64_banners,
            files = before.file_banners,
            "starting banner image migration"
        );

        let mut outcomes = Vec::with_capacity(banners.len());
        for banner in &banners {
            let status = match &banner.image {
                BannerImage::File(_) => MigrationStatus::Skipped,
                BannerImage::Inline(img) => match self.migrate_one(banner, img).await {
                    Ok(path) => {
                        info!(id = %banner.id, %path, "migrated banner image");
                        MigrationStatus::Migrated { path }
                    }
                    Err(err) => {
                        warn!(id = %banner.id, %err, "banner image migration failed");
                        MigrationStatus::Failed {
                            reason: err.to_string(),
                        }
                    }
                },
            };
            outcomes.push(BannerOutcome {
                id: banner.id.clone(),
                title: banner.title.clone(),
                status,
            });
        }

        self.cache.invalidate().await;

        let migrated = outcomes
            .iter()
            .filter(|o| matches!(o.status, MigrationStatus::Migrated { .. }))
            .count() as u64;
        let after = match self.check_database_size().await {
            Ok(counts) => counts,
            Err(err) => {
                // The rows are already rewritten; report what we know instead.
                warn!(%err, "failed to recount banners after migration");
                StorageCounts {
                    base64_banners: before.base64_banners - migrated,
                    file_banners: before.file_banners + migrated,
                }
            }
        };
        let report = MigrationReport {
            before,
            after,
            estimate,
            outcomes,
        };
        info!(
            migrated = report.migrated(),
            failed = report.failed(),
            skipped = report.skipped(),
            "banner image migration finished"
        );
        Ok(report)
    }

    async fn migrate_one(&self, banner: &Banner, img: &InlineImage) -> Result<String> {
        let bytes = img.decode()?;
        let name = generate_file_name(&img.extension());
        let path = self.files.write(&bytes, &name).await?;

        let expected = banner.image.to_db_value();
        if let Err(err) = self.store.set_image(&banner.id, &expected, &path).await {
            if let Err(cleanup) = self.files.delete(&path).await {
                warn!(%path, %cleanup, "failed to remove orphaned banner image");
            }
            return Err(err);
        }
        Ok(path)
    }
}

pub fn count_images(banners: &[Banner]) -> StorageCounts {
    let inline = banners.iter().filter(|b| b.image.is_inline()).count() as u64;
    StorageCounts {
        base64_banners: inline,
        file_banners: banners.len() as u64 - inline,
    }
}

pub fn estimate(banners: &[Banner], assumed_average_file_bytes: u64) -> StorageEstimate {
    let (count, current_size) = banners
        .iter()
        .filter_map(|b| match &b.image {
            BannerImage::Inline(img) => Some(img.decoded_len()),
            BannerImage::File(_) => None,
        })
        .fold((0u64, 0u64), |(n, total), len| (n + 1, total + len));
    StorageEstimate {
        estimated_savings: current_size.saturating_sub(count * assumed_average_file_bytes),
        current_size,
    }
}
