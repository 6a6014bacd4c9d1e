//! Admin write path: validate, write through the store, then revalidate the
//! banner cache. Deleting a file-backed banner follows `DeleteFilePolicy`.
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::BannerStore;
use crate::error::Result;
use crate::home::BannerCache;
use crate::model::{Banner, BannerFilter, BannerImage, BannerUpdate, NewBanner, Page};
use crate::storage::FileStorage;

/// What happens to a banner's image file when the banner is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteFilePolicy {
    /// Keep the file on disk.
    #[default]
    Retain,
    /// Remove the file; failures are logged and do not undo the delete.
    Remove,
}

pub struct BannerAdmin {
    store: Arc<dyn BannerStore>,
    files: Arc<dyn FileStorage>,
    cache: Arc<BannerCache>,
    delete_policy: DeleteFilePolicy,
}

impl BannerAdmin {
    pub fn new(
        store: Arc<dyn BannerStore>,
        files: Arc<dyn FileStorage>,
        cache: Arc<BannerCache>,
        delete_policy: DeleteFilePolicy,
    ) -> Self {
        Self {
            store,
            files,
            cache,
            delete_policy,
        }
    }

    pub async fn list(&self, page: i64, limit: i64, filter: BannerFilter) -> Result<Page<Banner>> {
        self.store.list_paginated(page, limit, filter).await
    }

    #[instrument(skip_all)]
    pub async fn create(&self, data: NewBanner) -> Result<Banner> {
        let data = data.normalized();
        data.validate()?;
        let banner = self.store.create(&data).await?;
        info!(id = %banner.id, "banner created");
        self.revalidate_banner_cache().await;
        Ok(banner)
    }

    #[instrument(skip(self, data))]
    pub async fn update(&self, id: &str, data: BannerUpdate) -> Result<Banner> {
        let data = data.normalized();
        data.validate()?;
        let banner = self.store.update(id, &data).await?;
        self.revalidate_banner_cache().await;
        Ok(banner)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<Banner> {
        let banner = self.store.delete(id).await?;
        if let (DeleteFilePolicy::Remove, BannerImage::File(path)) =
            (self.delete_policy, &banner.image)
        {
            match self.files.delete(path).await {
                Ok(true) => info!(%path, "removed banner image file"),
                Ok(false) => {}
                Err(err) => warn!(%path, %err, "failed to remove banner image file"),
            }
        }
        self.revalidate_banner_cache().await;
        Ok(banner)
    }

    /// Must run after every banner mutation.
    pub async fn revalidate_banner_cache(&self) {
        self.cache.invalidate().await;
    }
}
