//! Wires the store, file storage, cache facade, migrator and admin path from
//! a loaded `Config`.
use anyhow::{Context, Result};
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;

use crate::admin::BannerAdmin;
use crate::cache::TtlCache;
use crate::config::Config;
use crate::db::{BannerStore, Pool, SqliteBannerStore};
use crate::home::BannerCache;
use crate::invalidation::{NoopInvalidator, TagInvalidator, WebhookInvalidator};
use crate::migration::ImageMigrator;
use crate::storage::{FileStorage, LocalFileStorage};

pub struct BannerServices {
    pub store: Arc<dyn BannerStore>,
    pub files: Arc<dyn FileStorage>,
    pub cache: Arc<BannerCache>,
    pub migrator: ImageMigrator,
    pub admin: BannerAdmin,
}

impl BannerServices {
    pub fn from_config(cfg: &Config, pool: Pool) -> Result<Self> {
        let invalidator: Arc<dyn TagInvalidator> = match &cfg.revalidate.webhook_url {
            Some(url) => {
                let url = Url::parse(url).context("invalid revalidate.webhook_url")?;
                Arc::new(
                    WebhookInvalidator::new(url, cfg.revalidate.token.clone())
                        .context("failed to build revalidation client")?,
                )
            }
            None => Arc::new(NoopInvalidator),
        };
        let store: Arc<dyn BannerStore> = Arc::new(SqliteBannerStore::new(pool));
        let files: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new(
            &cfg.storage.upload_dir,
            &cfg.storage.public_prefix,
        ));
        Ok(Self::assemble(cfg, store, files, invalidator))
    }

    /// Build from already-constructed collaborators.
    pub fn assemble(
        cfg: &Config,
        store: Arc<dyn BannerStore>,
        files: Arc<dyn FileStorage>,
        invalidator: Arc<dyn TagInvalidator>,
    ) -> Self {
        let cache = Arc::new(
            BannerCache::new(store.clone())
                .with_cache(
                    TtlCache::new().with_default_ttl(Duration::from_secs(cfg.cache.ttl_seconds)),
                )
                .with_active_limit(cfg.cache.active_limit)
                .with_invalidator(invalidator)
                .with_tag(cfg.revalidate.tag.clone()),
        );
        let migrator = ImageMigrator::new(store.clone(), files.clone(), cache.clone())
            .with_assumed_average_file_bytes(cfg.migration.assumed_average_file_bytes);
        let admin = BannerAdmin::new(
            store.clone(),
            files.clone(),
            cache.clone(),
            cfg.banners.delete_files,
        );
        Self {
            store,
            files,
            cache,
            migrator,
            admin,
        }
    }
}
