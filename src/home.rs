//! Cached read paths for the home page banners.
//!
//! Every view (active list, hero, by-position) is derived from the single
//! `active-banners` entry, so they are refreshed and invalidated together.
//! When the store fails on a miss, the last list that was successfully loaded
//! is served even if it has expired.
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::cache::TtlCache;
use crate::db::BannerStore;
use crate::invalidation::{NoopInvalidator, TagInvalidator};
use crate::model::HomeBanner;

pub const ACTIVE_BANNERS_KEY: &str = "active-banners";
pub const DEFAULT_BANNER_TAG: &str = "banners";
pub const DEFAULT_ACTIVE_LIMIT: i64 = 3;

type BannerList = Arc<Vec<HomeBanner>>;

pub struct BannerCache {
    store: Arc<dyn BannerStore>,
    cache: TtlCache<BannerList>,
    last_good: RwLock<Option<BannerList>>,
    invalidator: Arc<dyn TagInvalidator>,
    active_limit: i64,
    tag: String,
}

impl BannerCache {
    pub fn new(store: Arc<dyn BannerStore>) -> Self {
        Self {
            store,
            cache: TtlCache::new(),
            last_good: RwLock::new(None),
            invalidator: Arc::new(NoopInvalidator),
            active_limit: DEFAULT_ACTIVE_LIMIT,
            tag: DEFAULT_BANNER_TAG.to_string(),
        }
    }

    pub fn with_cache(mut self, cache: TtlCache<BannerList>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_invalidator(mut self, invalidator: Arc<dyn TagInvalidator>) -> Self {
        self.invalidator = invalidator;
        self
    }

    pub fn with_active_limit(mut self, limit: i64) -> Self {
        self.active_limit = limit;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    #[instrument(skip_all)]
    pub async fn get_active_banners(&self) -> Vec<HomeBanner> {
        if let Some(hit) = self.cache.get(ACTIVE_BANNERS_KEY) {
            return hit.to_vec();
        }

        match self.store.list_active(self.active_limit).await {
            Ok(banners) => {
                let list: BannerList = Arc::new(banners.iter().map(HomeBanner::from).collect());
                self.cache.set_default(ACTIVE_BANNERS_KEY, list.clone());
                *self.last_good.write() = Some(list.clone());
                debug!(count = list.len(), "loaded active banners");
                list.to_vec()
            }
            Err(err) => {
                let fallback = self.last_good.read().clone();
                warn!(
                    ?err,
                    stale = fallback.is_some(),
                    "failed to load active banners; serving fallback"
                );
                fallback.map(|l| l.to_vec()).unwrap_or_default()
            }
        }
    }

    pub async fn get_hero_banner(&self) -> Option<HomeBanner> {
        self.get_active_banners().await.into_iter().next()
    }

    pub async fn get_banners_by_position(&self, position: i64) -> Vec<HomeBanner> {
        self.get_active_banners()
            .await
            .into_iter()
            .filter(|b| b.position == position)
            .collect()
    }

    /// Drop the local entry and ask the shared cache to drop the tag.
    /// The last-known-good list is kept for the stale-on-error fallback.
    #[instrument(skip_all)]
    pub async fn invalidate(&self) {
        self.cache.delete(ACTIVE_BANNERS_KEY);
        self.invalidator.invalidate_tag(&self.tag).await;
        debug!(tag = %self.tag, "banner cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::db::{self, SqliteBannerStore};
    use crate::model::NewBanner;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;

    async fn setup_store() -> Arc<SqliteBannerStore> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::run_migrations(&pool).await.unwrap();
        Arc::new(SqliteBannerStore::new(pool))
    }

    fn banner(title: &str, position: i64) -> NewBanner {
        NewBanner {
            title: title.into(),
            image: format!("/uploads/banners/{}.png", position),
            url: None,
            position,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn hero_is_lowest_position() {
        let store = setup_store().await;
        store.create(&banner("B2", 2)).await.unwrap();
        store.create(&banner("B1", 1)).await.unwrap();
        store.create(&banner("B3", 3)).await.unwrap();

        let facade = BannerCache::new(store);
        let hero = facade.get_hero_banner().await.unwrap();
        assert_eq!(hero.title, "B1");
    }

    #[tokio::test]
    async fn only_active_limit_is_served() {
        let store = setup_store().await;
        for i in 1..=5 {
            store.create(&banner(&format!("Banner {}", i), i)).await.unwrap();
        }
        let facade = BannerCache::new(store);
        assert_eq!(facade.get_active_banners().await.len(), 3);
    }

    #[tokio::test]
    async fn writes_are_visible_after_invalidate_or_expiry() {
        let store = setup_store().await;
        let clock = Arc::new(ManualClock::default());
        let facade = BannerCache::new(store.clone())
            .with_cache(TtlCache::with_clock(clock.clone()).with_default_ttl(Duration::from_secs(60)));

        assert!(facade.get_active_banners().await.is_empty());
        store.create(&banner("Fresh", 1)).await.unwrap();
        // Still cached.
        assert!(facade.get_active_banners().await.is_empty());

        clock.advance(Duration::from_secs(61));
        assert_eq!(facade.get_active_banners().await.len(), 1);

        store.create(&banner("Fresher", 0)).await.unwrap();
        facade.invalidate().await;
        assert_eq!(facade.get_hero_banner().await.unwrap().title, "Fresher");
    }

    #[tokio::test]
    async fn empty_store_has_no_hero() {
        let store = setup_store().await;
        let facade = BannerCache::new(store);
        assert!(facade.get_hero_banner().await.is_none());
        assert!(facade.get_banners_by_position(1).await.is_empty());
    }
}
