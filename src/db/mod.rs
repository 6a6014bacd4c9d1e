//! Database module: row models, SQL repositories and the `BannerStore` seam.
//!
//! - `model`: rows as they come out of SQLite.
//! - `repo`: SQL-only functions that map rows into domain banners.
//!
//! Higher layers depend on the `BannerStore` trait so they can run against a
//! fake in tests.

pub mod model;
pub mod repo;

pub use repo::*;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Banner, BannerFilter, BannerUpdate, NewBanner, Page};

#[async_trait]
pub trait BannerStore: Send + Sync {
    async fn list_active(&self, limit: i64) -> Result<Vec<Banner>>;

    async fn list_paginated(
        &self,
        page: i64,
        limit: i64,
        filter: BannerFilter,
    ) -> Result<Page<Banner>>;

    async fn list_all(&self) -> Result<Vec<Banner>>;

    async fn get(&self, id: &str) -> Result<Banner>;

    async fn create(&self, data: &NewBanner) -> Result<Banner>;

    async fn update(&self, id: &str, data: &BannerUpdate) -> Result<Banner>;

    async fn delete(&self, id: &str) -> Result<Banner>;

    /// Swap the image column from `expected` to `image`; `Conflict` when the
    /// row no longer holds `expected`.
    async fn set_image(&self, id: &str, expected: &str, image: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteBannerStore {
    pool: Pool,
}

impl SqliteBannerStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BannerStore for SqliteBannerStore {
    async fn list_active(&self, limit: i64) -> Result<Vec<Banner>> {
        repo::list_active(&self.pool, limit).await
    }

    async fn list_paginated(
        &self,
        page: i64,
        limit: i64,
        filter: BannerFilter,
    ) -> Result<Page<Banner>> {
        repo::list_paginated(&self.pool, page, limit, filter).await
    }

    async fn list_all(&self) -> Result<Vec<Banner>> {
        repo::list_all(&self.pool).await
    }

    async fn get(&self, id: &str) -> Result<Banner> {
        repo::get_banner(&self.pool, id).await
    }

    async fn create(&self, data: &NewBanner) -> Result<Banner> {
        repo::create_banner(&self.pool, data).await
    }

    async fn update(&self, id: &str, data: &BannerUpdate) -> Result<Banner> {
        repo::update_banner(&self.pool, id, data).await
    }

    async fn delete(&self, id: &str) -> Result<Banner> {
        repo::delete_banner(&self.pool, id).await
    }

    async fn set_image(&self, id: &str, expected: &str, image: &str) -> Result<()> {
        repo::set_banner_image(&self.pool, id, expected, image).await
    }
}
