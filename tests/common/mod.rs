#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

use nanbakadai_banners::db::{self, BannerStore, SqliteBannerStore};
use nanbakadai_banners::error::{BannerError, Result};
use nanbakadai_banners::invalidation::TagInvalidator;
use nanbakadai_banners::model::{Banner, BannerFilter, BannerUpdate, NewBanner, Page};
use nanbakadai_banners::storage::FileStorage;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::run_migrations(&pool).await.unwrap();
    pool
}

pub fn file_banner(title: &str, position: i64) -> NewBanner {
    NewBanner {
        title: title.into(),
        image: format!("/uploads/banners/{}.png", position),
        url: None,
        position,
        is_active: true,
    }
}

pub fn inline_banner(title: &str, position: i64, payload: &str) -> NewBanner {
    NewBanner {
        title: title.into(),
        image: format!("data:image/png;base64,{}", payload),
        url: None,
        position,
        is_active: true,
    }
}

/// Wraps the SQLite store; can be told to fail and counts reads.
pub struct FlakyStore {
    inner: SqliteBannerStore,
    fail_reads: AtomicBool,
    list_active_calls: AtomicUsize,
    fail_set_image: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteBannerStore::new(setup_pool().await),
            fail_reads: AtomicBool::new(false),
            list_active_calls: AtomicUsize::new(0),
            fail_set_image: Mutex::new(HashSet::new()),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_reads.store(failing, Ordering::SeqCst);
    }

    pub fn list_active_calls(&self) -> usize {
        self.list_active_calls.load(Ordering::SeqCst)
    }

    pub async fn fail_set_image_for(&self, id: &str) {
        self.fail_set_image.lock().await.insert(id.to_string());
    }

    fn check(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(BannerError::StoreUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BannerStore for FlakyStore {
    async fn list_active(&self, limit: i64) -> Result<Vec<Banner>> {
        self.list_active_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.list_active(limit).await
    }

    async fn list_paginated(
        &self,
        page: i64,
        limit: i64,
        filter: BannerFilter,
    ) -> Result<Page<Banner>> {
        self.check()?;
        self.inner.list_paginated(page, limit, filter).await
    }

    async fn list_all(&self) -> Result<Vec<Banner>> {
        self.check()?;
        self.inner.list_all().await
    }

    async fn get(&self, id: &str) -> Result<Banner> {
        self.check()?;
        self.inner.get(id).await
    }

    async fn create(&self, data: &NewBanner) -> Result<Banner> {
        self.inner.create(data).await
    }

    async fn update(&self, id: &str, data: &BannerUpdate) -> Result<Banner> {
        self.inner.update(id, data).await
    }

    async fn delete(&self, id: &str) -> Result<Banner> {
        self.inner.delete(id).await
    }

    async fn set_image(&self, id: &str, expected: &str, image: &str) -> Result<()> {
        if self.fail_set_image.lock().await.contains(id) {
            return Err(BannerError::StoreUnavailable("write timed out".into()));
        }
        self.inner.set_image(id, expected, image).await
    }
}

/// In-memory file storage that records writes and deletes.
#[derive(Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    fail_writes: AtomicBool,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MemoryStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every write signals `entered` and then waits for `release`.
    pub fn gated(entered: Arc<Notify>, release: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            gate: Some((entered, release)),
            ..Default::default()
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }

    pub async fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().await.get(path).cloned()
    }

    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

#[async_trait]
impl FileStorage for MemoryStorage {
    async fn write(&self, bytes: &[u8], suggested_name: &str) -> Result<String> {
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BannerError::FileWrite("disk full".into()));
        }
        let path = format!("/uploads/banners/{}", suggested_name);
        self.files.lock().await.insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.deleted.lock().await.push(path.to_string());
        Ok(self.files.lock().await.remove(path).is_some())
    }
}

/// Counts tag invalidations.
#[derive(Default)]
pub struct RecordingInvalidator {
    tags: Mutex<Vec<String>>,
}

impl RecordingInvalidator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn tags(&self) -> Vec<String> {
        self.tags.lock().await.clone()
    }
}

#[async_trait]
impl TagInvalidator for RecordingInvalidator {
    async fn invalidate_tag(&self, tag: &str) {
        self.tags.lock().await.push(tag.to_string());
    }
}
