use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

use crate::db::model::BannerRow;
use crate::error::{BannerError, Result};
use crate::model::{Banner, BannerFilter, BannerUpdate, NewBanner, Page};

pub type Pool = SqlitePool;

pub const MAX_PAGE_LIMIT: i64 = 100;

const COLUMNS: &str = "id, title, image, url, position, is_active, created_at, updated_at";

pub async fn init_pool(database_url: &str) -> anyhow::Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Active banners in display order. Ties on `position` keep insertion order.
#[instrument(skip(pool))]
pub async fn list_active(pool: &Pool, limit: i64) -> Result<Vec<Banner>> {
    let sql = format!(
        "SELECT {} FROM banners WHERE is_active = 1 ORDER BY position ASC, rowid ASC LIMIT ?",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, BannerRow>(&sql)
        .bind(limit.max(0))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Banner::from).collect())
}

/// Offset pagination; the count and the page are read in one transaction.
#[instrument(skip(pool))]
pub async fn list_paginated(
    pool: &Pool,
    page: i64,
    limit: i64,
    filter: BannerFilter,
) -> Result<Page<Banner>> {
    let page = page.max(1);
    let limit = limit.clamp(1, MAX_PAGE_LIMIT);
    let skip = (page - 1).saturating_mul(limit);

    let mut tx = pool.begin().await?;
    let total: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM banners WHERE (? IS NULL OR is_active = ?)")
            .bind(filter.is_active)
            .bind(filter.is_active)
            .fetch_one(&mut *tx)
            .await?;
    let sql = format!(
        "SELECT {} FROM banners WHERE (? IS NULL OR is_active = ?) \
         ORDER BY position ASC, rowid ASC LIMIT ? OFFSET ?",
        COLUMNS
    );
    let rows = sqlx::query_as::<_, BannerRow>(&sql)
        .bind(filter.is_active)
        .bind(filter.is_active)
        .bind(limit)
        .bind(skip)
        .fetch_all(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Page {
        items: rows.into_iter().map(Banner::from).collect(),
        total,
        page,
        limit,
    })
}

#[instrument(skip_all)]
pub async fn list_all(pool: &Pool) -> Result<Vec<Banner>> {
    let sql = format!("SELECT {} FROM banners ORDER BY position ASC, rowid ASC", COLUMNS);
    let rows = sqlx::query_as::<_, BannerRow>(&sql).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Banner::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_banner(pool: &Pool, id: &str) -> Result<Banner> {
    let sql = format!("SELECT {} FROM banners WHERE id = ?", COLUMNS);
    sqlx::query_as::<_, BannerRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Banner::from)
        .ok_or_else(|| BannerError::NotFound(id.to_string()))
}

#[instrument(skip_all)]
pub async fn create_banner(pool: &Pool, data: &NewBanner) -> Result<Banner> {
    let id = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let sql = format!(
        "INSERT INTO banners ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        COLUMNS, COLUMNS
    );
    let row = sqlx::query_as::<_, BannerRow>(&sql)
        .bind(&id)
        .bind(&data.title)
        .bind(&data.image)
        .bind(&data.url)
        .bind(data.position)
        .bind(data.is_active)
        .bind(now)
        .bind(now)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

#[instrument(skip(pool, data))]
pub async fn update_banner(pool: &Pool, id: &str, data: &BannerUpdate) -> Result<Banner> {
    let mut tx = pool.begin().await?;
    let select = format!("SELECT {} FROM banners WHERE id = ?", COLUMNS);
    let Some(current) = sqlx::query_as::<_, BannerRow>(&select)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
    else {
        return Err(BannerError::NotFound(id.to_string()));
    };

    let title = data.title.clone().unwrap_or(current.title);
    let image = data.image.clone().unwrap_or(current.image);
    let url = data.url.clone().unwrap_or(current.url);
    let position = data.position.unwrap_or(current.position);
    let is_active = data.is_active.unwrap_or(current.is_active);

    let update = format!(
        "UPDATE banners SET title = ?, image = ?, url = ?, position = ?, is_active = ?, updated_at = ? \
         WHERE id = ? RETURNING {}",
        COLUMNS
    );
    let row = sqlx::query_as::<_, BannerRow>(&update)
        .bind(title)
        .bind(image)
        .bind(url)
        .bind(position)
        .bind(is_active)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(row.into())
}

/// Rewrite only the `image` column of one banner, and only while it still
/// holds `expected`. A row that changed in between is a `Conflict`.
#[instrument(skip(pool, expected, image))]
pub async fn set_banner_image(pool: &Pool, id: &str, expected: &str, image: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    let res = sqlx::query("UPDATE banners SET image = ?, updated_at = ? WHERE id = ? AND image = ?")
        .bind(image)
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM banners WHERE id = ?)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        return Err(if exists {
            BannerError::Conflict(id.to_string())
        } else {
            BannerError::NotFound(id.to_string())
        });
    }
    tx.commit().await?;
    Ok(())
}

/// Delete a banner and return the removed row.
#[instrument(skip(pool))]
pub async fn delete_banner(pool: &Pool, id: &str) -> Result<Banner> {
    let sql = format!("DELETE FROM banners WHERE id = ? RETURNING {}", COLUMNS);
    sqlx::query_as::<_, BannerRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(Banner::from)
        .ok_or_else(|| BannerError::NotFound(id.to_string()))
}
