//! Row models returned by repositories.
//!
//! Rows carry the raw column text; conversion into domain types happens once,
//! in `From<BannerRow> for Banner`.

use chrono::{DateTime, Utc};

use crate::model::{Banner, BannerImage};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BannerRow {
    pub id: String,
    pub title: String,
    pub image: String,
    pub url: Option<String>,
    pub position: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BannerRow> for Banner {
    fn from(row: BannerRow) -> Self {
        Self {
            image: BannerImage::parse(&row.image),
            id: row.id,
            title: row.title,
            url: row.url,
            position: row.position,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
