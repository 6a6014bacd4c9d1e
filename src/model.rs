use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{BannerError, Result};

/// Header of a data URI: `data:<mime>[;param]*,`.
static DATA_URI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:(?P<mime>[^;,]*)(?P<params>[^,]*),").expect("valid data URI regex")
});

const MIN_TITLE_CHARS: usize = 3;

/// Image reference of a banner. The stored text is classified exactly once,
/// when a row leaves the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BannerImage {
    Inline(InlineImage),
    File(String),
}

/// An image embedded in the row as a data URI. `raw` is the stored text,
/// which is what gets served and written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub base64: bool,
    pub payload: String,
    raw: String,
}

impl BannerImage {
    pub fn parse(raw: &str) -> Self {
        if !raw.starts_with("data:") {
            return BannerImage::File(raw.to_string());
        }
        match DATA_URI.captures(raw) {
            Some(caps) => {
                let header_len = caps.get(0).map(|m| m.end()).unwrap_or(raw.len());
                let mime = caps.name("mime").map(|m| m.as_str()).unwrap_or_default();
                let params = caps.name("params").map(|m| m.as_str()).unwrap_or_default();
                InlineImage {
                    mime_type: if mime.is_empty() {
                        "text/plain".to_string()
                    } else {
                        mime.to_ascii_lowercase()
                    },
                    base64: params
                        .split(';')
                        .any(|p| p.trim().eq_ignore_ascii_case("base64")),
                    payload: raw[header_len..].to_string(),
                    raw: raw.to_string(),
                }
                .into()
            }
            // `data:` without the comma separator; keep it inline so the
            // migration reports it instead of treating it as a path.
            None => InlineImage {
                mime_type: "application/octet-stream".to_string(),
                base64: false,
                payload: String::new(),
                raw: raw.to_string(),
            }
            .into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, BannerImage::Inline(_))
    }

    /// Text form persisted in the `image` column.
    pub fn to_db_value(&self) -> String {
        self.to_string()
    }
}

impl From<InlineImage> for BannerImage {
    fn from(img: InlineImage) -> Self {
        BannerImage::Inline(img)
    }
}

impl fmt::Display for BannerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BannerImage::File(path) => f.write_str(path),
            BannerImage::Inline(img) => f.write_str(&img.raw),
        }
    }
}

impl Serialize for BannerImage {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl InlineImage {
    /// Decode the payload into raw image bytes.
    pub fn decode(&self) -> Result<Vec<u8>> {
        if !self.base64 {
            return Err(BannerError::Decode(format!(
                "{} payload is not base64-encoded",
                self.mime_type
            )));
        }
        let cleaned: String = self
            .payload
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        if cleaned.is_empty() {
            return Err(BannerError::Decode("empty payload".into()));
        }
        STANDARD
            .decode(cleaned.as_bytes())
            .map_err(|e| BannerError::Decode(e.to_string()))
    }

    /// Decoded size computed from the payload length and padding; the bytes
    /// are never materialized. Malformed payloads are not detected here.
    pub fn decoded_len(&self) -> u64 {
        if !self.base64 {
            return self.payload.len() as u64;
        }
        let mut chars = 0u64;
        let mut padding = 0u64;
        for c in self.payload.chars().filter(|c| !c.is_ascii_whitespace()) {
            chars += 1;
            if c == '=' {
                padding += 1;
            } else {
                padding = 0;
            }
        }
        (chars * 3 / 4).saturating_sub(padding.min(2))
    }

    /// File extension for the embedded MIME type.
    pub fn extension(&self) -> String {
        extension_for_mime(&self.mime_type)
    }
}

pub fn extension_for_mime(mime: &str) -> String {
    let ext = match mime.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" | "image/pjpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "image/avif" => "avif",
        "image/bmp" => "bmp",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        other => {
            let sub = other.split_once('/').map(|(_, s)| s).unwrap_or_default();
            let sub: String = sub
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();
            return if sub.is_empty() { "bin".to_string() } else { sub };
        }
    };
    ext.to_string()
}

/// Collision-resistant file name: millisecond timestamp plus a random suffix.
pub fn generate_file_name(extension: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("banner-{}-{}.{}", millis, &random[..8], extension)
}

#[derive(Debug, Clone, Serialize)]
pub struct Banner {
    pub id: String,
    pub title: String,
    pub image: BannerImage,
    pub url: Option<String>,
    pub position: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Projection of a banner served to the home page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeBanner {
    pub id: String,
    pub title: String,
    pub image: String,
    pub url: Option<String>,
    pub position: i64,
}

impl From<&Banner> for HomeBanner {
    fn from(b: &Banner) -> Self {
        Self {
            id: b.id.clone(),
            title: b.title.clone(),
            image: b.image.to_db_value(),
            url: b.url.clone(),
            position: b.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBanner {
    pub title: String,
    pub image: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Partial update; `None` leaves the column untouched. `url: Some(None)`
/// clears the link.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BannerUpdate {
    pub title: Option<String>,
    pub image: Option<String>,
    pub url: Option<Option<String>>,
    pub position: Option<i64>,
    pub is_active: Option<bool>,
}

impl NewBanner {
    pub fn validate(&self) -> Result<()> {
        validate_title(&self.title)?;
        validate_image(&self.image)?;
        validate_link(self.url.as_deref())
    }

    /// Trim fields and turn an empty link into `None`.
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.image = self.image.trim().to_string();
        self.url = normalize_link(self.url);
        self
    }
}

impl BannerUpdate {
    pub fn validate(&self) -> Result<()> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(image) = &self.image {
            validate_image(image)?;
        }
        if let Some(url) = &self.url {
            validate_link(url.as_deref())?;
        }
        Ok(())
    }

    pub fn normalized(mut self) -> Self {
        self.title = self.title.map(|t| t.trim().to_string());
        self.image = self.image.map(|i| i.trim().to_string());
        self.url = self.url.map(normalize_link);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.image.is_none()
            && self.url.is_none()
            && self.position.is_none()
            && self.is_active.is_none()
    }
}

fn normalize_link(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty())
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().chars().count() < MIN_TITLE_CHARS {
        return Err(BannerError::Validation(format!(
            "title must be at least {} characters",
            MIN_TITLE_CHARS
        )));
    }
    Ok(())
}

fn validate_image(image: &str) -> Result<()> {
    let image = image.trim();
    if image.is_empty() {
        return Err(BannerError::Validation("image must be non-empty".into()));
    }
    if image.starts_with("data:") || image.starts_with('/') {
        return Ok(());
    }
    match Url::parse(image) {
        Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(()),
        _ => Err(BannerError::Validation(
            "image must be a data URI, a root-relative path or an http(s) URL".into(),
        )),
    }
}

fn validate_link(url: Option<&str>) -> Result<()> {
    let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
        return Ok(());
    };
    Url::parse(url)
        .map(|_| ())
        .map_err(|e| BannerError::Validation(format!("url is not a valid URL: {}", e)))
}

/// Filter for paginated listing.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BannerFilter {
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        if self.limit <= 0 {
            return 0;
        }
        (self.total + self.limit - 1) / self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(
            BannerImage::parse("/uploads/banners/a.png"),
            BannerImage::File("/uploads/banners/a.png".into())
        );
        match BannerImage::parse("data:image/png;base64,aGVsbG8=") {
            BannerImage::Inline(img) => {
                assert_eq!(img.mime_type, "image/png");
                assert!(img.base64);
                assert_eq!(img.decode().unwrap(), b"hello");
                assert_eq!(img.extension(), "png");
            }
            other => panic!("expected inline, got {:?}", other),
        }
    }

    #[test]
    fn inline_without_comma_fails_to_decode() {
        let img = BannerImage::parse("data:image/png;base64");
        let BannerImage::Inline(inline) = img else {
            panic!("expected inline");
        };
        assert!(matches!(inline.decode(), Err(BannerError::Decode(_))));
    }

    #[test]
    fn corrupt_payload_is_decode_error() {
        let BannerImage::Inline(img) = BannerImage::parse("data:image/jpeg;base64,@@@not-base64")
        else {
            panic!("expected inline");
        };
        assert!(matches!(img.decode(), Err(BannerError::Decode(_))));
        assert_eq!(img.decoded_len(), ("@@@not-base64".len() as u64) * 3 / 4);
    }

    #[test]
    fn stored_text_is_kept_verbatim() {
        for raw in [
            "data:image/webp;base64,AAAA",
            "data:image/png;name=hero.png;base64,aGVsbG8=",
            "data:image/png;base64",
            "/uploads/banners/a.png",
        ] {
            assert_eq!(BannerImage::parse(raw).to_db_value(), raw);
        }
    }

    #[test]
    fn home_projection_serves_stored_image() {
        let raw = "data:image/png;name=hero.png;base64,aGVsbG8=";
        let now = Utc::now();
        let banner = Banner {
            id: "b1".into(),
            title: "Hero".into(),
            image: BannerImage::parse(raw),
            url: None,
            position: 1,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(HomeBanner::from(&banner).image, raw);
    }

    #[test]
    fn decoded_len_matches_decoded_bytes() {
        for raw in [
            "data:image/png;base64,aGVsbG8=",
            "data:image/png;base64,d29ybGQh",
            "data:image/png;base64,aGk=",
            "data:image/png;base64,aGVs\nbG8=",
        ] {
            let BannerImage::Inline(img) = BannerImage::parse(raw) else {
                panic!("expected inline");
            };
            assert_eq!(img.decoded_len(), img.decode().unwrap().len() as u64, "{raw}");
        }
    }

    #[test]
    fn extension_mapping() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/svg+xml"), "svg");
        assert_eq!(extension_for_mime("image/heic"), "heic");
        assert_eq!(extension_for_mime("garbage"), "bin");
    }

    #[test]
    fn file_names_are_unique() {
        let a = generate_file_name("png");
        let b = generate_file_name("png");
        assert_ne!(a, b);
        assert!(a.starts_with("banner-") && a.ends_with(".png"));
    }

    #[test]
    fn validation_rules() {
        let ok = NewBanner {
            title: "Harvest sale".into(),
            image: "/uploads/banners/x.png".into(),
            url: Some("".into()),
            position: 1,
            is_active: true,
        };
        ok.validate().unwrap();

        let mut short = ok.clone();
        short.title = " ab ".into();
        assert!(matches!(short.validate(), Err(BannerError::Validation(_))));

        let mut bad_url = ok.clone();
        bad_url.url = Some("not a url".into());
        assert!(matches!(bad_url.validate(), Err(BannerError::Validation(_))));

        let mut bad_image = ok.clone();
        bad_image.image = "ftp://example.com/a.png".into();
        assert!(matches!(bad_image.validate(), Err(BannerError::Validation(_))));

        let normalized = ok.normalized();
        assert_eq!(normalized.url, None);
    }

    #[test]
    fn page_count_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total: 25,
            page: 1,
            limit: 10,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
