//! Error taxonomy shared by the store adapter, the cache facade and the
//! migration engine.
use thiserror::Error;

pub type Result<T, E = BannerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum BannerError {
    #[error("banner not found: {0}")]
    NotFound(String),
    #[error("invalid banner: {0}")]
    Validation(String),
    #[error("banner store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("inline image could not be decoded: {0}")]
    Decode(String),
    #[error("image file could not be written: {0}")]
    FileWrite(String),
    #[error("banner changed concurrently: {0}")]
    Conflict(String),
    #[error("an image migration is already running")]
    MigrationInProgress,
}

impl From<sqlx::Error> for BannerError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => BannerError::NotFound("row".into()),
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::NotNullViolation
                | sqlx::error::ErrorKind::CheckViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation => {
                    BannerError::Validation(db.message().to_string())
                }
                _ => BannerError::StoreUnavailable(err.to_string()),
            },
            _ => BannerError::StoreUnavailable(err.to_string()),
        }
    }
}
