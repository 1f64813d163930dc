use std::path::PathBuf;

use thiserror::Error;

/// Prefix shared by every stage-level failure string.
pub const ERROR_PREFIX: &str = "Error";

/// Core error type for ContentCrew.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("configuration error: {0}")]
    InvalidConfiguration(String),
    #[error("missing environment variable: {0}")]
    MissingSecret(String),
    #[error("I/O error while reading {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error while writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("model configuration is missing `{0}`")]
    MissingModelField(&'static str),
    #[error("model call failed: {0}")]
    Model(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ContentError {
    pub fn config_io(path: PathBuf, source: std::io::Error) -> Self {
        Self::ConfigIo { path, source }
    }

    pub fn io(path: PathBuf, source: std::io::Error) -> Self {
        Self::Io { path, source }
    }
}

impl From<sqlx::Error> for ContentError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => Self::NotFound("row not found".into()),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type Result<T, E = ContentError> = std::result::Result<T, E>;

/// Stage outputs signal failure in-band: callers check the prefix instead of
/// matching on an error type.
pub fn is_error_sentinel(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}
