use crate::types::ItemId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeckError {
    #[error("not initialized: run 'deck init'")]
    NotInitialized,

    #[error("item not found: {0}")]
    ItemNotFound(ItemId),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid day key '{0}': expected YYYY-MM-DD")]
    InvalidDayKey(String),

    #[error("unsupported file extension: {0}")]
    UnsupportedExtension(String),

    #[error("order state changed concurrently (expected version {expected}, found {found})")]
    Conflict { expected: u64, found: u64 },

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DeckError {
    pub(crate) fn db(e: impl std::fmt::Display) -> Self {
        DeckError::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DeckError>;
