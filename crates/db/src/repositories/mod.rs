use thiserror::Error;

use dealdesk_core::errors::DraftStoreError;

pub mod draft;

pub use draft::{DraftRecord, SqlDraftStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for DraftStoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(source) => Self::Storage(source.to_string()),
            RepositoryError::Decode(message) => Self::Decode(message),
        }
    }
}
