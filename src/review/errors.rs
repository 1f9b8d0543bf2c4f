use thiserror::Error;

/// Outcome of a failed ranking operation.
///
/// Only `Storage` can be raised after state was touched, and in that case the
/// whole operation has been rolled back.
#[derive(Debug, Error)]
pub enum RankingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl RankingError {
    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RankingError::Validation(_) => "validation",
            RankingError::NotFound(_) => "not_found",
            RankingError::Conflict(_) => "conflict",
            RankingError::Storage(_) => "storage",
        }
    }
}

pub type RankingResult<T> = std::result::Result<T, RankingError>;
