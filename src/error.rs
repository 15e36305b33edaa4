use thiserror::Error;

use crate::models::IneligibleReason;

/// Failures surfaced by the review engine
#[derive(Debug, Error)]
pub enum ReviewError {
    /// Bad input; nothing was persisted
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("review {0} not found")]
    NotFound(u64),

    #[error("invalid state transition for review {id}: {message}")]
    InvalidStateTransition { id: u64, message: String },

    #[error("not eligible to review: {0}")]
    NotEligible(IneligibleReason),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Medium unreachable or timed out; the write either fully happened or not at all
    #[error("storage unavailable: {0:#}")]
    StorageUnavailable(#[source] anyhow::Error),

    /// Persisted document could not be decoded
    #[error("storage corrupt: {0:#}")]
    StorageCorrupt(#[source] anyhow::Error),
}

impl ReviewError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ReviewError::StorageUnavailable(_))
    }

    pub(crate) fn invalid_transition(id: u64, message: impl Into<String>) -> Self {
        ReviewError::InvalidStateTransition {
            id,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReviewError>;
