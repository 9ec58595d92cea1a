//! Error taxonomy for the retrieval engine.
//!
//! Callers need to distinguish these cases programmatically:
//! validation failures are never retried, storage failures are surfaced
//! for the caller to decide, embedding outages are retryable, and
//! timeouts guarantee no partial write happened.

/// Errors surfaced by the retrieval engine.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Input was rejected before any side effect (empty or oversized content).
    #[error("invalid input: {reason}")]
    Validation { reason: String },

    /// The underlying persistence medium failed (I/O, corruption, locking).
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// The embedding provider could not be reached or returned an error.
    ///
    /// Retryable by the caller. The engine never falls back to
    /// sparse-only ranking when this happens.
    #[error("embedding provider unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    /// A caller-supplied deadline was exceeded. No partial state was persisted.
    #[error("operation timed out after {millis}ms")]
    Timeout { millis: u64 },
}

impl RagError {
    pub fn validation(reason: impl Into<String>) -> Self {
        RagError::Validation {
            reason: reason.into(),
        }
    }

    pub fn embedding_unavailable(reason: impl Into<String>) -> Self {
        RagError::EmbeddingUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::Storage(sqlx::Error::Io(e))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
