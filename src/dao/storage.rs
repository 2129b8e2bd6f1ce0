use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or the query failed outright.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human-readable description of the failed operation.
        message: String,
        /// Underlying backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Transient lock or timeout; the caller may retry once.
    #[error("storage busy: {message}")]
    Busy {
        /// Description of the contended operation.
        message: String,
    },
    /// A decision already exists for this team and position.
    ///
    /// Raised either by the fast-path existence check or by the unique index
    /// when two submissions race; the index is the real invariant guard.
    #[error("decision already recorded for team `{team_id}` at position {position}")]
    DuplicateDecision {
        /// Team that attempted the duplicate submission.
        team_id: Uuid,
        /// Scenario position of the duplicate submission.
        position: u8,
    },
    /// Persisted data failed integrity checks while being read back.
    #[error("storage corrupted: {message}")]
    Corrupted {
        /// Description of the inconsistency.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether a single transparent retry is worthwhile.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Busy { .. })
    }
}
