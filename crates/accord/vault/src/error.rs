use accord_types::{LinearId, RecordRef, TransitionId};
use thiserror::Error;

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

/// Vault-layer errors.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("version {consumed} was already consumed by {consumed_by}, refusing {transition}")]
    DoubleConsumption {
        consumed: RecordRef,
        consumed_by: TransitionId,
        transition: TransitionId,
    },

    #[error("record {linear_id} was already created by {created_by}, refusing {transition}")]
    LinearIdReused {
        linear_id: LinearId,
        created_by: TransitionId,
        transition: TransitionId,
    },

    #[error("journal I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal corrupt at line {line}: {reason}")]
    CorruptJournal { line: usize, reason: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),
}
