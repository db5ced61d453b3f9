use std::time::Duration;

use accord_contract::ContractViolation;
use accord_notary::NotaryError;
use accord_types::{LinearId, Party, RecordRef, TransitionId, TypesError};
use accord_vault::VaultError;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::transport::TransportError;

/// Result type for protocol runs.
pub type FlowResult<T> = Result<T, FlowError>;

/// Coarse failure classes a caller bases its retry policy on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The proposal itself is wrong; never retried.
    Validation,
    NotFound,
    /// Lost an ordering race; rebuild from the current record and retry.
    Conflict,
    /// Fatal refusal by the ordering authority.
    Rejected,
    /// Something was unreachable; retry is the caller's call.
    Transport,
}

/// Failure of a protocol run.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("record {0} is already complete")]
    AlreadyComplete(LinearId),

    #[error("version {consumed} was already consumed by {consumed_by}")]
    Conflict {
        consumed: RecordRef,
        consumed_by: TransitionId,
    },

    #[error("ordering authority rejected the transition: {0}")]
    Rejected(String),

    #[error("{party} rejected the proposal: {reason}")]
    CounterpartyRejected { party: Party, reason: String },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("storage failure: {0}")]
    Storage(#[from] VaultError),

    #[error("no quorum after {0:?}")]
    Timeout(Duration),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::Validation(_)
            | FlowError::AlreadyComplete(_)
            | FlowError::CounterpartyRejected { .. } => ErrorKind::Validation,
            FlowError::NotFound(_) => ErrorKind::NotFound,
            FlowError::Conflict { .. } => ErrorKind::Conflict,
            FlowError::Rejected(_) => ErrorKind::Rejected,
            FlowError::Transport(_) | FlowError::Storage(_) | FlowError::Timeout(_) => {
                ErrorKind::Transport
            }
        }
    }

    /// Whether rebuilding the proposal from current state could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Transport)
    }
}

impl From<ContractViolation> for FlowError {
    fn from(violation: ContractViolation) -> Self {
        FlowError::Validation(violation.to_string())
    }
}

impl From<TypesError> for FlowError {
    fn from(err: TypesError) -> Self {
        FlowError::Validation(err.to_string())
    }
}

impl From<TransportError> for FlowError {
    fn from(err: TransportError) -> Self {
        FlowError::Transport(err.to_string())
    }
}

impl From<NotaryError> for FlowError {
    fn from(err: NotaryError) -> Self {
        FlowError::Transport(err.to_string())
    }
}

impl From<DirectoryError> for FlowError {
    fn from(err: DirectoryError) -> Self {
        FlowError::NotFound(err.to_string())
    }
}
