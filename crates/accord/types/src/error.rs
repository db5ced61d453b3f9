use thiserror::Error;

/// Errors raised while encoding, decoding, or hashing protocol values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("invalid hex encoding")]
    InvalidHex,

    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid linear id: {0}")]
    InvalidLinearId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
