//! Error types for armory-netcode

use crate::messages::CorrelationId;
use armory_core::HolderId;
use thiserror::Error;

/// Netcode error type
#[derive(Debug, Error)]
pub enum Error {
    /// A result arrived for a prediction that already expired or was superseded
    #[error("Prediction {0} already expired")]
    PredictionExpired(CorrelationId),

    /// Correlation id was already processed
    #[error("Duplicate correlation id {0}")]
    DuplicateCorrelationId(CorrelationId),

    /// Correlation id was never issued
    #[error("Unknown correlation id {0}")]
    UnknownCorrelationId(CorrelationId),

    /// Holder is not registered
    #[error("Unknown holder {0}")]
    UnknownHolder(HolderId),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local state component refused the operation
    #[error(transparent)]
    Core(#[from] armory_core::Error),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type for netcode operations
pub type Result<T> = std::result::Result<T, Error>;
