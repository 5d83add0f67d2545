//! Error types for armory-core

use crate::identity::ModeId;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient resource: requested {requested}, loaded {loaded}")]
    InsufficientResource { requested: f64, loaded: f64 },

    #[error("Reload not needed")]
    NotNeeded,

    #[error("Action already in progress")]
    AlreadyInProgress,

    #[error("No reload in progress")]
    NotReloading,

    #[error("No valid mount point resolved")]
    NoValidMount,

    #[error("Item is not attached")]
    NotAttached,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Fire mode not found: {0}")]
    UnknownMode(ModeId),

    #[error("No fire modes configured")]
    NoModes,

    #[error("No fire mode is available")]
    ModeUnavailable,

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
