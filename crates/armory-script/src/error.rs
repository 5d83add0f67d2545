//! Error types for armory-script

use thiserror::Error;

/// Script loading error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Unknown weapon: {0}")]
    UnknownWeapon(String),

    #[error("Invalid weapon config: {0}")]
    Core(#[from] armory_core::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
