//! Error types for testforge

use thiserror::Error;

use crate::types::Scope;

/// Result type alias using testforge Error
pub type Result<T> = std::result::Result<T, Error>;

/// testforge error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("{scope} variable '{name}' already exists, try '{suggestion}'")]
    VariableConflict {
        name: String,
        scope: Scope,
        suggestion: String,
    },

    #[error("Local variable '{0}' requires both a suite id and a test case id")]
    MissingLocalOwner(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
