//! Common error types for kitcheck

use crate::model::ItemRef;
use thiserror::Error;

/// Common result type for kitcheck operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across kitcheck crates
#[derive(Error, Debug)]
pub enum Error {
    /// Too many items left untouched; submission is refused outright
    #[error("{message}")]
    ValidationBlocked {
        message: String,
        incomplete: Vec<String>,
    },

    /// A few items left untouched; submission is refused with the item names
    #[error("{message}")]
    ValidationWarning {
        message: String,
        incomplete: Vec<String>,
    },

    /// Audit record transaction failed (nothing was committed)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Submission request never reached the server or its answer was lost
    #[error("Transport error: {0}")]
    Transport(String),

    /// Item id absent from the pool it was looked up in
    #[error("Item {0} not found")]
    ResolutionMiss(ItemRef),

    /// Notification could not be delivered
    #[error("Notification error: {0}")]
    Notification(String),

    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the two validator rejections (recoverable by the operator)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::ValidationBlocked { .. } | Error::ValidationWarning { .. }
        )
    }
}
