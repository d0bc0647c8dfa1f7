//! Store error types

use thiserror::Error;

/// Errors returned by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A JSON column failed to serialize or deserialize
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp column failed to parse
    #[error("timestamp error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    /// No plan with the given id
    #[error("plan not found: {0}")]
    NotFound(String),

    /// The status column held an unknown value
    #[error("invalid plan status: {0}")]
    InvalidStatus(String),
}

/// Convenience alias for store results
pub type Result<T> = std::result::Result<T, StoreError>;
