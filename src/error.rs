//! Error types for Citycast

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage handle already closed
    #[error("Database handle is closed")]
    Closed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// API error
    #[error("API error: {0}")]
    Api(String),

    /// Password / token hashing error
    #[error("Hashing error: {0}")]
    Hash(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Not found error
    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    /// Conflict with existing data
    #[error("{0} already exists: {1}")]
    Conflict(&'static str, String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Blocking task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

/// Result type alias for Core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<argon2::password_hash::Error> for CoreError {
    fn from(e: argon2::password_hash::Error) -> Self {
        CoreError::Hash(e.to_string())
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        CoreError::Task(e.to_string())
    }
}

impl CoreError {
    /// Whether this error points at the storage layer rather than the caller's input
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            CoreError::Database(_) | CoreError::Closed | CoreError::Task(_)
        )
    }
}
