/// Errors that can occur within the storage layer.
///
/// The [`StorageEngine`](crate::StorageEngine) trait returns
/// `anyhow::Result` so callers can treat any persistence failure as the
/// spec's transient-I/O case; this module defines the typed errors the
/// SQLite engine produces underneath.
///
/// # Examples
///
/// ```rust
/// use pulsemon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "alert",
///     id: "alert-42".to_string(),
/// };
/// assert!(err.to_string().contains("alert"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An underlying SQLite error.
    #[error("storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failure (metadata columns).
    #[error("storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic storage error for cases not covered by other variants.
    #[error("storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
