use thiserror::Error;

/// Centralized error types for the storage core
///
/// Every operation in the storage layer returns this enum so that callers
/// (bot handlers, webapp routes) can branch on recoverability:
///
/// - `Validation` — malformed input; the call has not touched the database.
/// - `NotFound` — a referenced row is missing; informational.
/// - `Conflict` — an invariant would be violated (deleting a referenced
///   album, mutating checked-out history, checking out an empty cart,
///   ordering a non-orderable item); recoverable but worth surfacing.
/// - `Database` / `DatabasePool` — the persistence layer is unavailable or
///   misbehaving; the host should retry or report, never swallow.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Malformed input (empty title, negative price, zero quantity)
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced User/Album/Item/Cart entry does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation would violate a data invariant
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// True for errors the caller can recover from by fixing the request;
    /// false for persistence-layer failures that need a retry or an alert.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StoreError::Database(_) | StoreError::DatabasePool(_))
    }
}
