use thiserror::Error;

#[cfg(feature = "sqlite")]
use rusqlite;

#[derive(Debug, Error)]
pub enum RecordMiddlewareError {
    #[cfg(feature = "sqlite")]
    #[error(transparent)]
    SqliteError(#[from] rusqlite::Error),

    /// Transient connection/driver failure; the executor retries these.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Schema or data validation failure; surfaced immediately, never retried.
    #[error("Data error: {0}")]
    DataError(String),

    /// A key or record type cannot represent the backing field's domain.
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Operation invoked after pool/table disposal or close.
    #[error("Lifecycle error: {0}")]
    LifecycleError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("Unimplemented feature: {0}")]
    Unimplemented(String),

    #[error("Other database error: {0}")]
    Other(String),
}

impl RecordMiddlewareError {
    /// Whether the retry loop may re-attempt the operation on a fresh
    /// connection. Only connection-level faults qualify; structural and
    /// type faults always surface immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionError(_) => true,
            #[cfg(feature = "sqlite")]
            Self::SqliteError(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}
