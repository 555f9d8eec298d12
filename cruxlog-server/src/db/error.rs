//! Database error taxonomy
//!
//! Every failure from the pool, the executor, or a backend is one of these
//! kinds. Nothing below the HTTP layer swallows them.

use std::time::Duration;

/// Database error type
#[derive(Debug, Clone, thiserror::Error)]
pub enum DbError {
    /// No connection became available within the acquisition timeout.
    #[error("connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// The pool has been shut down.
    #[error("connection pool is closed")]
    PoolClosed,

    /// Placeholder count and parameter count disagree. Raised before any I/O.
    #[error("malformed query: {placeholders} placeholders but {params} parameters")]
    MalformedQuery { placeholders: usize, params: usize },

    /// The connection failed mid-call. The connection is invalidated; the
    /// caller may retry on a freshly acquired one.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// Duplicate key, foreign key, not-null or check constraint rejected the write.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// The statement does not fit the schema or does not parse.
    #[error("syntax or schema error: {0}")]
    SyntaxOrSchema(String),
}

impl DbError {
    /// Whether re-issuing the call on a new connection can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SyntaxOrSchema(message.into())
    }
}
