//! Error kinds shared across the engine.
//!
//! Per-file failures during indexing are counted and skipped; everything else
//! surfaces to the caller with a stable error code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// User input or configuration invariants violated.
    #[error("validation error: {0}")]
    Validation(String),

    /// Index or manifest absent. Callers usually recover by treating the
    /// target as empty rather than propagating this.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate module ID or other conflicting declaration.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unparsable persisted index. Logged, treated as not-present, rebuilt.
    #[error("corrupt index data: {0}")]
    Corruption(String),

    /// Read/write failure against the file system.
    #[error("io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Programmatic bug (e.g. a failure during score fusion).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    /// Stable machine-readable code for each error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NotFound(_) => "NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::Corruption(_) | Error::Io { .. } => "DATABASE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
