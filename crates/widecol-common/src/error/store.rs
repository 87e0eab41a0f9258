//! Errors raised by the wide-column store client.

use thiserror::Error;

/// Errors surfaced by table handles, the handle pool and store administration.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The table does not exist.
    #[error("table '{0}' not found")]
    TableNotFound(String),

    /// The table already exists.
    #[error("table '{0}' already exists")]
    TableExists(String),

    /// A column was addressed to a family the table does not declare.
    #[error("column family '{family}' does not exist in table '{table}'")]
    NoSuchFamily {
        /// The table name.
        table: String,
        /// The missing family.
        family: String,
    },

    /// The table (or the store behind it) cannot serve requests.
    #[error("table '{0}' is unavailable")]
    Unavailable(String),

    /// The pool has been closed.
    #[error("handle pool is closed")]
    PoolClosed,

    /// No handle became free within the acquire timeout.
    #[error("handle acquisition for table '{table}' timed out after {timeout_ms}ms")]
    PoolTimeout {
        /// The table whose handle was requested.
        table: String,
        /// The configured timeout.
        timeout_ms: u64,
    },

    /// Invalid pool or store configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying I/O failure.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Returns true if retrying the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::PoolTimeout { .. })
    }
}
