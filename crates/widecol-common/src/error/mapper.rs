//! Mapper error types.
//!
//! Every marshalling, read and write operation reports failures through
//! [`WidecolError`]. Relation lookups are the one exception: they degrade to
//! an empty result instead of returning an error.

use std::fmt;
use thiserror::Error;

use super::store::StoreError;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Internal error (bug).
    Internal = 0x0000,
    /// Operation not supported.
    NotSupported = 0x0001,
    /// Invalid argument provided.
    InvalidArgument = 0x0002,

    // Schema errors (0x0100 - 0x01FF)
    /// Table or family setup failed.
    Configuration = 0x0100,

    // Marshalling errors (0x0200 - 0x02FF)
    /// Object construction or field assignment failed.
    Marshal = 0x0200,
    /// Stored bytes could not be parsed.
    Decode = 0x0201,
    /// Relation data could not be resolved.
    RelationLookup = 0x0202,

    // Cursor errors (0x0300 - 0x03FF)
    /// A cursor was advanced past its last row.
    IteratorExhausted = 0x0300,

    // Store errors (0x0400 - 0x04FF)
    /// The store client reported a failure.
    Store = 0x0400,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Schema",
            0x02 => "Marshalling",
            0x03 => "Cursor",
            0x04 => "Store",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for widecol.
///
/// # Example
///
/// ```rust
/// use widecol_common::error::{ErrorCode, WidecolError};
///
/// let err = WidecolError::decode("person", "qualifier 'a#b' has no index");
/// assert_eq!(err.code(), ErrorCode::Decode);
/// ```
#[derive(Debug, Error)]
pub enum WidecolError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported by the wide-column mapping.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Schema Errors
    // ==========================================================================
    /// Table or column family setup failed.
    #[error("configuration error on table '{table}': {source}")]
    Configuration {
        /// The table being configured.
        table: String,
        /// The store failure.
        #[source]
        source: StoreError,
    },

    /// Configuration file or value is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Marshalling Errors
    // ==========================================================================
    /// An entity or embedded object could not be built or populated.
    #[error("cannot marshal {type_name}: {reason}")]
    Marshal {
        /// The entity or embeddable type name.
        type_name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Stored bytes or a qualifier could not be parsed.
    #[error("cannot decode row of {type_name}: {reason}")]
    Decode {
        /// The entity type being decoded.
        type_name: String,
        /// Reason for failure.
        reason: String,
    },

    /// Relation data could not be read.
    ///
    /// Relation readers log this and return an empty result; it is only
    /// surfaced by the strict lookup variants.
    #[error("relation lookup on '{table}' failed: {source}")]
    RelationLookup {
        /// The join table or relation family.
        table: String,
        /// The store failure.
        #[source]
        source: StoreError,
    },

    // ==========================================================================
    // Cursor Errors
    // ==========================================================================
    /// `next` was called on a cursor with no remaining rows.
    #[error("cursor exhausted: no more rows")]
    IteratorExhausted,

    // ==========================================================================
    // Store Errors
    // ==========================================================================
    /// The store client failed; passed through unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl WidecolError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Configuration { .. } => ErrorCode::Configuration,
            Self::InvalidConfig { .. } => ErrorCode::InvalidArgument,
            Self::Marshal { .. } => ErrorCode::Marshal,
            Self::Decode { .. } => ErrorCode::Decode,
            Self::RelationLookup { .. } => ErrorCode::RelationLookup,
            Self::IteratorExhausted => ErrorCode::IteratorExhausted,
            Self::Store(_) => ErrorCode::Store,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Marshalling and decoding failures are deterministic and never retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a not-supported error.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Creates a marshalling error.
    #[must_use]
    pub fn marshal(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Marshal {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a decoding error.
    #[must_use]
    pub fn decode(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Decode {
            type_name: type_name.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a store failure raised while setting up a table.
    #[must_use]
    pub fn configuration(table: impl Into<String>, source: StoreError) -> Self {
        Self::Configuration {
            table: table.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = WidecolError::marshal("Address", "no default constructor");
        assert_eq!(err.code(), ErrorCode::Marshal);
        assert_eq!(err.code().category(), "Marshalling");
    }

    #[test]
    fn test_error_display() {
        let err = WidecolError::decode("Person", "bad qualifier");
        assert_eq!(err.to_string(), "cannot decode row of Person: bad qualifier");
        assert_eq!(
            WidecolError::IteratorExhausted.to_string(),
            "cursor exhausted: no more rows"
        );
    }

    #[test]
    fn test_store_error_is_transparent() {
        let err: WidecolError = StoreError::TableNotFound("people".into()).into();
        assert_eq!(err.code(), ErrorCode::Store);
        assert_eq!(err.to_string(), "table 'people' not found");
    }

    #[test]
    fn test_retryable() {
        let err: WidecolError = StoreError::Unavailable("people".into()).into();
        assert!(err.is_retryable());
        assert!(!WidecolError::IteratorExhausted.is_retryable());
        assert!(!WidecolError::decode("Person", "x").is_retryable());
    }

    #[test]
    fn test_configuration_wraps_source() {
        let err = WidecolError::configuration("people", StoreError::TableExists("people".into()));
        assert_eq!(err.code(), ErrorCode::Configuration);
        assert_eq!(err.code().category(), "Schema");
        assert!(std::error::Error::source(&err).is_some());
    }
}
