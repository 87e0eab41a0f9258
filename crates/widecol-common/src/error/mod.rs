//! Error handling for widecol.
//!
//! This module provides the store-level error type raised by table handles,
//! pools and administration calls, and the mapper-level error type returned
//! by every marshalling operation.

mod mapper;
mod store;

pub use mapper::{ErrorCode, WidecolError};
pub use store::StoreError;

/// Result type alias for mapper operations.
pub type WidecolResult<T> = std::result::Result<T, WidecolError>;

/// Result type alias for store client operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
