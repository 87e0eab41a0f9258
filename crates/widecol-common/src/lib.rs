//! # widecol-common
//!
//! Common types, errors, and utilities for widecol.
//!
//! This crate provides the foundational types shared by the store client
//! and the mapper:
//!
//! - **Types**: `RowKey`, `Column`, `RowResult` and the scalar `Value` model
//! - **Codec**: the reversible byte codec for cells and row keys
//! - **Errors**: `WidecolError` for mapper operations, `StoreError` for the store
//! - **Config**: mapper and pool configuration
//!
//! ## Example
//!
//! ```rust
//! use widecol_common::codec::{ByteCodec, CanonicalCodec};
//! use widecol_common::types::{Value, ValueType};
//!
//! let codec = CanonicalCodec::new();
//! let bytes = codec.encode(&Value::Int(42));
//! assert_eq!(codec.decode(ValueType::Int, &bytes).unwrap(), Value::Int(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{StoreError, StoreResult, WidecolError, WidecolResult};
pub use types::{Column, RowKey, RowResult, Value, ValueType};
