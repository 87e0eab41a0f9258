//! Type definitions for widecol.
//!
//! This module contains the wire-level row types and the scalar value model.

mod keys;
mod value;

pub use keys::{Column, RowKey, RowResult};
pub use value::{FromValue, Value, ValueType};
