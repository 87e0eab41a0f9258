//! Byte codecs for cell values and row keys.
//!
//! # Encoding Format
//!
//! The canonical codec writes each scalar in its natural width without a
//! type tag; the reader supplies the declared [`ValueType`]:
//! - Integers and timestamps: big-endian two's complement
//! - Floats: big-endian IEEE-754 bits
//! - Booleans: one byte, `0x00` or `0x01`
//! - Strings: UTF-8 bytes, bytes: as-is
//!
//! A zero-length cell is treated as absent by the mapper, so an empty string
//! does not survive a write/read cycle.

use bytes::Bytes;
use thiserror::Error;

use crate::types::{RowKey, Value, ValueType};

/// Errors raised while turning bytes back into a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The byte length does not match the fixed width of the type.
    #[error("expected {expected} bytes for {value_type}, got {actual}")]
    WidthMismatch {
        /// The declared type.
        value_type: ValueType,
        /// The width the type needs.
        expected: usize,
        /// The width found.
        actual: usize,
    },

    /// A string cell is not valid UTF-8.
    #[error("string value is not valid UTF-8")]
    InvalidUtf8,

    /// A boolean cell holds something other than 0 or 1.
    #[error("invalid boolean byte {0:#04x}")]
    InvalidBoolean(u8),
}

/// Converts scalar values to and from cell bytes.
///
/// The same codec instance must be used for writing and reading a column.
pub trait ByteCodec: Send + Sync + std::fmt::Debug {
    /// Encodes a value into cell bytes.
    fn encode(&self, value: &Value) -> Bytes;

    /// Decodes cell bytes written for `value_type`.
    fn decode(&self, value_type: ValueType, bytes: &[u8]) -> Result<Value, CodecError>;

    /// Encodes an identifier value into a row key.
    fn encode_key(&self, value: &Value) -> RowKey {
        RowKey::from_raw(self.encode(value))
    }

    /// Decodes a row key back into an identifier value.
    fn decode_key(&self, value_type: ValueType, key: &RowKey) -> Result<Value, CodecError> {
        self.decode(value_type, key.as_bytes())
    }
}

/// The default codec, compatible with the usual wide-column byte helpers.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalCodec;

impl CanonicalCodec {
    /// Creates the codec.
    pub const fn new() -> Self {
        Self
    }
}

fn fixed<const N: usize>(value_type: ValueType, bytes: &[u8]) -> Result<[u8; N], CodecError> {
    bytes.try_into().map_err(|_| CodecError::WidthMismatch {
        value_type,
        expected: N,
        actual: bytes.len(),
    })
}

impl ByteCodec for CanonicalCodec {
    fn encode(&self, value: &Value) -> Bytes {
        match value {
            Value::Boolean(b) => Bytes::copy_from_slice(&[u8::from(*b)]),
            Value::SmallInt(i) => Bytes::copy_from_slice(&i.to_be_bytes()),
            Value::Int(i) => Bytes::copy_from_slice(&i.to_be_bytes()),
            Value::BigInt(i) | Value::Timestamp(i) => Bytes::copy_from_slice(&i.to_be_bytes()),
            Value::Float(f) => Bytes::copy_from_slice(&f.to_bits().to_be_bytes()),
            Value::Double(f) => Bytes::copy_from_slice(&f.to_bits().to_be_bytes()),
            Value::String(s) => Bytes::copy_from_slice(s.as_bytes()),
            Value::Bytes(b) => b.clone(),
        }
    }

    fn decode(&self, value_type: ValueType, bytes: &[u8]) -> Result<Value, CodecError> {
        let value = match value_type {
            ValueType::Boolean => match fixed::<1>(value_type, bytes)?[0] {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => return Err(CodecError::InvalidBoolean(other)),
            },
            ValueType::SmallInt => Value::SmallInt(i16::from_be_bytes(fixed(value_type, bytes)?)),
            ValueType::Int => Value::Int(i32::from_be_bytes(fixed(value_type, bytes)?)),
            ValueType::BigInt => Value::BigInt(i64::from_be_bytes(fixed(value_type, bytes)?)),
            ValueType::Timestamp => Value::Timestamp(i64::from_be_bytes(fixed(value_type, bytes)?)),
            ValueType::Float => {
                Value::Float(f32::from_bits(u32::from_be_bytes(fixed(value_type, bytes)?)))
            }
            ValueType::Double => {
                Value::Double(f64::from_bits(u64::from_be_bytes(fixed(value_type, bytes)?)))
            }
            ValueType::String => Value::String(
                std::str::from_utf8(bytes)
                    .map_err(|_| CodecError::InvalidUtf8)?
                    .to_string(),
            ),
            ValueType::Bytes => Value::Bytes(Bytes::copy_from_slice(bytes)),
        };
        Ok(value)
    }
}
