//! Row keys and columns.
//!
//! These types describe the wire shape of a wide-column row: a byte row key
//! and a set of `(family, qualifier, value)` cells.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Deref;

/// A row key.
///
/// Row keys are the byte encoding of an entity's identifier. They order
/// lexicographically, which is the order range scans return rows in.
///
/// # Example
///
/// ```rust
/// use widecol_common::types::RowKey;
///
/// let key = RowKey::from_bytes(b"user:1234");
/// assert_eq!(key.len(), 9);
/// ```
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey(Bytes);

impl RowKey {
    /// Creates an empty key.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self(Bytes::new())
    }

    /// Creates a key from a byte slice.
    #[inline]
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Creates a key from owned bytes.
    #[inline]
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }

    /// Creates a key from a `Bytes` instance.
    #[inline]
    #[must_use]
    pub const fn from_raw(bytes: Bytes) -> Self {
        Self(bytes)
    }

    /// Returns the length of the key in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the key as a byte slice.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Checks if this key starts with the given prefix.
    #[inline]
    #[must_use]
    pub fn starts_with(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Returns the smallest key strictly greater than this key.
    ///
    /// Used to resume a scan right after the last row returned.
    #[must_use]
    pub fn next_key(&self) -> Self {
        let mut bytes = Vec::with_capacity(self.0.len() + 1);
        bytes.extend_from_slice(&self.0);
        bytes.push(0x00);
        Self::from_vec(bytes)
    }
}

impl Default for RowKey {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deref for RowKey {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for RowKey {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Ord for RowKey {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for RowKey {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Try to display as UTF-8 string if valid, otherwise show hex
        match std::str::from_utf8(&self.0) {
            Ok(s) if s.chars().all(|c| !c.is_control() || c == ' ') => {
                write!(f, "RowKey({:?})", s)
            }
            _ => {
                write!(f, "RowKey(0x")?;
                for byte in &self.0[..self.0.len().min(32)] {
                    write!(f, "{byte:02x}")?;
                }
                if self.0.len() > 32 {
                    write!(f, "...")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<&[u8]> for RowKey {
    #[inline]
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for RowKey {
    #[inline]
    fn from(vec: Vec<u8>) -> Self {
        Self::from_vec(vec)
    }
}

impl From<&str> for RowKey {
    #[inline]
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<Bytes> for RowKey {
    #[inline]
    fn from(bytes: Bytes) -> Self {
        Self::from_raw(bytes)
    }
}

/// A single cell of a wide-column row.
///
/// The qualifier is unique within `(family, row)`. A zero-length value is
/// read back as "absent".
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Column {
    /// Column family.
    pub family: String,
    /// Qualifier within the family.
    pub qualifier: String,
    /// Cell value.
    pub value: Bytes,
}

impl Column {
    /// Creates a new column.
    pub fn new(family: impl Into<String>, qualifier: impl Into<String>, value: impl Into<Bytes>) -> Self {
        Self {
            family: family.into(),
            qualifier: qualifier.into(),
            value: value.into(),
        }
    }

    /// Returns true if this cell carries no bytes.
    #[inline]
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.value.is_empty()
    }
}

impl fmt::Debug for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Column({}:{} = {} bytes)",
            self.family,
            self.qualifier,
            self.value.len()
        )
    }
}

/// One row as returned by a get or scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowResult {
    /// The row key.
    pub key: RowKey,
    /// Cells ordered by `(family, qualifier)`.
    pub columns: Vec<Column>,
}

impl RowResult {
    /// Creates a new row result.
    pub fn new(key: RowKey, columns: Vec<Column>) -> Self {
        Self { key, columns }
    }

    /// Returns true if the row has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Returns the cell at `(family, qualifier)`, if present.
    #[must_use]
    pub fn column(&self, family: &str, qualifier: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.family == family && c.qualifier == qualifier)
    }

    /// Iterates over the cells of one family.
    pub fn family<'a>(&'a self, family: &'a str) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns.iter().filter(move |c| c.family == family)
    }
}
