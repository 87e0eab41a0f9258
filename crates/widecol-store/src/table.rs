//! Table handle abstraction.
//!
//! A `TableHandle` is the store client's view of one table. Handles are
//! obtained from a [`ConnectionBroker`](crate::pool::ConnectionBroker) and
//! must be released after each unit of work.

use std::fmt;

use widecol_common::error::StoreResult;
use widecol_common::types::{Column, RowKey, RowResult};

use crate::filter::Filter;

/// Addresses one column or a whole family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    /// Column family.
    pub family: String,
    /// Qualifier, or `None` for every qualifier of the family.
    pub qualifier: Option<String>,
}

impl ColumnRef {
    /// Addresses a single column.
    pub fn column(family: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: Some(qualifier.into()),
        }
    }

    /// Addresses a whole family.
    pub fn family(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            qualifier: None,
        }
    }

    /// Returns true if the cell falls under this reference.
    #[must_use]
    pub fn covers(&self, column: &Column) -> bool {
        self.family == column.family
            && self
                .qualifier
                .as_deref()
                .map_or(true, |q| q == column.qualifier)
    }
}

/// Point read of one row.
#[derive(Debug, Clone)]
pub struct Get {
    /// Row to read.
    pub key: RowKey,
    /// Columns to return; empty means all.
    pub columns: Vec<ColumnRef>,
    /// Optional predicate.
    pub filter: Option<Filter>,
}

impl Get {
    /// Reads every column of a row.
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            columns: Vec::new(),
            filter: None,
        }
    }

    /// Restricts the returned columns.
    pub fn with_columns(mut self, columns: Vec<ColumnRef>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the predicate.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }
}

/// Range read over ordered row keys.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// First row key, inclusive. `None` starts at the beginning.
    pub start: Option<RowKey>,
    /// Last row key, exclusive. `None` runs to the end.
    pub stop: Option<RowKey>,
    /// Columns to return; empty means all.
    pub columns: Vec<ColumnRef>,
    /// Optional predicate.
    pub filter: Option<Filter>,
    /// Maximum rows returned.
    pub limit: Option<usize>,
}

impl Scan {
    /// Scans the whole table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `[start, stop)`.
    pub fn range(start: Option<RowKey>, stop: Option<RowKey>) -> Self {
        Self {
            start,
            stop,
            ..Self::default()
        }
    }

    /// Restricts the returned columns.
    pub fn with_columns(mut self, columns: Vec<ColumnRef>) -> Self {
        self.columns = columns;
        self
    }

    /// Sets the predicate.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    /// Sets the row limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if `key` lies inside `[start, stop)`.
    #[must_use]
    pub fn contains(&self, key: &RowKey) -> bool {
        self.start.as_ref().map_or(true, |s| key >= s) && self.stop.as_ref().map_or(true, |s| key < s)
    }
}

/// All changes to one row, applied atomically by the store.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RowMutation {
    /// The row.
    pub key: RowKey,
    /// Cells to write.
    pub puts: Vec<Column>,
    /// Cells or families to remove before the puts are applied.
    pub deletes: Vec<ColumnRef>,
}

impl RowMutation {
    /// Creates an empty mutation for a row.
    pub fn new(key: RowKey) -> Self {
        Self {
            key,
            puts: Vec::new(),
            deletes: Vec::new(),
        }
    }

    /// Adds a cell.
    pub fn put(&mut self, column: Column) {
        self.puts.push(column);
    }

    /// Removes a cell or family.
    pub fn delete(&mut self, column: ColumnRef) {
        self.deletes.push(column);
    }

    /// Returns true if the mutation changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

impl fmt::Debug for RowMutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowMutation")
            .field("key", &self.key)
            .field("puts", &self.puts.len())
            .field("deletes", &self.deletes.len())
            .finish()
    }
}

/// Client view of one wide-column table.
pub trait TableHandle: Send + Sync {
    /// Returns the table name.
    fn name(&self) -> &str;

    /// Reads one row.
    fn get(&self, get: &Get) -> StoreResult<Option<RowResult>>;

    /// Reads several rows, skipping missing ones. Output follows input order.
    fn get_many(&self, gets: &[Get]) -> StoreResult<Vec<RowResult>> {
        let mut rows = Vec::with_capacity(gets.len());
        for get in gets {
            if let Some(row) = self.get(get)? {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Reads rows in key order.
    fn scan(&self, scan: &Scan) -> StoreResult<Vec<RowResult>>;

    /// Applies a row mutation.
    fn mutate(&self, mutation: &RowMutation) -> StoreResult<()>;

    /// Applies mutations in order. Rows applied before a failure stay applied.
    fn mutate_all(&self, mutations: &[RowMutation]) -> StoreResult<()> {
        for mutation in mutations {
            self.mutate(mutation)?;
        }
        Ok(())
    }

    /// Removes a whole row.
    fn delete_row(&self, key: &RowKey) -> StoreResult<()>;
}

impl fmt::Debug for dyn TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle").field("name", &self.name()).finish()
    }
}

/// Table and family administration.
pub trait StoreAdmin: Send + Sync {
    /// Returns true if the table exists.
    fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Creates a table with the given families.
    fn create_table(&self, table: &str, families: &[String]) -> StoreResult<()>;

    /// Adds a family to an existing table.
    fn add_family(&self, table: &str, family: &str) -> StoreResult<()>;

    /// Lists the families of a table.
    fn families(&self, table: &str) -> StoreResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_ref_covers() {
        let cell = Column::new("person", "name", "Ann");
        assert!(ColumnRef::family("person").covers(&cell));
        assert!(ColumnRef::column("person", "name").covers(&cell));
        assert!(!ColumnRef::column("person", "age").covers(&cell));
        assert!(!ColumnRef::family("address").covers(&cell));
    }

    #[test]
    fn test_scan_contains() {
        let scan = Scan::range(Some(RowKey::from("b")), Some(RowKey::from("d")));
        assert!(!scan.contains(&RowKey::from("a")));
        assert!(scan.contains(&RowKey::from("b")));
        assert!(scan.contains(&RowKey::from("c9")));
        assert!(!scan.contains(&RowKey::from("d")));
        assert!(Scan::new().contains(&RowKey::from("anything")));
    }

    #[test]
    fn test_row_mutation() {
        let mut m = RowMutation::new(RowKey::from("r"));
        assert!(m.is_empty());
        m.put(Column::new("f", "q", "v"));
        m.delete(ColumnRef::column("f", "old"));
        assert!(!m.is_empty());
        assert_eq!(m.puts.len(), 1);
        assert_eq!(m.deletes.len(), 1);
    }
}
