//! In-memory wide-column store.
//!
//! Rows are kept sorted by key in a `BTreeMap`, cells sorted by
//! `(family, qualifier)`. Families are strict: a table only accepts cells for
//! families it declares. A table can be switched to an unavailable state to
//! exercise failure paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use widecol_common::error::{StoreError, StoreResult};
use widecol_common::types::{Column, RowKey, RowResult};

use crate::filter::Filter;
use crate::pool::TableOpener;
use crate::table::{ColumnRef, Get, RowMutation, Scan, StoreAdmin, TableHandle};

type Cells = BTreeMap<(String, String), Bytes>;

/// Shared state of one table.
#[derive(Debug)]
struct TableData {
    name: String,
    families: RwLock<BTreeSet<String>>,
    rows: RwLock<BTreeMap<RowKey, Cells>>,
    unavailable: AtomicBool,
    mutations: AtomicU64,
}

impl TableData {
    fn new(name: &str, families: &[String]) -> Self {
        Self {
            name: name.to_string(),
            families: RwLock::new(families.iter().cloned().collect()),
            rows: RwLock::new(BTreeMap::new()),
            unavailable: AtomicBool::new(false),
            mutations: AtomicU64::new(0),
        }
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable(self.name.clone()));
        }
        Ok(())
    }

    fn check_family(&self, family: &str) -> StoreResult<()> {
        if self.families.read().contains(family) {
            Ok(())
        } else {
            Err(StoreError::NoSuchFamily {
                table: self.name.clone(),
                family: family.to_string(),
            })
        }
    }

    fn check_columns(&self, columns: &[ColumnRef]) -> StoreResult<()> {
        columns.iter().try_for_each(|c| self.check_family(&c.family))
    }

    /// Builds the visible row: projection first, then the filter.
    fn materialize(
        key: &RowKey,
        cells: &Cells,
        columns: &[ColumnRef],
        filter: Option<&Filter>,
    ) -> Option<RowResult> {
        let cells = cells
            .iter()
            .map(|((family, qualifier), value)| Column::new(family.as_str(), qualifier.as_str(), value.clone()))
            .filter(|cell| columns.is_empty() || columns.iter().any(|c| c.covers(cell)))
            .collect::<Vec<_>>();
        if cells.is_empty() {
            return None;
        }
        let row = RowResult::new(key.clone(), cells);
        match filter {
            Some(filter) => filter.apply(row),
            None => Some(row),
        }
    }
}

/// A handle onto one table of a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryTable {
    data: Arc<TableData>,
}

impl TableHandle for MemoryTable {
    fn name(&self) -> &str {
        &self.data.name
    }

    fn get(&self, get: &Get) -> StoreResult<Option<RowResult>> {
        self.data.check_available()?;
        self.data.check_columns(&get.columns)?;

        let rows = self.data.rows.read();
        Ok(rows
            .get(&get.key)
            .and_then(|cells| TableData::materialize(&get.key, cells, &get.columns, get.filter.as_ref())))
    }

    fn scan(&self, scan: &Scan) -> StoreResult<Vec<RowResult>> {
        self.data.check_available()?;
        self.data.check_columns(&scan.columns)?;

        let limit = scan.limit.unwrap_or(usize::MAX);
        let rows = self.data.rows.read();
        Ok(rows
            .iter()
            .skip_while(|(key, _)| scan.start.as_ref().is_some_and(|s| *key < s))
            .take_while(|(key, _)| scan.stop.as_ref().map_or(true, |s| *key < s))
            .filter_map(|(key, cells)| TableData::materialize(key, cells, &scan.columns, scan.filter.as_ref()))
            .take(limit)
            .collect())
    }

    fn mutate(&self, mutation: &RowMutation) -> StoreResult<()> {
        self.data.check_available()?;
        self.data.check_columns(&mutation.deletes)?;
        for put in &mutation.puts {
            self.data.check_family(&put.family)?;
        }

        let mut rows = self.data.rows.write();
        let cells = rows.entry(mutation.key.clone()).or_default();
        for delete in &mutation.deletes {
            match &delete.qualifier {
                Some(qualifier) => {
                    cells.remove(&(delete.family.clone(), qualifier.clone()));
                }
                None => cells.retain(|(family, _), _| family != &delete.family),
            }
        }
        for put in &mutation.puts {
            cells.insert((put.family.clone(), put.qualifier.clone()), put.value.clone());
        }
        if cells.is_empty() {
            rows.remove(&mutation.key);
        }
        self.data.mutations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn delete_row(&self, key: &RowKey) -> StoreResult<()> {
        self.data.check_available()?;
        self.data.rows.write().remove(key);
        self.data.mutations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// An in-memory store holding any number of tables.
///
/// Cloning is cheap; clones share the same tables.
///
/// # Example
///
/// ```rust
/// use widecol_store::memory::MemoryStore;
/// use widecol_store::table::StoreAdmin;
///
/// let store = MemoryStore::new();
/// store.create_table("people", &["person".to_string()]).unwrap();
/// assert!(store.table_exists("people").unwrap());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<String, Arc<TableData>>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a handle onto a table.
    pub fn table(&self, table: &str) -> StoreResult<MemoryTable> {
        self.tables
            .read()
            .get(table)
            .map(|data| MemoryTable { data: Arc::clone(data) })
            .ok_or_else(|| StoreError::TableNotFound(table.to_string()))
    }

    /// Marks a table as (un)available. Unavailable tables fail every request.
    pub fn set_unavailable(&self, table: &str, unavailable: bool) -> StoreResult<()> {
        let handle = self.table(table)?;
        handle.data.unavailable.store(unavailable, Ordering::Release);
        debug!(table, unavailable, "Table availability changed");
        Ok(())
    }

    /// Returns the number of rows in a table.
    pub fn row_count(&self, table: &str) -> StoreResult<usize> {
        Ok(self.table(table)?.data.rows.read().len())
    }

    /// Returns every cell of a row, bypassing availability checks.
    pub fn row(&self, table: &str, key: &RowKey) -> StoreResult<Option<RowResult>> {
        let handle = self.table(table)?;
        let rows = handle.data.rows.read();
        Ok(rows
            .get(key)
            .and_then(|cells| TableData::materialize(key, cells, &[], None)))
    }

    /// Returns the number of mutations and row deletes applied to a table.
    pub fn mutation_count(&self, table: &str) -> StoreResult<u64> {
        Ok(self.table(table)?.data.mutations.load(Ordering::Relaxed))
    }
}

impl TableOpener for MemoryStore {
    fn open(&self, table: &str) -> StoreResult<Arc<dyn TableHandle>> {
        Ok(Arc::new(self.table(table)?))
    }
}

impl StoreAdmin for MemoryStore {
    fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(self.tables.read().contains_key(table))
    }

    fn create_table(&self, table: &str, families: &[String]) -> StoreResult<()> {
        if table.is_empty() {
            return Err(StoreError::InvalidConfig("table name must not be empty".to_string()));
        }
        let mut tables = self.tables.write();
        if tables.contains_key(table) {
            return Err(StoreError::TableExists(table.to_string()));
        }
        tables.insert(table.to_string(), Arc::new(TableData::new(table, families)));
        debug!(table, families = families.len(), "Created table");
        Ok(())
    }

    fn add_family(&self, table: &str, family: &str) -> StoreResult<()> {
        let handle = self.table(table)?;
        if handle.data.families.write().insert(family.to_string()) {
            debug!(table, family, "Added column family");
        }
        Ok(())
    }

    fn families(&self, table: &str) -> StoreResult<Vec<String>> {
        Ok(self.table(table)?.data.families.read().iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table("people", &["person".to_string(), "address".to_string()])
            .unwrap();
        store
    }

    fn put(table: &MemoryTable, key: &str, family: &str, qualifier: &str, value: &str) {
        let mut m = RowMutation::new(RowKey::from(key));
        m.put(Column::new(family, qualifier, value.to_string()));
        table.mutate(&m).unwrap();
    }

    #[test]
    fn test_admin() {
        let store = store();
        assert!(store.table_exists("people").unwrap());
        assert!(!store.table_exists("pets").unwrap());
        assert!(matches!(
            store.create_table("people", &[]),
            Err(StoreError::TableExists(_))
        ));

        store.add_family("people", "phones").unwrap();
        store.add_family("people", "phones").unwrap();
        assert_eq!(store.families("people").unwrap(), vec!["address", "person", "phones"]);
        assert!(matches!(
            store.add_family("pets", "x"),
            Err(StoreError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_put_get() {
        let store = store();
        let table = store.table("people").unwrap();
        put(&table, "p1", "person", "name", "Ann");
        put(&table, "p1", "address", "city", "Oslo");

        let row = table.get(&Get::new(RowKey::from("p1"))).unwrap().unwrap();
        assert_eq!(row.columns.len(), 2);

        let row = table
            .get(&Get::new(RowKey::from("p1")).with_columns(vec![ColumnRef::family("person")]))
            .unwrap()
            .unwrap();
        assert_eq!(row.columns.len(), 1);
        assert_eq!(row.columns[0].qualifier, "name");

        assert!(table.get(&Get::new(RowKey::from("p2"))).unwrap().is_none());
    }

    #[test]
    fn test_strict_families() {
        let store = store();
        let table = store.table("people").unwrap();
        let mut m = RowMutation::new(RowKey::from("p1"));
        m.put(Column::new("pets", "name", "Rex"));
        assert!(matches!(table.mutate(&m), Err(StoreError::NoSuchFamily { .. })));
        assert_eq!(store.row_count("people").unwrap(), 0);
    }

    #[test]
    fn test_deletes_then_puts() {
        let store = store();
        let table = store.table("people").unwrap();
        put(&table, "p1", "address", "city", "Oslo");
        put(&table, "p1", "address", "zip", "0150");

        let mut m = RowMutation::new(RowKey::from("p1"));
        m.delete(ColumnRef::family("address"));
        m.put(Column::new("address", "city", "Bergen"));
        table.mutate(&m).unwrap();

        let row = store.row("people", &RowKey::from("p1")).unwrap().unwrap();
        assert_eq!(row.columns.len(), 1);
        assert_eq!(row.columns[0].value.as_ref(), b"Bergen");

        let mut m = RowMutation::new(RowKey::from("p1"));
        m.delete(ColumnRef::column("address", "city"));
        table.mutate(&m).unwrap();
        assert_eq!(store.row_count("people").unwrap(), 0);
    }

    #[test]
    fn test_scan_range_filter_limit() {
        let store = store();
        let table = store.table("people").unwrap();
        for key in ["a", "b", "c", "d"] {
            put(&table, key, "person", "name", key);
        }
        put(&table, "c", "address", "city", "Oslo");

        let rows = table
            .scan(&Scan::range(Some(RowKey::from("b")), Some(RowKey::from("d"))))
            .unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![RowKey::from("b"), RowKey::from("c")]);

        let rows = table
            .scan(&Scan::new().with_filter(Some(Filter::family("address"))))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, RowKey::from("c"));

        let rows = table.scan(&Scan::new().with_limit(3)).unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn test_unavailable() {
        let store = store();
        let table = store.table("people").unwrap();
        put(&table, "p1", "person", "name", "Ann");

        store.set_unavailable("people", true).unwrap();
        assert!(matches!(
            table.get(&Get::new(RowKey::from("p1"))),
            Err(StoreError::Unavailable(_))
        ));
        assert!(table.scan(&Scan::new()).is_err());

        store.set_unavailable("people", false).unwrap();
        assert!(table.get(&Get::new(RowKey::from("p1"))).unwrap().is_some());
    }

    #[test]
    fn test_delete_row() {
        let store = store();
        let table = store.table("people").unwrap();
        put(&table, "p1", "person", "name", "Ann");
        table.delete_row(&RowKey::from("p1")).unwrap();
        table.delete_row(&RowKey::from("missing")).unwrap();
        assert_eq!(store.row_count("people").unwrap(), 0);
        assert_eq!(store.mutation_count("people").unwrap(), 3);
    }
}
