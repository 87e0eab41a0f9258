//! The data handler.
//!
//! [`DataHandler`] is the entry point of the mapper. It acquires a table
//! handle per unit of work, applies the registered read predicates, and runs
//! the codec over what it reads and writes. Every handle is released through
//! a scoped guard, so error paths release too.

use std::sync::Arc;

use tracing::{debug, error, warn};

use widecol_common::codec::{ByteCodec, CanonicalCodec};
use widecol_common::config::MapperConfig;
use widecol_common::constants::DEFAULT_FETCH_SIZE;
use widecol_common::error::{StoreError, WidecolError, WidecolResult};
use widecol_common::types::{RowKey, RowResult, Value, ValueType};
use widecol_store::filter::Filter;
use widecol_store::pool::{ConnectionBroker, PooledTable};
use widecol_store::table::{ColumnRef, Get, RowMutation, Scan, StoreAdmin};

use crate::codec::{decode, encode, DecodedEntity};
use crate::collection_index::ElementCollectionIndex;
use crate::cursor::{check_fetch_size, ScanCursor};
use crate::filter::FilterRegistry;
use crate::metadata::EntityDescriptor;
use crate::relation::{self, RelationValue};

/// Row mutations for one table, applied as a unit of a batch write.
#[derive(Debug, Clone)]
pub struct BatchGroup {
    /// Target table.
    pub table: String,
    /// Mutations in application order.
    pub rows: Vec<RowMutation>,
}

impl BatchGroup {
    /// Creates an empty group for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            rows: Vec::new(),
        }
    }

    /// Appends a mutation.
    pub fn push(&mut self, mutation: RowMutation) {
        self.rows.push(mutation);
    }
}

/// Reads and writes entities through pooled table handles.
///
/// Cloning a handler with [`handle`](Self::handle) yields an independent
/// cursor that shares the predicates and the collection index. Resetting
/// predicates detaches only the handler that resets.
pub struct DataHandler {
    broker: Arc<dyn ConnectionBroker>,
    admin: Arc<dyn StoreAdmin>,
    filters: Arc<FilterRegistry>,
    index: Arc<ElementCollectionIndex>,
    codec: Arc<dyn ByteCodec>,
    fetch_size: usize,
    cursor: Option<ScanCursor>,
}

impl DataHandler {
    /// Creates a handler with default settings.
    pub fn new(broker: Arc<dyn ConnectionBroker>, admin: Arc<dyn StoreAdmin>) -> Self {
        Self {
            broker,
            admin,
            filters: Arc::new(FilterRegistry::new()),
            index: Arc::new(ElementCollectionIndex::new()),
            codec: Arc::new(CanonicalCodec::new()),
            fetch_size: DEFAULT_FETCH_SIZE,
            cursor: None,
        }
    }

    /// Creates a handler from a validated configuration.
    pub fn with_config(
        broker: Arc<dyn ConnectionBroker>,
        admin: Arc<dyn StoreAdmin>,
        config: &MapperConfig,
    ) -> WidecolResult<Self> {
        config.validate()?;
        let mut handler = Self::new(broker, admin);
        handler.fetch_size = config.fetch_size;
        Ok(handler)
    }

    /// Sets the codec used for keys and values not tied to a descriptor.
    pub fn with_codec(mut self, codec: Arc<dyn ByteCodec>) -> Self {
        self.codec = codec;
        self
    }

    /// Returns a new handler sharing this one's predicates and collection
    /// index, with its own cursor.
    pub fn handle(&self) -> Self {
        Self {
            broker: Arc::clone(&self.broker),
            admin: Arc::clone(&self.admin),
            filters: Arc::clone(&self.filters),
            index: Arc::clone(&self.index),
            codec: Arc::clone(&self.codec),
            fetch_size: self.fetch_size,
            cursor: None,
        }
    }

    /// Returns the predicate registry.
    pub fn filters(&self) -> &Arc<FilterRegistry> {
        &self.filters
    }

    /// Returns the collection index.
    pub fn collection_index(&self) -> &Arc<ElementCollectionIndex> {
        &self.index
    }

    fn table(&self, table: &str) -> WidecolResult<PooledTable<'_>> {
        let handle = PooledTable::acquire(self.broker.as_ref(), table)?;
        debug!(table, "Acquired table handle");
        Ok(handle)
    }

    fn decode_row<E>(
        &self,
        table: &str,
        row: &RowResult,
        descriptor: &EntityDescriptor<E>,
        relation_names: &[String],
        index: Option<&ElementCollectionIndex>,
    ) -> WidecolResult<DecodedEntity<E>> {
        decode(row, descriptor, relation_names, index).map_err(|e| {
            error!(table, key = ?row.key, error = %e, "Failed to decode row");
            e
        })
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Creates `table` with `families`, or adds the missing families if the
    /// table already exists.
    pub fn create_table_if_not_exists(&self, table: &str, families: &[String]) -> WidecolResult<()> {
        let exists = self
            .admin
            .table_exists(table)
            .map_err(|e| WidecolError::configuration(table, e))?;
        if !exists {
            match self.admin.create_table(table, families) {
                Ok(()) => {
                    debug!(table, families = families.len(), "Created table");
                    return Ok(());
                }
                // Created concurrently; fall through and reconcile families.
                Err(StoreError::TableExists(_)) => {}
                Err(e) => return Err(WidecolError::configuration(table, e)),
            }
        }
        families
            .iter()
            .try_for_each(|family| self.add_column_family(table, family))
    }

    /// Adds `family` to `table` unless it is already there.
    ///
    /// A missing table is logged and left alone.
    pub fn add_column_family(&self, table: &str, family: &str) -> WidecolResult<()> {
        let exists = self
            .admin
            .table_exists(table)
            .map_err(|e| WidecolError::configuration(table, e))?;
        if !exists {
            warn!(table, family, "Cannot add column family: table does not exist");
            return Ok(());
        }
        let families = self
            .admin
            .families(table)
            .map_err(|e| WidecolError::configuration(table, e))?;
        if families.iter().any(|f| f == family) {
            return Ok(());
        }
        self.admin
            .add_family(table, family)
            .map_err(|e| WidecolError::configuration(table, e))?;
        debug!(table, family, "Added column family");
        Ok(())
    }

    /// Creates every family rows of `descriptor` need in `table`.
    pub fn ensure_schema<E>(&self, table: &str, descriptor: &EntityDescriptor<E>) -> WidecolResult<()> {
        self.create_table_if_not_exists(table, &descriptor.families())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    #[allow(clippy::too_many_arguments)]
    fn read_row<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        key: &Value,
        relation_names: &[String],
        filter: Option<Filter>,
        columns: &[ColumnRef],
        index: Option<&ElementCollectionIndex>,
    ) -> WidecolResult<Option<DecodedEntity<E>>> {
        let get = Get::new(descriptor.row_key(key)?)
            .with_columns(columns.to_vec())
            .with_filter(self.filters.combine(filter, descriptor.family()));
        let row = self.table(table)?.get(&get)?;
        row.map(|row| self.decode_row(table, &row, descriptor, relation_names, index))
            .transpose()
    }

    /// Reads one entity by identifier.
    ///
    /// `columns` restricts the cells read; empty reads all of them.
    pub fn read_one<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        key: &Value,
        relation_names: &[String],
        filter: Option<Filter>,
        columns: &[ColumnRef],
    ) -> WidecolResult<Option<DecodedEntity<E>>> {
        self.read_row(table, descriptor, key, relation_names, filter, columns, None)
    }

    /// Reads one entity and remembers its collection elements, so that a
    /// following [`write`](Self::write) of the same row keeps their indices.
    ///
    /// Elements are remembered by allocation, and the index holds a clone of
    /// each `Arc` until that write. `Arc::get_mut` therefore fails on loaded
    /// elements; replacing an element with a new `Arc` stores it as a new
    /// element under a fresh index.
    pub fn read_for_update<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        key: &Value,
        relation_names: &[String],
    ) -> WidecolResult<Option<DecodedEntity<E>>> {
        self.read_row(table, descriptor, key, relation_names, None, &[], Some(self.index.as_ref()))
    }

    /// Reads several entities; missing rows are skipped.
    pub fn read_many<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        keys: &[Value],
        relation_names: &[String],
        columns: &[ColumnRef],
    ) -> WidecolResult<Vec<DecodedEntity<E>>> {
        let filter = self.filters.effective(descriptor.family());
        let gets = keys
            .iter()
            .map(|key| {
                descriptor.row_key(key).map(|row_key| {
                    Get::new(row_key)
                        .with_columns(columns.to_vec())
                        .with_filter(filter.clone())
                })
            })
            .collect::<WidecolResult<Vec<_>>>()?;

        let rows = self.table(table)?.get_many(&gets)?;
        rows.iter()
            .map(|row| self.decode_row(table, row, descriptor, relation_names, None))
            .collect()
    }

    /// Reads the entities whose identifiers fall in `[start, end)`, in row
    /// key order. `None` leaves that side of the range open.
    pub fn read_range<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        start: Option<&Value>,
        end: Option<&Value>,
        filter: Option<Filter>,
        columns: &[ColumnRef],
    ) -> WidecolResult<Vec<DecodedEntity<E>>> {
        let scan = Scan::range(
            start.map(|k| descriptor.row_key(k)).transpose()?,
            end.map(|k| descriptor.row_key(k)).transpose()?,
        )
        .with_columns(columns.to_vec())
        .with_filter(self.filters.combine(filter, descriptor.family()));

        let rows = self.table(table)?.scan(&scan)?;
        let relation_names = descriptor.relation_names();
        rows.iter()
            .map(|row| self.decode_row(table, row, descriptor, &relation_names, None))
            .collect()
    }

    fn column_scan(&self, filter: Option<Filter>, family: &str, qualifier: Option<&str>) -> Scan {
        let column = ColumnRef {
            family: family.to_string(),
            qualifier: qualifier.map(str::to_string),
        };
        Scan::new()
            .with_columns(vec![column])
            .with_filter(self.filters.combine(filter, family))
    }

    /// Scans the whole table for rows holding `family` (or one column of it)
    /// and decodes each of those rows in full.
    ///
    /// The column only selects rows; the predicates apply to the selection.
    pub fn scan<E>(
        &self,
        filter: Option<Filter>,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        family: &str,
        qualifier: Option<&str>,
    ) -> WidecolResult<Vec<DecodedEntity<E>>> {
        let handle = self.table(table)?;
        let gets: Vec<_> = handle
            .scan(&self.column_scan(filter, family, qualifier))?
            .into_iter()
            .map(|row| Get::new(row.key))
            .collect();
        if gets.is_empty() {
            return Ok(Vec::new());
        }
        let rows = handle.get_many(&gets)?;
        debug!(table, family, rows = rows.len(), "Scanned rows by column");
        let relation_names = descriptor.relation_names();
        rows.iter()
            .map(|row| self.decode_row(table, row, descriptor, &relation_names, None))
            .collect()
    }

    /// Returns the keys of rows holding `family` (or one column of it).
    pub fn scan_row_keys(
        &self,
        filter: Option<Filter>,
        table: &str,
        family: &str,
        qualifier: Option<&str>,
    ) -> WidecolResult<Vec<RowKey>> {
        let scan = self.column_scan(filter, family, qualifier);
        let rows = self.table(table)?.scan(&scan)?;
        Ok(rows.into_iter().map(|row| row.key).collect())
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Encodes an entity into a row mutation without applying it.
    ///
    /// Collection state recorded for the row is consumed.
    pub fn prepare<E>(
        &self,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
        key: &Value,
        relations: &[RelationValue],
    ) -> WidecolResult<RowMutation> {
        let row_key = descriptor.row_key(key)?;
        let encoded = encode(entity, descriptor, &row_key, relations, &self.index);
        self.index.clear_row(&row_key);
        Ok(encoded?.into_mutation())
    }

    /// Writes an entity, with its relation markers, to `table`.
    pub fn write<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        entity: &E,
        key: &Value,
        relations: &[RelationValue],
    ) -> WidecolResult<()> {
        let mutation = self.prepare(descriptor, entity, key, relations)?;
        if mutation.is_empty() {
            debug!(table, key = ?mutation.key, "Nothing to write");
            return Ok(());
        }
        self.table(table)?.mutate(&mutation)?;
        debug!(
            table,
            key = ?mutation.key,
            puts = mutation.puts.len(),
            deletes = mutation.deletes.len(),
            "Wrote entity"
        );
        Ok(())
    }

    /// Writes a join row: one column per `(qualifier, value)` in
    /// `relation_family`.
    pub fn write_relation_row(
        &self,
        table: &str,
        key: &Value,
        columns: &[(String, Value)],
        relation_family: &str,
    ) -> WidecolResult<()> {
        let mut mutation = RowMutation::new(self.codec.encode_key(key));
        mutation.puts = relation::encode_join_row(relation_family, columns, self.codec.as_ref());
        if mutation.is_empty() {
            return Ok(());
        }
        self.table(table)?.mutate(&mutation)?;
        debug!(table, key = ?mutation.key, columns = mutation.puts.len(), "Wrote join row");
        Ok(())
    }

    /// Applies groups in order.
    ///
    /// There is no atomicity across rows: when a group fails, earlier groups
    /// stay applied and the error is returned.
    pub fn batch_write(&self, groups: &[BatchGroup]) -> WidecolResult<()> {
        for group in groups {
            self.table(&group.table)?.mutate_all(&group.rows).map_err(|e| {
                error!(table = %group.table, error = %e, "Batch group failed");
                e
            })?;
            debug!(table = %group.table, rows = group.rows.len(), "Applied batch group");
        }
        Ok(())
    }

    /// Deletes a row, or only one family of it.
    ///
    /// The key is encoded with the handler's codec.
    pub fn delete_row(&self, table: &str, key: &Value, family: Option<&str>) -> WidecolResult<()> {
        let row_key = self.codec.encode_key(key);
        let handle = self.table(table)?;
        match family {
            Some(family) => {
                let mut mutation = RowMutation::new(row_key);
                mutation.delete(ColumnRef::family(family));
                handle.mutate(&mutation)?;
            }
            None => handle.delete_row(&row_key)?,
        }
        Ok(())
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Returns the foreign keys stored in the join row `key` of `join_table`.
    ///
    /// Lookup failures are logged and yield an empty list.
    pub fn foreign_keys_from_join_table(
        &self,
        join_table: &str,
        key: &Value,
        inverse_join_column: &str,
        target_type: ValueType,
    ) -> Vec<Value> {
        let get = Get::new(self.codec.encode_key(key)).with_columns(vec![ColumnRef::family(join_table)]);
        let row = PooledTable::acquire(self.broker.as_ref(), join_table).and_then(|table| table.get(&get));
        match row {
            Ok(Some(row)) => {
                relation::foreign_keys(&row, join_table, inverse_join_column, target_type, self.codec.as_ref())
            }
            Ok(None) => Vec::new(),
            Err(source) => {
                let err = WidecolError::RelationLookup {
                    table: join_table.to_string(),
                    source,
                };
                warn!(join_table, error = %err, "Relation lookup failed, returning no foreign keys");
                Vec::new()
            }
        }
    }

    /// Finding owners from a join table needs a reverse scan over every join
    /// row and is not supported by the wide-column mapping.
    pub fn find_parent_entity_from_join_table(
        &self,
        join_table: &str,
        _join_column: &str,
        _inverse_join_column: &str,
        _child_id: &Value,
    ) -> WidecolResult<Vec<Value>> {
        Err(WidecolError::not_supported(format!(
            "find parent entity from join table '{join_table}'"
        )))
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    /// ANDs a predicate into the global predicate.
    pub fn set_filter(&self, filter: Filter) {
        self.filters.set_filter(filter);
    }

    /// Adds a predicate for reads of `family`.
    pub fn add_filter(&self, family: &str, filter: Filter) {
        self.filters.add_filter(family, filter);
    }

    /// Drops every predicate of this handler and its open cursor.
    ///
    /// Handlers sharing the previous predicates keep them.
    pub fn reset_filter(&mut self) {
        self.filters = Arc::new(FilterRegistry::new());
        if let Some(cursor) = &mut self.cursor {
            cursor.set_filters(Arc::clone(&self.filters));
        }
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// Sets the batch size of cursors, including the open one.
    pub fn set_fetch_size(&mut self, fetch_size: usize) -> WidecolResult<()> {
        check_fetch_size(fetch_size)?;
        self.fetch_size = fetch_size;
        if let Some(cursor) = &mut self.cursor {
            cursor.set_fetch_size(fetch_size)?;
        }
        Ok(())
    }

    /// Returns the cursor batch size.
    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Creates a standalone cursor over `[start, end)`.
    pub fn scan_cursor<E>(
        &self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        start: Option<&Value>,
        end: Option<&Value>,
        filter: Option<Filter>,
        columns: &[ColumnRef],
    ) -> WidecolResult<ScanCursor> {
        let scan = Scan::range(
            start.map(|k| descriptor.row_key(k)).transpose()?,
            end.map(|k| descriptor.row_key(k)).transpose()?,
        )
        .with_columns(columns.to_vec())
        .with_filter(filter);

        ScanCursor::new(
            Arc::clone(&self.broker),
            Arc::clone(&self.filters),
            table,
            descriptor.family(),
            scan,
            descriptor.relation_names(),
            self.fetch_size,
        )
    }

    /// Opens the handler's cursor over `[start, end)`, replacing any open one.
    pub fn open_scan<E>(
        &mut self,
        table: &str,
        descriptor: &EntityDescriptor<E>,
        start: Option<&Value>,
        end: Option<&Value>,
        filter: Option<Filter>,
        columns: &[ColumnRef],
    ) -> WidecolResult<()> {
        self.cursor = Some(self.scan_cursor(table, descriptor, start, end, filter, columns)?);
        Ok(())
    }

    /// Returns true if the open cursor has another row.
    pub fn has_next(&mut self) -> WidecolResult<bool> {
        match &mut self.cursor {
            Some(cursor) => cursor.has_next(),
            None => Ok(false),
        }
    }

    /// Decodes the next row of the open cursor.
    pub fn next<E>(&mut self, descriptor: &EntityDescriptor<E>) -> WidecolResult<DecodedEntity<E>> {
        self.cursor
            .as_mut()
            .ok_or(WidecolError::IteratorExhausted)?
            .next(descriptor)
    }

    /// Rewinds the open cursor and drops every predicate.
    pub fn reset(&mut self) {
        self.reset_filter();
        if let Some(cursor) = &mut self.cursor {
            cursor.rewind();
        }
    }
}

impl std::fmt::Debug for DataHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataHandler")
            .field("fetch_size", &self.fetch_size)
            .field("filters", &self.filters)
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Builds a join row column list from `(qualifier, value)` pairs.
pub fn join_columns<I, Q, V>(pairs: I) -> Vec<(String, Value)>
where
    I: IntoIterator<Item = (Q, V)>,
    Q: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(q, v)| (q.into(), v.into())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use widecol_common::error::ErrorCode;
    use widecol_store::memory::MemoryStore;
    use widecol_store::pool::TablePool;

    use crate::metadata::extract;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Book {
        isbn: String,
        title: Option<String>,
        pages: Option<i32>,
    }

    fn descriptor() -> EntityDescriptor<Book> {
        EntityDescriptor::<Book>::builder_with_default("Book", "book")
            .id("isbn", ValueType::String, |b| Value::from(b.isbn.as_str()), |b, v| {
                b.isbn = extract(&v)?;
                Ok(())
            })
            .scalar("title", ValueType::String, |b| b.title.as_deref().map(Value::from), |b, v| {
                b.title = Some(extract(&v)?);
                Ok(())
            })
            .scalar("pages", ValueType::Int, |b| b.pages.map(Value::from), |b, v| {
                b.pages = Some(extract(&v)?);
                Ok(())
            })
            .relation("author", ValueType::String)
            .build()
            .unwrap()
    }

    fn book(isbn: &str, title: &str, pages: i32) -> Book {
        Book {
            isbn: isbn.to_string(),
            title: Some(title.to_string()),
            pages: Some(pages),
        }
    }

    fn handler() -> (MemoryStore, Arc<TablePool>, DataHandler) {
        let store = MemoryStore::new();
        let pool = Arc::new(TablePool::with_defaults(Arc::new(store.clone())).unwrap());
        let handler = DataHandler::new(
            Arc::clone(&pool) as Arc<dyn ConnectionBroker>,
            Arc::new(store.clone()),
        );
        handler.ensure_schema("books", &descriptor()).unwrap();
        (store, pool, handler)
    }

    fn write(handler: &DataHandler, b: &Book) {
        handler
            .write("books", &descriptor(), b, &Value::from(b.isbn.as_str()), &[])
            .unwrap();
    }

    #[test]
    fn test_ensure_schema() {
        let (store, _pool, handler) = handler();
        assert_eq!(store.families("books").unwrap(), vec!["author", "book"]);

        // Existing tables gain missing families.
        handler
            .create_table_if_not_exists("books", &["extra".to_string()])
            .unwrap();
        assert_eq!(store.families("books").unwrap(), vec!["author", "book", "extra"]);

        // A missing table is left alone.
        handler.add_column_family("shelves", "shelf").unwrap();
        assert!(!store.table_exists("shelves").unwrap());
    }

    #[test]
    fn test_write_read_one() {
        let (_store, pool, handler) = handler();
        let descriptor = descriptor();
        let b = book("111", "Dune", 412);
        write(&handler, &b);

        let found = handler
            .read_one("books", &descriptor, &Value::from("111"), &[], None, &[])
            .unwrap()
            .unwrap();
        assert_eq!(found.into_entity(), b);

        let missing = handler
            .read_one("books", &descriptor, &Value::from("999"), &[], None, &[])
            .unwrap();
        assert!(missing.is_none());
        assert_eq!(pool.stats().active_handles, 0);
    }

    #[test]
    fn test_read_one_projection() {
        let (_store, _pool, handler) = handler();
        let descriptor = descriptor();
        write(&handler, &book("111", "Dune", 412));

        let found = handler
            .read_one(
                "books",
                &descriptor,
                &Value::from("111"),
                &[],
                None,
                &[ColumnRef::column("book", "title")],
            )
            .unwrap()
            .unwrap()
            .into_entity();
        assert_eq!(found.title.as_deref(), Some("Dune"));
        assert_eq!(found.pages, None);
    }

    #[test]
    fn test_read_many_and_range() {
        let (_store, _pool, handler) = handler();
        let descriptor = descriptor();
        for (isbn, pages) in [("100", 1), ("200", 2), ("300", 3), ("400", 4)] {
            write(&handler, &book(isbn, "t", pages));
        }

        let many = handler
            .read_many(
                "books",
                &descriptor,
                &[Value::from("300"), Value::from("999"), Value::from("100")],
                &[],
                &[],
            )
            .unwrap();
        let isbns: Vec<_> = many.iter().map(|d| d.entity().isbn.clone()).collect();
        assert_eq!(isbns, vec!["300", "100"]);

        let range = handler
            .read_range(
                "books",
                &descriptor,
                Some(&Value::from("200")),
                Some(&Value::from("400")),
                None,
                &[],
            )
            .unwrap();
        let isbns: Vec<_> = range.iter().map(|d| d.entity().isbn.clone()).collect();
        assert_eq!(isbns, vec!["200", "300"]);

        let open = handler
            .read_range("books", &descriptor, Some(&Value::from("300")), None, None, &[])
            .unwrap();
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn test_registered_filters_apply_to_reads() {
        let (_store, _pool, mut handler) = handler();
        let descriptor = descriptor();
        write(&handler, &book("100", "a", 1));
        write(&handler, &book("200", "b", 2));

        handler.set_filter(Filter::row_prefix("2"));
        let all = handler.read_range("books", &descriptor, None, None, None, &[]).unwrap();
        assert_eq!(all.len(), 1);
        assert!(handler
            .read_one("books", &descriptor, &Value::from("100"), &[], None, &[])
            .unwrap()
            .is_none());

        handler.reset_filter();
        let all = handler.read_range("books", &descriptor, None, None, None, &[]).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_scan_and_row_keys() {
        let (_store, _pool, handler) = handler();
        let descriptor = descriptor();
        write(&handler, &book("100", "a", 1));
        handler
            .write(
                "books",
                &descriptor,
                &Book {
                    isbn: "200".to_string(),
                    ..Book::default()
                },
                &Value::from("200"),
                &[RelationValue::new("author", "herbert")],
            )
            .unwrap();

        let titled = handler.scan(None, "books", &descriptor, "book", Some("title")).unwrap();
        assert_eq!(titled.len(), 1);
        assert_eq!(titled[0].entity(), &book("100", "a", 1));

        let keys = handler.scan_row_keys(None, "books", "author", None).unwrap();
        assert_eq!(keys, vec![RowKey::from("200")]);
    }

    #[test]
    fn test_relation_round_trip() {
        let (_store, _pool, handler) = handler();
        let descriptor = descriptor();
        let b = book("100", "Dune", 412);
        handler
            .write("books", &descriptor, &b, &Value::from("100"), &[RelationValue::new("author", "herbert")])
            .unwrap();

        let found = handler
            .read_one("books", &descriptor, &Value::from("100"), &descriptor.relation_names(), None, &[])
            .unwrap()
            .unwrap();
        assert_eq!(found.relations().and_then(|r| r.get("author")), Some(&Value::from("herbert")));
        assert_eq!(found.into_entity(), b);
    }

    #[test]
    fn test_delete_row() {
        let (store, _pool, handler) = handler();
        let descriptor = descriptor();
        handler
            .write("books", &descriptor, &book("100", "a", 1), &Value::from("100"), &[RelationValue::new("author", "x")])
            .unwrap();

        handler.delete_row("books", &Value::from("100"), Some("author")).unwrap();
        let row = store.row("books", &RowKey::from("100")).unwrap().unwrap();
        assert!(row.family("author").next().is_none());

        handler.delete_row("books", &Value::from("100"), None).unwrap();
        assert!(store.row("books", &RowKey::from("100")).unwrap().is_none());
    }

    #[test]
    fn test_join_table() {
        let (store, _pool, handler) = handler();
        store
            .create_table("book_reader", &["book_reader".to_string()])
            .unwrap();
        handler
            .write_relation_row(
                "book_reader",
                &Value::from("100"),
                &join_columns([("reader_id#1", "ann"), ("reader_id#2", "bob")]),
                "book_reader",
            )
            .unwrap();

        let keys = handler.foreign_keys_from_join_table("book_reader", &Value::from("100"), "reader_id", ValueType::String);
        assert_eq!(keys, vec![Value::from("ann"), Value::from("bob")]);

        assert!(handler
            .foreign_keys_from_join_table("book_reader", &Value::from("404"), "reader_id", ValueType::String)
            .is_empty());

        // Failures degrade to an empty result.
        store.set_unavailable("book_reader", true).unwrap();
        assert!(handler
            .foreign_keys_from_join_table("book_reader", &Value::from("100"), "reader_id", ValueType::String)
            .is_empty());
        assert!(handler
            .foreign_keys_from_join_table("no_such_table", &Value::from("100"), "reader_id", ValueType::String)
            .is_empty());

        let err = handler
            .find_parent_entity_from_join_table("book_reader", "book_id", "reader_id", &Value::from("ann"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }

    #[test]
    fn test_store_errors_propagate_and_release() {
        let (store, pool, handler) = handler();
        let descriptor = descriptor();
        store.set_unavailable("books", true).unwrap();

        let err = handler
            .read_one("books", &descriptor, &Value::from("100"), &[], None, &[])
            .unwrap_err();
        assert!(matches!(err, WidecolError::Store(StoreError::Unavailable(_))));
        assert!(err.is_retryable());

        let err = handler
            .write("books", &descriptor, &book("100", "a", 1), &Value::from("100"), &[])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Store);
        assert_eq!(pool.stats().active_handles, 0);
    }

    #[test]
    fn test_handler_cursor_surface() {
        let (_store, _pool, mut handler) = handler();
        let descriptor = descriptor();
        for isbn in ["1", "2", "3"] {
            write(&handler, &book(isbn, "t", 1));
        }

        assert!(!handler.has_next().unwrap());
        assert!(handler.set_fetch_size(0).is_err());
        handler.set_fetch_size(2).unwrap();
        handler.open_scan("books", &descriptor, None, None, None, &[]).unwrap();

        let mut seen = Vec::new();
        while handler.has_next().unwrap() {
            seen.push(handler.next(&descriptor).unwrap().into_entity().isbn);
        }
        assert_eq!(seen, vec!["1", "2", "3"]);
        assert!(matches!(handler.next(&descriptor), Err(WidecolError::IteratorExhausted)));

        handler.set_filter(Filter::row_prefix("9"));
        handler.reset();
        assert!(handler.filters().is_empty());
        assert!(handler.has_next().unwrap());
    }

    #[test]
    fn test_handle_shares_filters() {
        let (_store, _pool, handler) = handler();
        let other = handler.handle();
        other.add_filter("book", Filter::row_prefix("1"));
        assert_eq!(handler.filters().effective("book"), Some(Filter::row_prefix("1")));
        assert!(Arc::ptr_eq(handler.collection_index(), other.collection_index()));
    }

    #[test]
    fn test_reset_detaches_only_the_resetting_handle() {
        let (_store, _pool, handler) = handler();
        let descriptor = descriptor();
        for isbn in ["10", "20"] {
            write(&handler, &book(isbn, "t", 1));
        }
        handler.set_filter(Filter::row_prefix("1"));
        handler.add_filter("book", Filter::row_prefix("10"));

        let mut child = handler.handle();
        child.open_scan("books", &descriptor, None, None, None, &[]).unwrap();
        child.reset();
        assert!(child.filters().is_empty());
        assert!(!Arc::ptr_eq(handler.filters(), child.filters()));

        // The parent keeps its predicates; the child's cursor sees none.
        assert_eq!(
            handler.filters().effective("book"),
            Filter::all([Filter::row_prefix("10"), Filter::row_prefix("1")])
        );
        assert_eq!(handler.read_range("books", &descriptor, None, None, None, &[]).unwrap().len(), 1);
        let mut seen = 0;
        while child.has_next().unwrap() {
            child.next(&descriptor).unwrap();
            seen += 1;
        }
        assert_eq!(seen, 2);

        // Predicates added after a reset stay with the child.
        child.add_filter("book", Filter::row_prefix("2"));
        assert_eq!(child.read_range("books", &descriptor, None, None, None, &[]).unwrap().len(), 1);
        assert_eq!(handler.filters().scoped("book").len(), 1);
    }

    #[test]
    fn test_with_config() {
        let store = MemoryStore::new();
        let pool = Arc::new(TablePool::with_defaults(Arc::new(store.clone())).unwrap());
        let config = MapperConfig::new().fetch_size(5);
        let handler = DataHandler::with_config(pool, Arc::new(store.clone()), &config).unwrap();
        assert_eq!(handler.fetch_size(), 5);

        let bad = MapperConfig::new().fetch_size(0);
        let pool = Arc::new(TablePool::with_defaults(Arc::new(store.clone())).unwrap());
        assert!(DataHandler::with_config(pool, Arc::new(store), &bad).is_err());
    }
}
