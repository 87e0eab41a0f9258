//! Forward-only scan cursor.
//!
//! A cursor reads a key range in batches of `fetch_size` rows, decoding one
//! row per call to [`ScanCursor::next`]. Each batch is fetched through a
//! fresh handle that is released before the batch is returned. Cursors are
//! not shared across threads.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use widecol_common::constants::MAX_FETCH_SIZE;
use widecol_common::error::{WidecolError, WidecolResult};
use widecol_common::types::{RowKey, RowResult};
use widecol_store::pool::{ConnectionBroker, PooledTable};
use widecol_store::table::Scan;

use crate::codec::{decode, DecodedEntity};
use crate::filter::FilterRegistry;
use crate::metadata::EntityDescriptor;

/// Validates a fetch size.
pub(crate) fn check_fetch_size(fetch_size: usize) -> WidecolResult<()> {
    if fetch_size == 0 || fetch_size > MAX_FETCH_SIZE {
        return Err(WidecolError::invalid_argument(format!(
            "fetch size must be between 1 and {MAX_FETCH_SIZE}, got {fetch_size}"
        )));
    }
    Ok(())
}

/// Stateful iteration over a scan.
pub struct ScanCursor {
    broker: Arc<dyn ConnectionBroker>,
    filters: Arc<FilterRegistry>,
    table: String,
    family: String,
    scan: Scan,
    relation_names: Vec<String>,
    fetch_size: usize,
    buffer: VecDeque<RowResult>,
    resume: Option<RowKey>,
    exhausted: bool,
    batches: u64,
}

impl ScanCursor {
    /// Opens a cursor over `scan` on `table`.
    ///
    /// Predicates registered for `family` in `filters` are combined with the
    /// scan's own filter at every fetch.
    pub fn new(
        broker: Arc<dyn ConnectionBroker>,
        filters: Arc<FilterRegistry>,
        table: impl Into<String>,
        family: impl Into<String>,
        scan: Scan,
        relation_names: Vec<String>,
        fetch_size: usize,
    ) -> WidecolResult<Self> {
        check_fetch_size(fetch_size)?;
        Ok(Self {
            broker,
            filters,
            table: table.into(),
            family: family.into(),
            scan,
            relation_names,
            fetch_size,
            buffer: VecDeque::new(),
            resume: None,
            exhausted: false,
            batches: 0,
        })
    }

    /// Returns the table being scanned.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the batch size.
    pub fn fetch_size(&self) -> usize {
        self.fetch_size
    }

    /// Returns the number of batches fetched so far.
    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Changes the batch size for later fetches.
    pub fn set_fetch_size(&mut self, fetch_size: usize) -> WidecolResult<()> {
        check_fetch_size(fetch_size)?;
        self.fetch_size = fetch_size;
        Ok(())
    }

    /// Returns true if another row is available, fetching a batch if needed.
    pub fn has_next(&mut self) -> WidecolResult<bool> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch()?;
        }
        Ok(!self.buffer.is_empty())
    }

    /// Decodes the next row and advances.
    ///
    /// Fails with `IteratorExhausted` once every row has been returned.
    pub fn next<E>(&mut self, descriptor: &EntityDescriptor<E>) -> WidecolResult<DecodedEntity<E>> {
        if !self.has_next()? {
            return Err(WidecolError::IteratorExhausted);
        }
        let row = self.buffer.pop_front().ok_or(WidecolError::IteratorExhausted)?;
        decode(&row, descriptor, &self.relation_names, None)
    }

    /// Replaces the predicates combined at later fetches.
    pub fn set_filters(&mut self, filters: Arc<FilterRegistry>) {
        self.filters = filters;
    }

    /// Rewinds to the start of the scan and stops applying the registered
    /// predicates. The registry itself is left untouched.
    pub fn reset(&mut self) {
        self.set_filters(Arc::new(FilterRegistry::new()));
        self.rewind();
    }

    /// Rewinds to the start of the scan.
    pub fn rewind(&mut self) {
        self.buffer.clear();
        self.resume = None;
        self.exhausted = false;
    }

    fn fetch(&mut self) -> WidecolResult<()> {
        let mut scan = self.scan.clone();
        if let Some(resume) = &self.resume {
            scan.start = Some(resume.clone());
        }
        scan.filter = self.filters.combine(scan.filter.take(), &self.family);
        scan.limit = Some(self.fetch_size);

        let rows = {
            let table = PooledTable::acquire(self.broker.as_ref(), &self.table)?;
            table.scan(&scan)?
        };
        self.batches += 1;

        if rows.len() < self.fetch_size {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.resume = Some(last.key.next_key());
        }
        debug!(
            table = %self.table,
            rows = rows.len(),
            exhausted = self.exhausted,
            "Fetched scan batch"
        );
        self.buffer.extend(rows);
        Ok(())
    }
}

impl std::fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanCursor")
            .field("table", &self.table)
            .field("fetch_size", &self.fetch_size)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .finish()
    }
}
