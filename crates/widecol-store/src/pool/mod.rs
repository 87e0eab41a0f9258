//! Table handle pool.
//!
//! Handles are opened lazily per table, reused after release, and capped at
//! a maximum number checked out per table. A caller that finds the cap
//! reached waits for a release until the acquire timeout expires.
//!
//! Callers normally go through [`PooledTable`], which returns the handle to
//! its broker when dropped, so every exit path releases.

use std::collections::{HashMap, VecDeque};
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use widecol_common::config::PoolSettings;
use widecol_common::error::{StoreError, StoreResult};

use crate::table::TableHandle;

/// Opens new handles onto a table.
pub trait TableOpener: Send + Sync {
    /// Opens a handle onto `table`.
    fn open(&self, table: &str) -> StoreResult<Arc<dyn TableHandle>>;
}

/// Hands out table handles and takes them back.
pub trait ConnectionBroker: Send + Sync {
    /// Acquires a handle onto `table`.
    fn acquire(&self, table: &str) -> StoreResult<Arc<dyn TableHandle>>;

    /// Returns a handle obtained from [`acquire`](Self::acquire).
    fn release(&self, handle: Arc<dyn TableHandle>);
}

/// Pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total handles opened.
    pub handles_created: u64,
    /// Total acquisitions.
    pub acquisitions: u64,
    /// Total releases.
    pub releases: u64,
    /// Acquisition timeouts.
    pub timeouts: u64,
    /// Handles currently checked out.
    pub active_handles: usize,
    /// Handles currently idle.
    pub idle_handles: usize,
}

/// Per-table slots.
#[derive(Default)]
struct TableSlots {
    idle: VecDeque<Arc<dyn TableHandle>>,
    checked_out: usize,
}

/// Shared pool state.
struct PoolState {
    tables: HashMap<String, TableSlots>,
    closed: bool,
}

/// A bounded pool of table handles.
pub struct TablePool {
    opener: Arc<dyn TableOpener>,
    max_per_table: usize,
    acquire_timeout: Duration,
    state: Mutex<PoolState>,
    released: Condvar,
    stats: Mutex<PoolStats>,
}

impl TablePool {
    /// Creates a pool over `opener`.
    pub fn new(opener: Arc<dyn TableOpener>, settings: &PoolSettings) -> StoreResult<Self> {
        if settings.max_handles_per_table == 0 {
            return Err(StoreError::InvalidConfig(
                "max_handles_per_table must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            opener,
            max_per_table: settings.max_handles_per_table,
            acquire_timeout: settings.acquire_timeout(),
            state: Mutex::new(PoolState {
                tables: HashMap::new(),
                closed: false,
            }),
            released: Condvar::new(),
            stats: Mutex::new(PoolStats::default()),
        })
    }

    /// Creates a pool with default settings.
    pub fn with_defaults(opener: Arc<dyn TableOpener>) -> StoreResult<Self> {
        Self::new(opener, &PoolSettings::default())
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        let mut stats = self.stats.lock().clone();
        let state = self.state.lock();
        stats.active_handles = state.tables.values().map(|s| s.checked_out).sum();
        stats.idle_handles = state.tables.values().map(|s| s.idle.len()).sum();
        stats
    }

    /// Returns the number of handles checked out for `table`.
    pub fn active(&self, table: &str) -> usize {
        self.state
            .lock()
            .tables
            .get(table)
            .map_or(0, |s| s.checked_out)
    }

    /// Closes the pool, dropping idle handles. Later acquisitions fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        for slots in state.tables.values_mut() {
            slots.idle.clear();
        }
        self.released.notify_all();
    }

    /// Returns true if the pool is closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    // =========================================================================
    // Internal Methods
    // =========================================================================

    /// Reserves a slot, returning an idle handle if one is waiting.
    fn reserve(&self, table: &str) -> StoreResult<Option<Arc<dyn TableHandle>>> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StoreError::PoolClosed);
            }

            let slots = state.tables.entry(table.to_string()).or_default();
            if let Some(handle) = slots.idle.pop_front() {
                slots.checked_out += 1;
                return Ok(Some(handle));
            }
            if slots.checked_out < self.max_per_table {
                slots.checked_out += 1;
                return Ok(None);
            }

            if self.released.wait_until(&mut state, deadline).timed_out() {
                self.stats.lock().timeouts += 1;
                let timeout_ms = u64::try_from(self.acquire_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(table, timeout_ms, "Timed out waiting for a table handle");
                return Err(StoreError::PoolTimeout {
                    table: table.to_string(),
                    timeout_ms,
                });
            }
        }
    }

    /// Gives back a reserved slot whose handle could not be opened.
    fn unreserve(&self, table: &str) {
        let mut state = self.state.lock();
        if let Some(slots) = state.tables.get_mut(table) {
            slots.checked_out = slots.checked_out.saturating_sub(1);
        }
        self.released.notify_all();
    }
}

impl ConnectionBroker for TablePool {
    fn acquire(&self, table: &str) -> StoreResult<Arc<dyn TableHandle>> {
        let handle = match self.reserve(table)? {
            Some(handle) => handle,
            None => match self.opener.open(table) {
                Ok(handle) => {
                    self.stats.lock().handles_created += 1;
                    debug!(table, "Opened table handle");
                    handle
                }
                Err(e) => {
                    self.unreserve(table);
                    return Err(e);
                }
            },
        };

        self.stats.lock().acquisitions += 1;
        Ok(handle)
    }

    fn release(&self, handle: Arc<dyn TableHandle>) {
        {
            let mut state = self.state.lock();
            let closed = state.closed;
            if let Some(slots) = state.tables.get_mut(handle.name()) {
                slots.checked_out = slots.checked_out.saturating_sub(1);
                if !closed {
                    slots.idle.push_back(handle);
                }
            }
        }
        self.stats.lock().releases += 1;
        self.released.notify_all();
    }
}

impl std::fmt::Debug for TablePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TablePool")
            .field("max_per_table", &self.max_per_table)
            .field("acquire_timeout", &self.acquire_timeout)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A handle acquired from a broker.
///
/// When dropped, the handle is automatically returned to the broker.
pub struct PooledTable<'a> {
    broker: &'a dyn ConnectionBroker,
    handle: Option<Arc<dyn TableHandle>>,
}

impl<'a> PooledTable<'a> {
    /// Acquires a handle onto `table` from `broker`.
    pub fn acquire(broker: &'a dyn ConnectionBroker, table: &str) -> StoreResult<Self> {
        let handle = broker.acquire(table)?;
        Ok(Self {
            broker,
            handle: Some(handle),
        })
    }
}

impl Deref for PooledTable<'_> {
    type Target = dyn TableHandle;

    fn deref(&self) -> &Self::Target {
        match &self.handle {
            Some(handle) => handle.as_ref(),
            // Only `drop` takes the handle out.
            None => unreachable!("pooled table used after release"),
        }
    }
}

impl Drop for PooledTable<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.broker.release(handle);
        }
    }
}

impl std::fmt::Debug for PooledTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledTable")
            .field("table", &self.handle.as_ref().map(|h| h.name().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::table::StoreAdmin;
    use std::thread;

    fn pool(max: usize, timeout_ms: u64) -> (MemoryStore, TablePool) {
        let store = MemoryStore::new();
        store.create_table("people", &["person".to_string()]).unwrap();
        let settings = PoolSettings {
            max_handles_per_table: max,
            acquire_timeout_ms: timeout_ms,
        };
        let pool = TablePool::new(Arc::new(store.clone()), &settings).unwrap();
        (store, pool)
    }

    #[test]
    fn test_pool_invalid_settings() {
        let settings = PoolSettings {
            max_handles_per_table: 0,
            acquire_timeout_ms: 10,
        };
        assert!(TablePool::new(Arc::new(MemoryStore::new()), &settings).is_err());
    }

    #[test]
    fn test_pool_acquire_release() {
        let (_store, pool) = pool(2, 100);

        {
            let table = PooledTable::acquire(&pool, "people").unwrap();
            assert_eq!(table.name(), "people");
            assert_eq!(pool.stats().active_handles, 1);
        }

        let stats = pool.stats();
        assert_eq!(stats.active_handles, 0);
        assert_eq!(stats.idle_handles, 1);
        assert_eq!(stats.acquisitions, 1);
        assert_eq!(stats.releases, 1);

        // The idle handle is reused.
        drop(PooledTable::acquire(&pool, "people").unwrap());
        assert_eq!(pool.stats().handles_created, 1);
    }

    #[test]
    fn test_pool_missing_table() {
        let (_store, pool) = pool(2, 100);
        assert!(matches!(
            PooledTable::acquire(&pool, "pets"),
            Err(StoreError::TableNotFound(_))
        ));
        assert_eq!(pool.active("pets"), 0);
    }

    #[test]
    fn test_pool_timeout() {
        let (_store, pool) = pool(1, 20);
        let _held = PooledTable::acquire(&pool, "people").unwrap();

        let result = PooledTable::acquire(&pool, "people");
        assert!(matches!(result, Err(StoreError::PoolTimeout { timeout_ms: 20, .. })));
        assert_eq!(pool.stats().timeouts, 1);
    }

    #[test]
    fn test_pool_waiter_wakes_on_release() {
        let (_store, pool) = pool(1, 5_000);
        let held = PooledTable::acquire(&pool, "people").unwrap();

        thread::scope(|s| {
            let waiter = s.spawn(|| PooledTable::acquire(&pool, "people").map(|t| t.name().to_string()));
            thread::sleep(Duration::from_millis(20));
            drop(held);
            assert_eq!(waiter.join().unwrap().unwrap(), "people");
        });

        assert_eq!(pool.stats().active_handles, 0);
    }

    #[test]
    fn test_pool_close() {
        let (_store, pool) = pool(2, 100);
        drop(PooledTable::acquire(&pool, "people").unwrap());

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(pool.stats().idle_handles, 0);
        assert!(matches!(
            PooledTable::acquire(&pool, "people"),
            Err(StoreError::PoolClosed)
        ));
    }
}
