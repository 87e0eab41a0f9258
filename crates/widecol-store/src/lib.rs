//! # widecol-store
//!
//! Client surface of the wide-column store used by the widecol mapper.
//!
//! - **Table handles**: point gets, range scans and row mutations
//! - **Filters**: server-side read predicates composed by conjunction
//! - **Pool**: bounded per-table handle pool with scoped release
//! - **Memory store**: an in-process implementation for tests and benches
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use widecol_store::memory::MemoryStore;
//! use widecol_store::pool::{PooledTable, TablePool};
//! use widecol_store::table::{Get, StoreAdmin};
//! use widecol_common::RowKey;
//!
//! let store = MemoryStore::new();
//! store.create_table("people", &["person".to_string()]).unwrap();
//!
//! let pool = TablePool::with_defaults(Arc::new(store)).unwrap();
//! let table = PooledTable::acquire(&pool, "people").unwrap();
//! assert!(table.get(&Get::new(RowKey::from("missing"))).unwrap().is_none());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod filter;
pub mod memory;
pub mod pool;
pub mod table;

pub use filter::{CompareOp, Filter};
pub use memory::{MemoryStore, MemoryTable};
pub use pool::{ConnectionBroker, PoolStats, PooledTable, TableOpener, TablePool};
pub use table::{ColumnRef, Get, RowMutation, Scan, StoreAdmin, TableHandle};
