//! # widecol-mapper
//!
//! Maps typed entities onto rows of a wide-column store.
//!
//! This crate provides:
//!
//! - **Metadata**: typed entity and embeddable descriptors
//! - **Codec**: entity to row encoding and row to entity decoding, including
//!   embedded collections under synthetic qualifiers
//! - **Collection index**: stable element indices across read-modify-write
//! - **Filters**: global and per-family read predicates
//! - **Handler**: reads, writes, scans, batches, relations and schema setup
//!   over pooled table handles
//! - **Cursor**: batched forward-only iteration over a scan
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use widecol_common::{Value, ValueType};
//! use widecol_mapper::handler::DataHandler;
//! use widecol_mapper::metadata::{extract, EntityDescriptor};
//! use widecol_store::memory::MemoryStore;
//! use widecol_store::pool::TablePool;
//!
//! #[derive(Default)]
//! struct City {
//!     name: String,
//!     population: Option<i64>,
//! }
//!
//! let city = EntityDescriptor::<City>::builder_with_default("City", "city")
//!     .id("name", ValueType::String, |c| Value::from(c.name.as_str()), |c, v| Ok(c.name = extract(&v)?))
//!     .scalar("population", ValueType::BigInt, |c| c.population.map(Value::from), |c, v| {
//!         Ok(c.population = Some(extract(&v)?))
//!     })
//!     .build()
//!     .unwrap();
//!
//! let store = MemoryStore::new();
//! let pool = TablePool::with_defaults(Arc::new(store.clone())).unwrap();
//! let handler = DataHandler::new(Arc::new(pool), Arc::new(store));
//! handler.ensure_schema("cities", &city).unwrap();
//!
//! let lyon = City { name: "Lyon".into(), population: Some(522_000) };
//! handler.write("cities", &city, &lyon, &Value::from("Lyon"), &[]).unwrap();
//!
//! let found = handler
//!     .read_one("cities", &city, &Value::from("Lyon"), &[], None, &[])
//!     .unwrap()
//!     .unwrap();
//! assert_eq!(found.entity().population, Some(522_000));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod collection_index;
pub mod cursor;
pub mod filter;
pub mod handler;
pub mod metadata;
pub mod qualifier;
pub mod relation;

pub use codec::{decode, encode, DecodedEntity, EncodedRow, EnhancedEntity};
pub use collection_index::{ElementCollectionIndex, ElementIdentity, IndexAssignment};
pub use cursor::ScanCursor;
pub use filter::FilterRegistry;
pub use handler::{BatchGroup, DataHandler};
pub use metadata::{EmbeddableDescriptor, EntityDescriptor};
pub use qualifier::SyntheticQualifier;
pub use relation::RelationValue;
