//! # widecol-test
//!
//! Integration tests for widecol.
//!
//! This crate contains:
//! - Shared entity fixtures
//! - A test context wiring a memory store, a handle pool and a handler
//! - Logging setup for test runs

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use widecol_common::config::{MapperConfig, PoolSettings};
use widecol_common::types::{Value, ValueType};
use widecol_mapper::handler::DataHandler;
use widecol_mapper::metadata::{extract, EmbeddableDescriptor, EntityDescriptor};
use widecol_store::memory::MemoryStore;
use widecol_store::pool::{ConnectionBroker, TablePool};

/// Table holding people in the fixtures.
pub const PEOPLE: &str = "people";

/// Installs a test log subscriber once; `RUST_LOG` overrides the level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Fixtures
// =============================================================================

/// A singular embedded object.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    /// Street line.
    pub street: Option<String>,
    /// City.
    pub city: Option<String>,
}

/// An element of an embedded collection.
#[derive(Debug, Default, PartialEq)]
pub struct Phone {
    /// Phone kind, e.g. "home".
    pub kind: Option<String>,
    /// Number.
    pub number: Option<String>,
}

impl Phone {
    /// Creates a shared phone.
    pub fn new(kind: &str, number: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: Some(kind.to_string()),
            number: Some(number.to_string()),
        })
    }
}

/// The entity under test.
#[derive(Debug, Default, PartialEq)]
pub struct Person {
    /// Identifier, stored as the row key.
    pub id: String,
    /// Scalar.
    pub name: Option<String>,
    /// Scalar.
    pub age: Option<i32>,
    /// Singular embedded object.
    pub address: Option<Address>,
    /// Embedded collection.
    pub phones: Vec<Arc<Phone>>,
}

impl Person {
    /// Creates a person with only an identifier.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    /// Returns the identifier as a value.
    pub fn key(&self) -> Value {
        Value::from(self.id.as_str())
    }
}

/// Describes [`Address`].
pub fn address_descriptor() -> Arc<EmbeddableDescriptor<Address>> {
    Arc::new(
        EmbeddableDescriptor::<Address>::with_default("Address")
            .field("street", ValueType::String, |a| a.street.as_deref().map(Value::from), |a, v| {
                a.street = Some(extract(&v)?);
                Ok(())
            })
            .field("city", ValueType::String, |a| a.city.as_deref().map(Value::from), |a, v| {
                a.city = Some(extract(&v)?);
                Ok(())
            }),
    )
}

/// Describes [`Phone`].
pub fn phone_descriptor() -> Arc<EmbeddableDescriptor<Phone>> {
    Arc::new(
        EmbeddableDescriptor::<Phone>::with_default("Phone")
            .field("kind", ValueType::String, |p| p.kind.as_deref().map(Value::from), |p, v| {
                p.kind = Some(extract(&v)?);
                Ok(())
            })
            .field("number", ValueType::String, |p| p.number.as_deref().map(Value::from), |p, v| {
                p.number = Some(extract(&v)?);
                Ok(())
            }),
    )
}

/// Describes [`Person`]: scalars in `person`, the address in `address`,
/// phones in `phones` and an `employer` relation.
pub fn person_descriptor() -> EntityDescriptor<Person> {
    EntityDescriptor::<Person>::builder_with_default("Person", "person")
        .id("id", ValueType::String, |p| Value::from(p.id.as_str()), |p, v| {
            p.id = extract(&v)?;
            Ok(())
        })
        .scalar("name", ValueType::String, |p| p.name.as_deref().map(Value::from), |p, v| {
            p.name = Some(extract(&v)?);
            Ok(())
        })
        .scalar("age", ValueType::Int, |p| p.age.map(Value::from), |p, v| {
            p.age = Some(extract(&v)?);
            Ok(())
        })
        .embedded("address", address_descriptor(), |p| p.address.as_ref(), |p, a| p.address = Some(a))
        .collection("phones", phone_descriptor(), |p| &p.phones, |p, v| p.phones = v)
        .relation("employer", ValueType::String)
        .build()
        .expect("person descriptor is valid")
}

// =============================================================================
// Context
// =============================================================================

/// A memory store, a pool over it, and a handler with the people table set up.
pub struct TestContext {
    /// The backing store.
    pub store: MemoryStore,
    /// The handle pool.
    pub pool: Arc<TablePool>,
    /// The handler under test.
    pub handler: DataHandler,
    /// The person descriptor.
    pub people: EntityDescriptor<Person>,
}

impl TestContext {
    /// Creates a context with default settings.
    pub fn new() -> Self {
        Self::with_config(&MapperConfig::default())
    }

    /// Creates a context with the given pool settings.
    pub fn with_pool(settings: PoolSettings) -> Self {
        Self::with_config(&MapperConfig {
            pool: settings,
            ..MapperConfig::default()
        })
    }

    /// Creates a context from a configuration.
    pub fn with_config(config: &MapperConfig) -> Self {
        init_tracing();
        let store = MemoryStore::new();
        let pool = Arc::new(TablePool::new(Arc::new(store.clone()), &config.pool).expect("valid pool settings"));
        let handler = DataHandler::with_config(
            Arc::clone(&pool) as Arc<dyn ConnectionBroker>,
            Arc::new(store.clone()),
            config,
        )
        .expect("valid configuration");
        let people = person_descriptor();
        handler.ensure_schema(PEOPLE, &people).expect("schema setup");
        Self {
            store,
            pool,
            handler,
            people,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
