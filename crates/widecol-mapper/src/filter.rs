//! Read predicate registry.
//!
//! A registry holds one global predicate and any number of predicates scoped
//! to a column family. The predicate applied to a read of a family is the
//! conjunction of that family's scoped predicates and the global one.

use dashmap::DashMap;
use parking_lot::Mutex;

use widecol_store::filter::Filter;

/// Global and per-family read predicates.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    global: Mutex<Option<Filter>>,
    scoped: DashMap<String, Vec<Filter>>,
}

impl FilterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// ANDs `filter` into the global predicate.
    pub fn set_filter(&self, filter: Filter) {
        let mut global = self.global.lock();
        *global = Some(match global.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
    }

    /// Appends a predicate scoped to `family`.
    pub fn add_filter(&self, family: &str, filter: Filter) {
        self.scoped.entry(family.to_string()).or_default().push(filter);
    }

    /// Returns the global predicate.
    pub fn global(&self) -> Option<Filter> {
        self.global.lock().clone()
    }

    /// Returns the predicates scoped to `family`.
    pub fn scoped(&self, family: &str) -> Vec<Filter> {
        self.scoped
            .get(family)
            .map(|filters| filters.clone())
            .unwrap_or_default()
    }

    /// Returns the predicate for reads of `family`.
    pub fn effective(&self, family: &str) -> Option<Filter> {
        let global = self.global();
        let scoped = self.scoped(family);
        if scoped.is_empty() {
            return global;
        }
        Filter::all(scoped.into_iter().chain(global))
    }

    /// Combines a caller's predicate with the registry's for `family`.
    pub fn combine(&self, filter: Option<Filter>, family: &str) -> Option<Filter> {
        Filter::all(filter.into_iter().chain(self.effective(family)))
    }

    /// Returns true if no predicate is registered.
    pub fn is_empty(&self) -> bool {
        self.global.lock().is_none() && self.scoped.iter().all(|entry| entry.value().is_empty())
    }
}
