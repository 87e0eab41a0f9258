//! Positional identity of embedded collection elements.
//!
//! Every element of an embedded collection is stored under its own index in
//! the row. An index, once assigned to a row+attribute, is never handed to a
//! different element again. The index remembers which live element owns which
//! index between reading a row for update and writing it back.
//!
//! Element identity is object identity: two elements with equal contents are
//! still different elements.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;

use widecol_common::constants::NO_INDEX;
use widecol_common::types::RowKey;

/// Identity of one collection element.
///
/// Holds a reference to the element so its address stays reserved for as
/// long as the identity is tracked.
#[derive(Clone)]
pub struct ElementIdentity {
    addr: usize,
    _anchor: Arc<dyn Any + Send + Sync>,
}

impl ElementIdentity {
    /// Returns the identity of a shared element.
    pub fn of<T: Any + Send + Sync>(element: &Arc<T>) -> Self {
        Self {
            addr: Arc::as_ptr(element) as *const () as usize,
            _anchor: Arc::clone(element) as Arc<dyn Any + Send + Sync>,
        }
    }
}

impl PartialEq for ElementIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for ElementIdentity {}

impl Hash for ElementIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl fmt::Debug for ElementIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementIdentity({:#x})", self.addr)
    }
}

/// Recorded state of one row+attribute.
#[derive(Debug)]
struct CollectionEntry {
    elements: Vec<(ElementIdentity, i64)>,
    high_water: i64,
}

impl Default for CollectionEntry {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            high_water: NO_INDEX,
        }
    }
}

impl CollectionEntry {
    fn lookup(&self, identity: &ElementIdentity) -> Option<i64> {
        self.elements
            .iter()
            .find(|(id, _)| id == identity)
            .map(|(_, index)| *index)
    }

    fn last_index(&self) -> i64 {
        self.elements
            .iter()
            .map(|(_, index)| *index)
            .fold(self.high_water, i64::max)
    }
}

/// Indices chosen for one encode pass over a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexAssignment {
    /// One index per element, in iteration order.
    pub indices: Vec<i64>,
    /// Previously recorded indices whose elements are gone.
    pub orphans: Vec<i64>,
    /// Highest index ever assigned for the row+attribute.
    pub high_water: i64,
}

/// Tracks element indices per `(row key, collection attribute)`.
///
/// Safe for concurrent use across independent keys.
#[derive(Debug, Default)]
pub struct ElementCollectionIndex {
    entries: DashMap<(RowKey, String), CollectionEntry>,
}

impl ElementCollectionIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the number of tracked row+attribute pairs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the row+attribute has recorded state.
    pub fn contains(&self, key: &RowKey, attribute: &str) -> bool {
        self.entries.contains_key(&(key.clone(), attribute.to_string()))
    }

    /// Returns the recorded index of an element.
    pub fn lookup_index(&self, key: &RowKey, attribute: &str, identity: &ElementIdentity) -> Option<i64> {
        self.entries
            .get(&(key.clone(), attribute.to_string()))
            .and_then(|entry| entry.lookup(identity))
    }

    /// Returns the highest index known for the row+attribute, or `NO_INDEX`.
    pub fn last_index(&self, key: &RowKey, attribute: &str) -> i64 {
        self.entries
            .get(&(key.clone(), attribute.to_string()))
            .map_or(NO_INDEX, |entry| entry.last_index())
    }

    /// Records the index of an element. `index` must not be negative.
    pub fn record(&self, key: &RowKey, attribute: &str, identity: ElementIdentity, index: i64) {
        let mut entry = self
            .entries
            .entry((key.clone(), attribute.to_string()))
            .or_default();
        match entry.elements.iter_mut().find(|(id, _)| *id == identity) {
            Some(slot) => slot.1 = index,
            None => entry.elements.push((identity, index)),
        }
    }

    /// Records the highest index ever stored for the row+attribute.
    pub fn record_high_water(&self, key: &RowKey, attribute: &str, index: i64) {
        let mut entry = self
            .entries
            .entry((key.clone(), attribute.to_string()))
            .or_default();
        entry.high_water = entry.high_water.max(index);
    }

    /// Chooses indices for `elements`.
    ///
    /// With nothing recorded, elements get `0..n` in order. Otherwise a known
    /// element keeps its index and a new one gets the next index after the
    /// highest known.
    pub fn assign(&self, key: &RowKey, attribute: &str, elements: &[ElementIdentity]) -> IndexAssignment {
        let Some(entry) = self.entries.get(&(key.clone(), attribute.to_string())) else {
            let count = i64::try_from(elements.len()).unwrap_or(i64::MAX);
            return IndexAssignment {
                indices: (0..count).collect(),
                orphans: Vec::new(),
                high_water: count - 1,
            };
        };

        let last = entry.last_index();
        let mut next = last + 1;
        let mut used = HashSet::with_capacity(elements.len());
        let indices = elements
            .iter()
            .map(|identity| match entry.lookup(identity) {
                // The same element listed twice only keeps its index once.
                Some(index) if used.insert(index) => index,
                _ => {
                    let index = next;
                    next += 1;
                    used.insert(index);
                    index
                }
            })
            .collect();

        let mut orphans: Vec<i64> = entry
            .elements
            .iter()
            .map(|(_, index)| *index)
            .filter(|index| !used.contains(index))
            .collect();
        orphans.sort_unstable();
        orphans.dedup();

        IndexAssignment {
            indices,
            orphans,
            high_water: last.max(next - 1),
        }
    }

    /// Drops everything recorded for a row.
    pub fn clear_row(&self, key: &RowKey) {
        self.entries.retain(|(row, _), _| row != key);
    }

    /// Drops everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn elements(n: usize) -> Vec<Arc<String>> {
        (0..n).map(|i| Arc::new(format!("e{i}"))).collect()
    }

    fn ids(elements: &[Arc<String>]) -> Vec<ElementIdentity> {
        elements.iter().map(ElementIdentity::of).collect()
    }

    #[test]
    fn test_identity_is_not_equality() {
        let a = Arc::new("same".to_string());
        let b = Arc::new("same".to_string());
        assert_ne!(ElementIdentity::of(&a), ElementIdentity::of(&b));
        assert_eq!(ElementIdentity::of(&a), ElementIdentity::of(&Arc::clone(&a)));
    }

    #[test]
    fn test_first_insert_is_sequential() {
        let index = ElementCollectionIndex::new();
        let key = RowKey::from("r1");
        let els = elements(3);

        assert!(index.is_empty());
        assert_eq!(index.last_index(&key, "phones"), NO_INDEX);

        let assignment = index.assign(&key, "phones", &ids(&els));
        assert_eq!(assignment.indices, vec![0, 1, 2]);
        assert!(assignment.orphans.is_empty());
        assert_eq!(assignment.high_water, 2);

        let empty = index.assign(&key, "phones", &[]);
        assert!(empty.indices.is_empty());
        assert_eq!(empty.high_water, NO_INDEX);
    }

    #[test]
    fn test_indices_never_reused() {
        let index = ElementCollectionIndex::new();
        let key = RowKey::from("r1");
        let els = elements(3);
        for (i, id) in ids(&els).into_iter().enumerate() {
            index.record(&key, "phones", id, i as i64);
        }
        assert_eq!(index.last_index(&key, "phones"), 2);
        assert_eq!(index.lookup_index(&key, "phones", &ElementIdentity::of(&els[1])), Some(1));

        // Drop the middle element and append a new one.
        let added = Arc::new("new".to_string());
        let current = vec![
            ElementIdentity::of(&els[0]),
            ElementIdentity::of(&els[2]),
            ElementIdentity::of(&added),
        ];
        let assignment = index.assign(&key, "phones", &current);
        assert_eq!(assignment.indices, vec![0, 2, 3]);
        assert_eq!(assignment.orphans, vec![1]);
        assert_eq!(assignment.high_water, 3);
    }

    #[test]
    fn test_high_water_survives_removal_of_last() {
        let index = ElementCollectionIndex::new();
        let key = RowKey::from("r1");
        let els = elements(2);
        index.record(&key, "phones", ElementIdentity::of(&els[0]), 0);
        index.record_high_water(&key, "phones", 5);

        let added = Arc::new("new".to_string());
        let assignment = index.assign(
            &key,
            "phones",
            &[ElementIdentity::of(&els[0]), ElementIdentity::of(&added)],
        );
        assert_eq!(assignment.indices, vec![0, 6]);
        assert_eq!(assignment.high_water, 6);
    }

    #[test]
    fn test_duplicate_element_gets_fresh_index() {
        let index = ElementCollectionIndex::new();
        let key = RowKey::from("r1");
        let els = elements(1);
        index.record(&key, "phones", ElementIdentity::of(&els[0]), 0);

        let id = ElementIdentity::of(&els[0]);
        let assignment = index.assign(&key, "phones", &[id.clone(), id]);
        assert_eq!(assignment.indices, vec![0, 1]);
    }

    #[test]
    fn test_clear_row_and_clear() {
        let index = ElementCollectionIndex::new();
        let els = elements(2);
        index.record(&RowKey::from("a"), "phones", ElementIdentity::of(&els[0]), 0);
        index.record(&RowKey::from("a"), "emails", ElementIdentity::of(&els[0]), 0);
        index.record(&RowKey::from("b"), "phones", ElementIdentity::of(&els[1]), 0);
        assert_eq!(index.len(), 3);

        index.clear_row(&RowKey::from("a"));
        assert_eq!(index.len(), 1);
        assert!(index.contains(&RowKey::from("b"), "phones"));

        index.clear();
        assert!(index.is_empty());
    }

    #[test]
    fn test_concurrent_distinct_keys() {
        let index = ElementCollectionIndex::new();
        let els = elements(8);

        thread::scope(|s| {
            for t in 0..8 {
                let index = &index;
                let els = &els;
                s.spawn(move || {
                    let key = RowKey::from(format!("row-{t}").as_str());
                    for (i, el) in els.iter().enumerate() {
                        index.record(&key, "phones", ElementIdentity::of(el), i as i64);
                    }
                });
            }
        });

        assert_eq!(index.len(), 8);
        for t in 0..8 {
            let key = RowKey::from(format!("row-{t}").as_str());
            assert_eq!(index.last_index(&key, "phones"), 7);
        }
    }
}
