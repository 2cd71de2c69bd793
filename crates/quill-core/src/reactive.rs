//! Dependency-stamped memoization primitives
//!
//! The timeline derives several values (the per-request disablement list, the
//! per-file diffs) from state that changes rarely relative to how often it is
//! read. Each derived value is held in a memo cell stamped with the identity
//! of the inputs it was computed from; a read with matching inputs returns
//! the cached value, a read with different inputs replaces it. Replacing a
//! cell drops the previous value, which releases any resources it owns (e.g.
//! content handles held by a cached diff).
//!
//! Inputs are compared by `PartialEq` on cheap identity stamps, never by deep
//! content comparison.

use std::collections::HashMap;
use std::hash::Hash;

/// A single memoized value stamped with the inputs it was computed from
#[derive(Debug)]
pub struct MemoCell<I, V> {
    slot: Option<(I, V)>,
}

impl<I: PartialEq, V> MemoCell<I, V> {
    /// Create an empty cell
    pub fn new() -> Self {
        Self { slot: None }
    }

    /// Get the cached value if it was computed from `inputs`
    pub fn get(&self, inputs: &I) -> Option<&V> {
        match &self.slot {
            Some((stamped, value)) if stamped == inputs => Some(value),
            _ => None,
        }
    }

    /// Get the cached value for `inputs`, computing and storing it if the
    /// cell is empty or was computed from different inputs
    pub fn get_or_insert_with(&mut self, inputs: I, compute: impl FnOnce() -> V) -> &V {
        let stale = match &self.slot {
            Some((stamped, _)) => *stamped != inputs,
            None => true,
        };
        if stale {
            // dropping the previous slot releases whatever the value owned
            self.slot = Some((inputs, compute()));
        }
        &self.slot.as_ref().unwrap().1
    }

    /// Replace the cell contents, dropping the previous value
    pub fn insert(&mut self, inputs: I, value: V) -> &V {
        self.slot = Some((inputs, value));
        &self.slot.as_ref().unwrap().1
    }

    /// Clear the cell, dropping the value
    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    /// Whether the cell currently holds a value
    pub fn is_populated(&self) -> bool {
        self.slot.is_some()
    }
}

impl<I: PartialEq, V> Default for MemoCell<I, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// A composite-key map of memo cells
///
/// Owned by the component that derives the values; there is no global cache.
#[derive(Debug)]
pub struct MemoMap<K, I, V> {
    cells: HashMap<K, MemoCell<I, V>>,
}

impl<K: Eq + Hash, I: PartialEq, V> MemoMap<K, I, V> {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            cells: HashMap::new(),
        }
    }

    /// Get the cached value for `key` if it was computed from `inputs`
    pub fn get(&self, key: &K, inputs: &I) -> Option<&V> {
        self.cells.get(key)?.get(inputs)
    }

    /// Store a value for `key`, dropping any previously cached value
    pub fn insert(&mut self, key: K, inputs: I, value: V) -> &V {
        self.cells.entry(key).or_default().insert(inputs, value)
    }

    /// Number of populated cells
    pub fn len(&self) -> usize {
        self.cells.values().filter(|c| c.is_populated()).count()
    }

    /// Whether the map holds no populated cells
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached value
    pub fn clear(&mut self) {
        self.cells.clear();
    }
}

impl<K: Eq + Hash, I: PartialEq, V> Default for MemoMap<K, I, V> {
    fn default() -> Self {
        Self::new()
    }
}
