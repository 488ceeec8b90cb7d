//! Ordered set primitive shared by `Context` and the reference CRDTs.
//!
//! A thin `BTreeSet` wrapper with the set-theoretic operations the causal
//! context needs: union, intersection, difference, subset, disjointness.
//! Insertion is idempotent, as for any CRDT-backing set.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdSet<T: Ord + Clone> {
    elements: BTreeSet<T>,
}

impl<T: Ord + Clone> OrdSet<T> {
    pub fn new() -> Self {
        Self {
            elements: BTreeSet::new(),
        }
    }

    pub fn from_iter(iter: impl IntoIterator<Item = T>) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }

    pub fn insert(&mut self, value: T) {
        self.elements.insert(value);
    }

    pub fn contains(&self, value: &T) -> bool {
        self.elements.contains(value)
    }

    pub fn size(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    pub fn max(&self) -> Option<&T> {
        self.elements.iter().next_back()
    }

    pub fn equal(&self, other: &Self) -> bool {
        self.elements == other.elements
    }

    pub fn subset(&self, other: &Self) -> bool {
        self.elements.is_subset(&other.elements)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            elements: self.elements.union(&other.elements).cloned().collect(),
        }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            elements: self
                .elements
                .intersection(&other.elements)
                .cloned()
                .collect(),
        }
    }

    pub fn difference(&self, other: &Self) -> Self {
        Self {
            elements: self
                .elements
                .difference(&other.elements)
                .cloned()
                .collect(),
        }
    }

    pub fn disjoint(&self, other: &Self) -> bool {
        self.elements.is_disjoint(&other.elements)
    }
}

impl<T: Ord + Clone> Default for OrdSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + Clone> FromIterator<T> for OrdSet<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        OrdSet::from_iter(iter)
    }
}
