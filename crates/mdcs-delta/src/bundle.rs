//! Delta bundles: the payload exchanged once a peer's digest is known.

use mdcs_core::{CrdtId, Dot};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeltaBundle<D: Clone> {
    items: BTreeMap<CrdtId, Vec<(Dot, D)>>,
}

impl<D: Clone> Default for DeltaBundle<D> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
        }
    }
}

impl<D: Clone> DeltaBundle<D> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, crdt_id: CrdtId, dot: Dot, delta: D) {
        self.items.entry(crdt_id).or_default().push((dot, delta));
    }

    pub fn is_empty(&self) -> bool {
        self.items.values().all(|v| v.is_empty())
    }

    pub fn crdt_ids(&self) -> impl Iterator<Item = &CrdtId> {
        self.items.keys()
    }

    pub fn items_for(&self, crdt_id: CrdtId) -> &[(Dot, D)] {
        self.items
            .get(&crdt_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CrdtId, &(Dot, D))> {
        self.items
            .iter()
            .flat_map(|(crdt_id, dots)| dots.iter().map(move |item| (crdt_id, item)))
    }

    /// Concatenates `other` after `self` per crdt id. Receivers must apply
    /// items independently of order; this ordering only reflects how the
    /// bundle was assembled, not a delivery requirement.
    pub fn combine(&self, other: &Self) -> Self {
        let mut items = self.items.clone();
        for (crdt_id, dots) in &other.items {
            items.entry(*crdt_id).or_default().extend(dots.iter().cloned());
        }
        Self { items }
    }
}
