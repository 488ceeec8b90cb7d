//! Causal context: a sparse per-replica set of observed counters.
//!
//! Generalizes the dot-set `CausalContext` idea into a per-replica
//! `OrdSet<u64>` map so that `max_for` (needed to mint the next local dot)
//! and `since` (needed for anti-entropy) stay linear in the number of
//! distinct replicas rather than the number of events.

use crate::dot::Dot;
use crate::ids::ReplicaId;
use crate::ordset::OrdSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    counters: BTreeMap<ReplicaId, OrdSet<u64>>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            counters: BTreeMap::new(),
        }
    }

    pub fn from_dots(dots: impl IntoIterator<Item = Dot>) -> Self {
        let mut ctx = Self::new();
        for dot in dots {
            ctx = ctx.add(dot);
        }
        ctx
    }

    pub fn contains(&self, dot: Dot) -> bool {
        self.counters
            .get(&dot.replica)
            .map(|set| set.contains(&dot.counter))
            .unwrap_or(false)
    }

    /// Returns a new context with `dot` recorded. Idempotent.
    pub fn add(&self, dot: Dot) -> Self {
        let mut counters = self.counters.clone();
        counters
            .entry(dot.replica)
            .or_insert_with(OrdSet::new)
            .insert(dot.counter);
        Self { counters }
    }

    /// Largest counter recorded for `replica`, or 0 if none.
    pub fn max_for(&self, replica: ReplicaId) -> u64 {
        self.counters
            .get(&replica)
            .and_then(|set| set.max())
            .copied()
            .unwrap_or(0)
    }

    pub fn equal(&self, other: &Self) -> bool {
        for replica in self.all_replicas(other) {
            let a = self.set_for(replica);
            let b = other.set_for(replica);
            if !a.equal(&b) {
                return false;
            }
        }
        true
    }

    /// Strict subset: every replica's counters in `self` are contained in
    /// `other`'s, and at least one containment is strict.
    pub fn lt(&self, other: &Self) -> bool {
        let mut strict = false;
        for replica in self.all_replicas(other) {
            let a = self.set_for(replica);
            let b = other.set_for(replica);
            if !a.subset(&b) {
                return false;
            }
            if a.size() < b.size() {
                strict = true;
            }
        }
        strict
    }

    pub fn join(&self, other: &Self) -> Self {
        let mut counters = self.counters.clone();
        for (replica, set) in &other.counters {
            counters
                .entry(*replica)
                .and_modify(|existing| *existing = existing.union(set))
                .or_insert_with(|| set.clone());
        }
        Self { counters }
    }

    /// Counters present in `self` but absent from `earlier`, per replica.
    /// Replicas with an empty remainder are omitted from the result.
    pub fn since(&self, earlier: &Self) -> Self {
        let mut counters = BTreeMap::new();
        for (replica, set) in &self.counters {
            let earlier_set = earlier.set_for(*replica);
            let remainder = set.difference(&earlier_set);
            if !remainder.is_empty() {
                counters.insert(*replica, remainder);
            }
        }
        Self { counters }
    }

    pub fn is_empty(&self) -> bool {
        self.counters.values().all(|set| set.is_empty())
    }

    fn set_for(&self, replica: ReplicaId) -> OrdSet<u64> {
        self.counters.get(&replica).cloned().unwrap_or_default()
    }

    fn all_replicas(&self, other: &Self) -> impl Iterator<Item = ReplicaId> {
        let mut replicas: Vec<ReplicaId> =
            self.counters.keys().chain(other.counters.keys()).copied().collect();
        replicas.sort();
        replicas.dedup();
        replicas.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn replica(byte: u8) -> ReplicaId {
        ReplicaId::from_bytes([byte; 16])
    }

    fn ctx_from(pairs: &[(u8, u64)]) -> Context {
        let mut ctx = Context::new();
        for (r, c) in pairs {
            ctx = ctx.add(Dot::new(replica(*r), *c).unwrap());
        }
        ctx
    }

    #[test]
    fn add_is_idempotent() {
        let r = replica(1);
        let d = Dot::new(r, 1).unwrap();
        let ctx = Context::new().add(d);
        assert!(ctx.add(d).equal(&ctx));
    }

    #[test]
    fn join_is_identity_with_empty() {
        let ctx = ctx_from(&[(1, 1), (1, 2), (2, 5)]);
        assert!(ctx.join(&Context::new()).equal(&ctx));
    }

    #[test]
    fn since_removes_known_prefix() {
        let a = ctx_from(&[(1, 1), (1, 2), (1, 3)]);
        let earlier = ctx_from(&[(1, 1), (1, 2)]);
        let remainder = a.since(&earlier);
        assert!(remainder.contains(Dot::new(replica(1), 3).unwrap()));
        assert!(!remainder.contains(Dot::new(replica(1), 1).unwrap()));
    }

    #[test]
    fn missing_replica_counts_as_empty() {
        let a = ctx_from(&[(2, 1)]);
        assert_eq!(a.max_for(replica(9)), 0);
    }

    #[test]
    fn lt_is_strict() {
        let a = ctx_from(&[(1, 1)]);
        let b = ctx_from(&[(1, 1), (1, 2)]);
        assert!(a.lt(&b));
        assert!(!b.lt(&a));
        assert!(!a.lt(&a));
    }

    proptest! {
        #[test]
        fn join_is_commutative(
            a in prop::collection::vec((0u8..4, 1u64..50), 0..20),
            b in prop::collection::vec((0u8..4, 1u64..50), 0..20)
        ) {
            let ca = ctx_from(&a);
            let cb = ctx_from(&b);
            prop_assert!(ca.join(&cb).equal(&cb.join(&ca)));
        }

        #[test]
        fn join_is_idempotent(a in prop::collection::vec((0u8..4, 1u64..50), 0..20)) {
            let ca = ctx_from(&a);
            prop_assert!(ca.join(&ca).equal(&ca));
        }

        #[test]
        fn since_join_inclusion(
            a in prop::collection::vec((0u8..4, 1u64..50), 0..20),
            b in prop::collection::vec((0u8..4, 1u64..50), 0..20)
        ) {
            let ca = ctx_from(&a);
            let cb = ctx_from(&b);
            let joined = ca.join(&cb);
            let remainder = joined.since(&ca);
            // everything left over must have come from b
            for (r, c) in &b {
                let d = Dot::new(replica(*r), *c).unwrap();
                if !ca.contains(d) {
                    prop_assert!(remainder.contains(d));
                }
            }
        }
    }
}
