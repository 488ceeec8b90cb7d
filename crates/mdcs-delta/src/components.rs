//! The append-only per-CRDT delta log.
//!
//! Stored as a three-level map `crdt_id -> origin -> counter -> delta`.
//! Append does not require counters to be contiguous or monotonic for an
//! origin: whatever arrives is recorded, and callers dedupe through the
//! causal [`mdcs_core::Context`], not through log ordering.

use crate::bundle::DeltaBundle;
use crate::digest::Digest;
use crate::error::{ReplicaError, Result};
use mdcs_core::{CrdtId, Dot, ReplicaId};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct Components<D: Clone> {
    log: BTreeMap<CrdtId, BTreeMap<ReplicaId, BTreeMap<u64, D>>>,
}

impl<D: Clone> Default for Components<D> {
    fn default() -> Self {
        Self {
            log: BTreeMap::new(),
        }
    }
}

impl<D: Clone> Components<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delta at `(crdt_id, origin, counter)`. Fails with
    /// [`ReplicaError::Duplicate`] if that triple was already recorded;
    /// on failure the log is returned unchanged by the caller discarding
    /// the `Err` value (this method itself never mutates in place).
    pub fn append(&self, crdt_id: CrdtId, origin: ReplicaId, counter: u64, delta: D) -> Result<Self> {
        if counter == 0 {
            return Err(ReplicaError::InvalidDot);
        }
        let mut log = self.log.clone();
        let by_origin = log.entry(crdt_id).or_default();
        let by_counter = by_origin.entry(origin).or_default();
        if by_counter.contains_key(&counter) {
            return Err(ReplicaError::Duplicate {
                crdt_id: crdt_id.to_hex(),
                origin: origin.to_hex(),
                counter,
            });
        }
        by_counter.insert(counter, delta);
        Ok(Self { log })
    }

    /// Entries for `(crdt_id, origin)` with `counter > counter_exclusive`,
    /// ascending by counter.
    pub fn since(&self, crdt_id: CrdtId, origin: ReplicaId, counter_exclusive: u64) -> Vec<(u64, D)> {
        self.log
            .get(&crdt_id)
            .and_then(|by_origin| by_origin.get(&origin))
            .map(|by_counter| {
                by_counter
                    .range((counter_exclusive + 1)..)
                    .map(|(c, d)| (*c, d.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn origins(&self, crdt_id: CrdtId) -> Vec<ReplicaId> {
        self.log
            .get(&crdt_id)
            .map(|by_origin| by_origin.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn max_counter(&self, crdt_id: CrdtId, origin: ReplicaId) -> u64 {
        self.log
            .get(&crdt_id)
            .and_then(|by_origin| by_origin.get(&origin))
            .and_then(|by_counter| by_counter.keys().next_back())
            .copied()
            .unwrap_or(0)
    }

    pub fn frontier(&self, crdt_id: CrdtId) -> BTreeMap<ReplicaId, u64> {
        self.log
            .get(&crdt_id)
            .map(|by_origin| {
                by_origin
                    .iter()
                    .map(|(origin, by_counter)| {
                        (*origin, by_counter.keys().next_back().copied().unwrap_or(0))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn known_crdt_ids(&self) -> impl Iterator<Item = &CrdtId> {
        self.log.keys()
    }

    /// Derives a delta bundle for a remote peer from its digest.
    ///
    /// For every CRDT this log knows about:
    /// - if the digest names that crdt, send entries from the digest's
    ///   recorded origin past its recorded counter;
    /// - otherwise, if the digest is non-empty, send entries from its
    ///   first recorded origin only, from the beginning — this is an
    ///   intentional asymmetry, not "send everything unknown";
    /// - if the digest is empty entirely, this is a full sync: send every
    ///   entry from every origin for that crdt.
    ///
    /// CRDTs that yield no items are omitted from the bundle.
    pub fn since_digest(&self, digest: &Digest) -> DeltaBundle<D> {
        let mut bundle = DeltaBundle::new();
        let first_origin = digest.first_origin();

        for crdt_id in self.known_crdt_ids().copied().collect::<Vec<_>>() {
            if digest.is_empty() {
                for origin in self.origins(crdt_id) {
                    for (counter, delta) in self.since(crdt_id, origin, 0) {
                        bundle.insert(crdt_id, Dot::new(origin, counter).unwrap(), delta);
                    }
                }
                continue;
            }

            let origin = match digest.origin(crdt_id) {
                Some(origin) => origin,
                None => match first_origin {
                    Some(origin) => origin,
                    None => continue,
                },
            };
            let counter_exclusive = digest.counter(crdt_id);
            for (counter, delta) in self.since(crdt_id, origin, counter_exclusive) {
                bundle.insert(crdt_id, Dot::new(origin, counter).unwrap(), delta);
            }
        }
        bundle
    }
}
