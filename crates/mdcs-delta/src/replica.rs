//! The replica state machine: minting, local/remote application, and the
//! digest/delta entry points anti-entropy relies on.
//!
//! Generic over one [`CrdtContract`] implementation: every bound
//! `crdt_id` hosts an instance of that same CRDT type. A replica calling
//! `add_crdt` with a type tag other than that CRDT's own is the one seam
//! where `ImplementationMissing` can still occur in this statically typed
//! core (see the contract's `type_tag`).

use crate::components::Components;
use crate::digest::Digest;
use crate::bundle::DeltaBundle;
use crate::error::{ReplicaError, Result};
use mdcs_core::{Context, CrdtContract, CrdtId, Dot, ReplicaId, ReplicaPolicy};
use serde_json::Value as MetaValue;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub struct CrdtBinding<T: CrdtContract> {
    pub type_tag: String,
    pub state: T,
    pub meta: BTreeMap<String, MetaValue>,
}

#[derive(Clone, Debug)]
pub struct AddCrdtOptions<T> {
    pub overwrite: bool,
    pub initial_state: Option<T>,
}

impl<T> Default for AddCrdtOptions<T> {
    fn default() -> Self {
        Self {
            overwrite: false,
            initial_state: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ReplicaState<T: CrdtContract> {
    id: ReplicaId,
    crdts: BTreeMap<CrdtId, CrdtBinding<T>>,
    ctx: Context,
    components: Components<T::Delta>,
    policy: ReplicaPolicy,
}

impl<T: CrdtContract> ReplicaState<T> {
    pub fn new(id: ReplicaId, policy: ReplicaPolicy) -> Self {
        Self {
            id,
            crdts: BTreeMap::new(),
            ctx: Context::new(),
            components: Components::new(),
            policy,
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.id
    }

    pub fn policy(&self) -> &ReplicaPolicy {
        &self.policy
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// How far this replica's log has incorporated a given origin's
    /// stream for `crdt_id`. A host tracking per-peer progress (rather
    /// than relying on the narrower self-describing [`Self::digest`])
    /// builds a `Digest` from this to ask that origin's replica for its
    /// own new deltas, e.g. `peer.delta(&digest_from(origin_counter))`.
    pub fn known_counter(&self, crdt_id: CrdtId, origin: ReplicaId) -> u64 {
        self.components
            .frontier(crdt_id)
            .get(&origin)
            .copied()
            .unwrap_or(0)
    }

    pub fn add_crdt(&self, crdt_id: CrdtId, type_tag: &str, opts: AddCrdtOptions<T>) -> Result<Self> {
        if self.crdts.contains_key(&crdt_id) && !opts.overwrite {
            return Err(ReplicaError::AlreadyExists(crdt_id.to_hex()));
        }
        if type_tag != T::type_tag() {
            return Err(ReplicaError::ImplementationMissing {
                type_tag: type_tag.to_string(),
                missing: vec![format!(
                    "no registered implementation for type tag '{type_tag}' (this replica only hosts '{}')",
                    T::type_tag()
                )],
            });
        }
        let mut crdts = self.crdts.clone();
        let state = opts.initial_state.unwrap_or_else(T::zero);
        crdts.insert(
            crdt_id,
            CrdtBinding {
                type_tag: type_tag.to_string(),
                state,
                meta: BTreeMap::new(),
            },
        );
        Ok(Self {
            crdts,
            ..self.clone()
        })
    }

    /// Idempotent `add_crdt`: success, unchanged, if already bound.
    pub fn ensure_crdt(&self, crdt_id: CrdtId, type_tag: &str) -> Result<Self> {
        if self.crdts.contains_key(&crdt_id) {
            return Ok(self.clone());
        }
        self.add_crdt(crdt_id, type_tag, AddCrdtOptions::default())
    }

    pub fn fetch_crdt(&self, crdt_id: CrdtId) -> Result<&CrdtBinding<T>> {
        self.crdts
            .get(&crdt_id)
            .ok_or_else(|| ReplicaError::CrdtNotFound(crdt_id.to_hex()))
    }

    pub fn list_crdts(&self) -> impl Iterator<Item = (&CrdtId, &str, &BTreeMap<String, MetaValue>)> {
        self.crdts
            .iter()
            .map(|(id, binding)| (id, binding.type_tag.as_str(), &binding.meta))
    }

    pub fn update_crdt_meta(
        &self,
        crdt_id: CrdtId,
        new_meta: BTreeMap<String, MetaValue>,
    ) -> Result<Self> {
        let mut crdts = self.crdts.clone();
        let binding = crdts
            .get_mut(&crdt_id)
            .ok_or_else(|| ReplicaError::CrdtNotFound(crdt_id.to_hex()))?;
        binding.meta = new_meta;
        Ok(Self {
            crdts,
            ..self.clone()
        })
    }

    /// Same as [`Self::update_crdt_meta`], but derives the replacement meta
    /// from the current one via a pure callback rather than supplying it
    /// directly.
    pub fn update_crdt_meta_with<F>(&self, crdt_id: CrdtId, derive: F) -> Result<Self>
    where
        F: FnOnce(&BTreeMap<String, MetaValue>) -> BTreeMap<String, MetaValue>,
    {
        let binding = self
            .crdts
            .get(&crdt_id)
            .ok_or_else(|| ReplicaError::CrdtNotFound(crdt_id.to_hex()))?;
        let new_meta = derive(&binding.meta);
        self.update_crdt_meta(crdt_id, new_meta)
    }

    /// Local mutation. Mints the next dot for this replica, applies it
    /// through the CRDT, appends to the log, and extends the context —
    /// all or nothing: any failure after minting leaves `self` untouched
    /// (the caller simply keeps using `self`, since this returns a new
    /// value rather than mutating in place).
    pub fn apply_op(&self, crdt_id: CrdtId, op: &T::Op) -> Result<Self> {
        let counter = self.ctx.max_for(self.id) + 1;
        let dot = Dot::new(self.id, counter).expect("counter minted above zero");

        let binding = self
            .crdts
            .get(&crdt_id)
            .ok_or_else(|| ReplicaError::CrdtNotFound(crdt_id.to_hex()))?;

        let (new_state, delta) = binding.state.mutate(op, dot)?;

        let components = self
            .components
            .append(crdt_id, self.id, dot.counter, delta)?;

        let mut crdts = self.crdts.clone();
        crdts.get_mut(&crdt_id).expect("checked above").state = new_state;

        let ctx = self.ctx.add(dot);

        debug!(crdt = %crdt_id, counter, "applied local operation");

        Ok(Self {
            id: self.id,
            crdts,
            ctx,
            components,
            policy: self.policy.clone(),
        })
    }

    /// Remote ingestion. Idempotent: re-delivering a dot already in the
    /// context succeeds without any change.
    pub fn apply_remote(&self, crdt_id: CrdtId, dot: Dot, delta: T::Delta) -> Result<Self> {
        if self.ctx.contains(dot) {
            return Ok(self.clone());
        }
        if !dot.is_valid() {
            return Err(ReplicaError::InvalidDot);
        }

        let binding = self
            .crdts
            .get(&crdt_id)
            .ok_or_else(|| ReplicaError::CrdtNotFound(crdt_id.to_hex()))?;

        let new_state = binding.state.apply_delta(&delta, &self.ctx)?;

        let components = match self.components.append(crdt_id, dot.replica, dot.counter, delta) {
            Ok(components) => components,
            Err(err) => {
                warn!(crdt = %crdt_id, dot = ?dot, "log already held a dot absent from context");
                return Err(err);
            }
        };

        let mut crdts = self.crdts.clone();
        crdts.get_mut(&crdt_id).expect("checked above").state = new_state;

        let ctx = self.ctx.add(dot);

        debug!(crdt = %crdt_id, dot = ?dot, "applied remote delta");

        Ok(Self {
            id: self.id,
            crdts,
            ctx,
            components,
            policy: self.policy.clone(),
        })
    }

    /// Summarizes local progress: for every bound crdt, `(self_id,
    /// max_for(self_id))`. This is intentionally the same local maximum
    /// for every crdt, not a per-crdt count — it reflects what this
    /// replica could send, not what it has done per crdt.
    pub fn digest(&self) -> Digest {
        let mut digest = Digest::new();
        let local_max = self.ctx.max_for(self.id);
        for crdt_id in self.crdts.keys() {
            digest.set(*crdt_id, self.id, local_max);
        }
        digest
    }

    /// The bundle of this replica's own authored deltas a peer hasn't
    /// seen yet, according to `since_digest`.
    pub fn delta(&self, since_digest: &Digest) -> DeltaBundle<T::Delta> {
        let mut bundle = DeltaBundle::new();
        for crdt_id in self.crdts.keys().copied() {
            let counter_exclusive = since_digest.counter(crdt_id);
            for (counter, delta) in self.components.since(crdt_id, self.id, counter_exclusive) {
                let dot = Dot::new(self.id, counter).expect("log only stores valid counters");
                bundle.insert(crdt_id, dot, delta);
            }
        }
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdcs_core::{GCounter, Increment};

    fn replica_id(byte: u8) -> ReplicaId {
        ReplicaId::from_bytes([byte; 16])
    }

    fn crdt_id(byte: u8) -> CrdtId {
        CrdtId::from_bytes([byte; 16])
    }

    fn fresh_replica(byte: u8) -> ReplicaState<GCounter> {
        let replica = ReplicaState::<GCounter>::new(replica_id(byte), ReplicaPolicy::new());
        replica
            .add_crdt(crdt_id(0x11), "gcounter", AddCrdtOptions::default())
            .unwrap()
    }

    #[test]
    fn s1_local_increments_and_digest() {
        let a = fresh_replica(0x0a);
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(3)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();

        assert_eq!(a.fetch_crdt(crdt_id(0x11)).unwrap().state.value(), 5);
        let digest = a.digest();
        assert_eq!(digest.counter(crdt_id(0x11)), 3);

        let entries = a.components.since(crdt_id(0x11), replica_id(0x0a), 0);
        assert_eq!(entries.len(), 3);
    }

    #[test]
    fn s2_duplicate_apply_remote_is_a_no_op() {
        let b = fresh_replica(0x0b);
        let dot = Dot::new(replica_id(0x0a), 1).unwrap();
        let delta = GCounter::zero().mutate(&Increment(1), dot).unwrap().1;

        let b1 = b.apply_remote(crdt_id(0x11), dot, delta.clone()).unwrap();
        let b2 = b1.apply_remote(crdt_id(0x11), dot, delta).unwrap();

        assert_eq!(
            b1.fetch_crdt(crdt_id(0x11)).unwrap().state.value(),
            b2.fetch_crdt(crdt_id(0x11)).unwrap().state.value()
        );
        assert_eq!(b2.components.since(crdt_id(0x11), replica_id(0x0a), 0).len(), 1);
    }

    #[test]
    fn s3_convergence_via_bundle() {
        let a = fresh_replica(0x0a);
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(3)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();

        let peer = ReplicaState::<GCounter>::new(replica_id(0x0b), ReplicaPolicy::new())
            .add_crdt(crdt_id(0x11), "gcounter", AddCrdtOptions::default())
            .unwrap();

        let peer_digest = peer.digest();
        let bundle = a.delta(&peer_digest);
        assert_eq!(bundle.items_for(crdt_id(0x11)).len(), 3);

        let mut peer = peer;
        for (dot, delta) in bundle.items_for(crdt_id(0x11)) {
            peer = peer.apply_remote(crdt_id(0x11), *dot, delta.clone()).unwrap();
        }

        assert_eq!(
            a.fetch_crdt(crdt_id(0x11)).unwrap().state.value(),
            peer.fetch_crdt(crdt_id(0x11)).unwrap().state.value()
        );
    }

    #[test]
    fn s4_partial_catch_up_then_remainder() {
        let a = fresh_replica(0x0a);
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();
        let a = a.apply_op(crdt_id(0x11), &Increment(1)).unwrap();

        let mut peer = ReplicaState::<GCounter>::new(replica_id(0x0b), ReplicaPolicy::new())
            .add_crdt(crdt_id(0x11), "gcounter", AddCrdtOptions::default())
            .unwrap();

        let mut peer_digest = Digest::new();
        peer_digest.set(crdt_id(0x11), replica_id(0x0a), 0);
        let first_bundle = a.delta(&peer_digest);
        let items = first_bundle.items_for(crdt_id(0x11));
        for (dot, delta) in items.iter().take(2) {
            peer = peer.apply_remote(crdt_id(0x11), *dot, delta.clone()).unwrap();
        }

        peer_digest.set(crdt_id(0x11), replica_id(0x0a), 2);
        let remainder = a.delta(&peer_digest);
        assert_eq!(remainder.items_for(crdt_id(0x11)).len(), 1);
        assert_eq!(remainder.items_for(crdt_id(0x11))[0].0.counter, 3);
    }

    #[test]
    fn apply_op_fails_atomically_for_unbound_crdt() {
        let a = ReplicaState::<GCounter>::new(replica_id(0x0a), ReplicaPolicy::new());
        let err = a.apply_op(crdt_id(0x99), &Increment(1));
        assert!(err.is_err());
    }

    #[test]
    fn add_crdt_rejects_unrecognized_type_tag() {
        let a = ReplicaState::<GCounter>::new(replica_id(0x0a), ReplicaPolicy::new());
        let err = a.add_crdt(crdt_id(0x11), "not-a-gcounter", AddCrdtOptions::default());
        assert!(matches!(err, Err(ReplicaError::ImplementationMissing { .. })));
    }

    #[test]
    fn ensure_crdt_is_idempotent() {
        let a = fresh_replica(0x0a);
        let a2 = a.ensure_crdt(crdt_id(0x11), "gcounter").unwrap();
        assert_eq!(a.fetch_crdt(crdt_id(0x11)).unwrap().state, a2.fetch_crdt(crdt_id(0x11)).unwrap().state);
    }

    #[test]
    fn update_crdt_meta_with_derives_from_the_current_value() {
        let a = fresh_replica(0x0a);
        let mut meta = BTreeMap::new();
        meta.insert("label".to_string(), MetaValue::String("v1".to_string()));
        let a = a.update_crdt_meta(crdt_id(0x11), meta).unwrap();

        let a = a
            .update_crdt_meta_with(crdt_id(0x11), |current| {
                let mut updated = current.clone();
                updated.insert("label".to_string(), MetaValue::String("v2".to_string()));
                updated
            })
            .unwrap();

        assert_eq!(
            a.fetch_crdt(crdt_id(0x11)).unwrap().meta.get("label"),
            Some(&MetaValue::String("v2".to_string()))
        );
    }
}
