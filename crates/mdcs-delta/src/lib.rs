//! MDCS Delta - Delta-state CRDT machinery
//!
//! This crate hosts the per-replica machinery layered on top of a
//! [`mdcs_core::CrdtContract`]: an append-only per-origin delta log
//! ([`Components`]), a compact progress summary ([`Digest`]), the batch of
//! deltas exchanged between replicas ([`DeltaBundle`]), and the replica
//! state machine itself ([`ReplicaState`]) that mints dots for local
//! mutations and idempotently absorbs remote ones.
//!
//! ## Convergence mode
//!
//! ```text
//! On local mutation op:
//!   dot = mint(self_id)
//!   (state', delta) = state.mutate(op, dot)
//!   components.append(crdt_id, self_id, dot.counter, delta)
//!
//! On receive (crdt_id, dot, delta) from a peer:
//!   if dot in context: skip (already seen)
//!   state' = state.apply_delta(delta)
//!   components.append(crdt_id, dot.replica, dot.counter, delta)
//! ```

pub mod bundle;
pub mod components;
pub mod digest;
pub mod error;
pub mod replica;

pub use bundle::DeltaBundle;
pub use components::Components;
pub use digest::{Digest, DigestCodecError};
pub use error::{ReplicaError, Result};
pub use replica::{AddCrdtOptions, CrdtBinding, ReplicaState};

