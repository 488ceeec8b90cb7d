//! The CRDT capability contract.
//!
//! Generalizes [`crate::lattice::Lattice`]/[`crate::lattice::DeltaCRDT`] into
//! a single trait that carries an explicit causal [`Context`] and a
//! fallible, dot-aware mutation entry point, so the replica state machine
//! can stay generic over whichever CRDT a `crdt_id` is bound to.

use crate::context::Context;
use crate::dot::Dot;
use thiserror::Error;

/// Errors a [`CrdtContract`] implementation may report. These are
/// propagated verbatim by the replica state machine; it never interprets
/// them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("operation rejected: {0}")]
    Rejected(String),

    #[error("delta incompatible with current state: {0}")]
    IncompatibleDelta(String),

    #[error("malformed operation: {0}")]
    InvalidOperation(String),
}

pub type ContractResult<T> = std::result::Result<T, ContractError>;

/// Every CRDT hosted by a replica implements this. `Op` is the type of
/// mutation requests the CRDT accepts; `Delta` is what a mutation or a
/// remote merge exchanges over the wire.
pub trait CrdtContract: Sized + Clone + PartialEq {
    type Op;
    type Value;
    type Delta: Clone;

    /// Lattice bottom. `value(zero())` must equal the identity value.
    fn zero() -> Self;

    /// Pure projection to the externally visible value.
    fn value(&self) -> Self::Value;

    /// Wire-format version tag for this CRDT's binary encoding.
    fn version() -> u16;

    /// Stable name a replica binding's type tag is checked against. In a
    /// dynamically-dispatched host this would key a registry lookup; here
    /// it is the one place an unrecognized type tag can still surface as
    /// `ImplementationMissing`, since every `CrdtContract` impl otherwise
    /// satisfies the whole contract at compile time.
    fn type_tag() -> &'static str;

    /// Apply a local operation, minted at `dot`. Returns the new state and
    /// a delta sufficient to reproduce the new information at a peer.
    fn mutate(&self, op: &Self::Op, dot: Dot) -> ContractResult<(Self, Self::Delta)>;

    /// Monotone merge of a remote delta. Must be commutative, associative,
    /// and idempotent over `(state, delta)` for any delta any replica
    /// could have produced.
    fn apply_delta(&self, delta: &Self::Delta, ctx: &Context) -> ContractResult<Self>;

    /// Lattice least upper bound of two full states.
    fn join(&self, other: &Self) -> ContractResult<Self>;

    /// Causal context embedded in the state. May be empty for purely
    /// state-based CRDTs (such as the grow-only counter) that do not
    /// track per-dot provenance internally.
    fn context(&self) -> Context;
}
