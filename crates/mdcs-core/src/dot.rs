//! Event identifiers.
//!
//! A dot names exactly one event produced by a replica: the replica's id
//! paired with a strictly positive counter. Two equal dots always denote
//! the same event.

use crate::ids::ReplicaId;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Dot {
    pub replica: ReplicaId,
    pub counter: u64,
}

impl Dot {
    /// `counter` must be strictly positive; the core never mints or
    /// accepts a dot at counter 0.
    pub fn new(replica: ReplicaId, counter: u64) -> Option<Self> {
        if counter == 0 {
            return None;
        }
        Some(Self { replica, counter })
    }

    pub fn is_valid(&self) -> bool {
        self.counter > 0
    }
}
