//! Grow-only counter: the reference implementation of [`CrdtContract`].
//!
//! State is a per-replica map to a non-negative count; the externally
//! visible value is the sum. A delta is the singleton update for the
//! replica that produced it, and both `apply_delta` and `join` are
//! pointwise maximum.

use crate::context::Context;
use crate::contract::{ContractError, ContractResult, CrdtContract};
use crate::dot::Dot;
use crate::ids::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const VERSION: u16 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: BTreeMap<ReplicaId, u64>,
}

/// Increment by `n` (must be non-zero to do anything; `n = 0` is accepted
/// as a no-op mutation that still mints a dot, matching `inc` with an
/// implicit amount of zero being meaningless but not an error).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Increment(pub u64);

impl GCounter {
    pub fn get(&self, replica: ReplicaId) -> u64 {
        self.counts.get(&replica).copied().unwrap_or(0)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.counts.len() * 26);
        out.extend_from_slice(&VERSION.to_be_bytes());
        out.extend_from_slice(&(self.counts.len() as u32).to_be_bytes());
        for (replica, value) in &self.counts {
            let id_bytes = replica.as_bytes();
            out.extend_from_slice(&(id_bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(id_bytes);
            out.extend_from_slice(&value.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> ContractResult<Self> {
        let mut cursor = 0usize;
        let version = read_u16(bytes, &mut cursor)?;
        if version != VERSION {
            return Err(ContractError::InvalidOperation(format!(
                "unsupported gcounter version {version}"
            )));
        }
        let entry_count = read_u32(bytes, &mut cursor)? as usize;
        let mut counts = BTreeMap::new();
        for _ in 0..entry_count {
            let id_len = read_u16(bytes, &mut cursor)? as usize;
            if id_len != 16 {
                return Err(ContractError::InvalidOperation(format!(
                    "unexpected replica id length {id_len}"
                )));
            }
            let id_bytes = read_bytes(bytes, &mut cursor, id_len)?;
            let mut arr = [0u8; 16];
            arr.copy_from_slice(id_bytes);
            let replica = ReplicaId::from_bytes(arr);
            let value = read_u64(bytes, &mut cursor)?;
            if counts.insert(replica, value).is_some() {
                return Err(ContractError::InvalidOperation(
                    "duplicate replica entry in gcounter encoding".into(),
                ));
            }
        }
        if cursor != bytes.len() {
            return Err(ContractError::InvalidOperation(
                "trailing bytes in gcounter encoding".into(),
            ));
        }
        Ok(Self { counts })
    }
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> ContractResult<u16> {
    let slice = read_bytes(bytes, cursor, 2)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> ContractResult<u32> {
    let slice = read_bytes(bytes, cursor, 4)?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> ContractResult<u64> {
    let slice = read_bytes(bytes, cursor, 8)?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

fn read_bytes<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> ContractResult<&'a [u8]> {
    if *cursor + len > bytes.len() {
        return Err(ContractError::InvalidOperation(
            "truncated gcounter encoding".into(),
        ));
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

impl CrdtContract for GCounter {
    type Op = Increment;
    type Value = u64;
    type Delta = GCounter;

    fn zero() -> Self {
        Self::default()
    }

    fn value(&self) -> u64 {
        self.counts.values().sum()
    }

    fn version() -> u16 {
        VERSION
    }

    fn type_tag() -> &'static str {
        "gcounter"
    }

    fn mutate(&self, op: &Increment, dot: Dot) -> ContractResult<(Self, Self::Delta)> {
        let current = self.get(dot.replica);
        let updated = current + op.0;
        let mut counts = self.counts.clone();
        counts.insert(dot.replica, updated);
        let new_state = Self { counts };
        let mut delta_counts = BTreeMap::new();
        delta_counts.insert(dot.replica, updated);
        let delta = Self {
            counts: delta_counts,
        };
        Ok((new_state, delta))
    }

    fn apply_delta(&self, delta: &Self::Delta, _ctx: &Context) -> ContractResult<Self> {
        self.join(delta)
    }

    fn join(&self, other: &Self) -> ContractResult<Self> {
        let mut counts = self.counts.clone();
        for (replica, value) in &other.counts {
            counts
                .entry(*replica)
                .and_modify(|existing| *existing = (*existing).max(*value))
                .or_insert(*value);
        }
        Ok(Self { counts })
    }

    fn context(&self) -> Context {
        Context::new()
    }
}
