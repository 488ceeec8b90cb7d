//! Per-CRDT progress summaries exchanged during anti-entropy.
//!
//! A digest maps each known `crdt_id` to the `(origin, counter)` pair a
//! peer can use to ask "send me everything after this". Missing entries
//! mean counter 0 — the peer has seen nothing for that CRDT yet.

use mdcs_core::{CrdtId, ReplicaId};
use std::collections::BTreeMap;

const DIGEST_VERSION: u16 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Digest {
    entries: BTreeMap<CrdtId, (ReplicaId, u64)>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestCodecError {
    #[error("unsupported digest version {0}")]
    UnsupportedVersion(u16),
    #[error("truncated digest encoding")]
    Truncated,
    #[error("trailing bytes after digest encoding")]
    TrailingBytes,
    #[error("duplicate crdt id in digest encoding")]
    DuplicateKey,
    #[error("id field too long to encode ({0} bytes)")]
    LengthOverflow(usize),
}

type CodecResult<T> = std::result::Result<T, DigestCodecError>;

impl Digest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, crdt_id: CrdtId, origin: ReplicaId, counter: u64) {
        self.entries.insert(crdt_id, (origin, counter));
    }

    pub fn counter(&self, crdt_id: CrdtId) -> u64 {
        self.entries.get(&crdt_id).map(|(_, c)| *c).unwrap_or(0)
    }

    pub fn origin(&self, crdt_id: CrdtId) -> Option<ReplicaId> {
        self.entries.get(&crdt_id).map(|(o, _)| *o)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn crdt_ids(&self) -> impl Iterator<Item = &CrdtId> {
        self.entries.keys()
    }

    /// First origin recorded in this digest, in `crdt_id` order. Used by
    /// [`crate::components::Components::since_digest`] for CRDTs the
    /// digest doesn't mention.
    pub fn first_origin(&self) -> Option<ReplicaId> {
        self.entries.values().next().map(|(o, _)| *o)
    }

    /// Per-crdt maximum by counter; origin follows the winning counter,
    /// ties keep `self`'s origin.
    pub fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (crdt_id, (origin, counter)) in &other.entries {
            entries
                .entry(*crdt_id)
                .and_modify(|(existing_origin, existing_counter)| {
                    if *counter > *existing_counter {
                        *existing_origin = *origin;
                        *existing_counter = *counter;
                    }
                })
                .or_insert((*origin, *counter));
        }
        Self { entries }
    }

    /// Counter equality across the union of keys (missing = 0); origins
    /// are ignored.
    pub fn eq_counters(&self, other: &Self) -> bool {
        for crdt_id in self.all_crdt_ids(other) {
            if self.counter(crdt_id) != other.counter(crdt_id) {
                return false;
            }
        }
        true
    }

    /// Strict dominance by counter: every crdt in `self` has a counter
    /// `>=` the same crdt in `other`, at least one is strictly greater,
    /// and every non-zero key in `other` exists in `self`.
    pub fn gt(&self, other: &Self) -> bool {
        let mut strict = false;
        for (crdt_id, (_, other_counter)) in &other.entries {
            if *other_counter > 0 && !self.entries.contains_key(crdt_id) {
                return false;
            }
        }
        for crdt_id in self.all_crdt_ids(other) {
            let a = self.counter(crdt_id);
            let b = other.counter(crdt_id);
            if a < b {
                return false;
            }
            if a > b {
                strict = true;
            }
        }
        strict
    }

    /// Keeps only crdt ids where `ctx`'s counter strictly exceeds
    /// `earlier`'s.
    pub fn since(&self, earlier: &Self) -> Self {
        let mut entries = BTreeMap::new();
        for (crdt_id, (origin, counter)) in &self.entries {
            if *counter > earlier.counter(*crdt_id) {
                entries.insert(*crdt_id, (*origin, *counter));
            }
        }
        Self { entries }
    }

    /// Every key with a non-zero counter in `other` is present in `self`.
    pub fn covers_nonzero(&self, other: &Self) -> bool {
        other
            .entries
            .iter()
            .filter(|(_, (_, counter))| *counter > 0)
            .all(|(crdt_id, _)| self.entries.contains_key(crdt_id))
    }

    fn all_crdt_ids(&self, other: &Self) -> impl Iterator<Item = CrdtId> {
        let mut ids: Vec<CrdtId> = self
            .entries
            .keys()
            .chain(other.entries.keys())
            .copied()
            .collect();
        ids.sort();
        ids.dedup();
        ids.into_iter()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + self.entries.len() * 42);
        out.extend_from_slice(&DIGEST_VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (crdt_id, (origin, counter)) in &self.entries {
            let crdt_bytes = crdt_id.as_bytes();
            out.extend_from_slice(&(crdt_bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(crdt_bytes);
            let origin_bytes = origin.as_bytes();
            out.extend_from_slice(&(origin_bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(origin_bytes);
            out.extend_from_slice(&counter.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> CodecResult<Self> {
        let mut cursor = 0usize;
        let version = read_u16(bytes, &mut cursor)?;
        if version != DIGEST_VERSION {
            return Err(DigestCodecError::UnsupportedVersion(version));
        }
        let entry_count = read_u32(bytes, &mut cursor)? as usize;
        let mut entries = BTreeMap::new();
        for _ in 0..entry_count {
            let crdt_id = read_id(bytes, &mut cursor)?;
            let origin = read_id(bytes, &mut cursor)?;
            let counter = read_u64(bytes, &mut cursor)?;
            if entries
                .insert(CrdtId::from_bytes(crdt_id), (ReplicaId::from_bytes(origin), counter))
                .is_some()
            {
                return Err(DigestCodecError::DuplicateKey);
            }
        }
        if cursor != bytes.len() {
            return Err(DigestCodecError::TrailingBytes);
        }
        Ok(Self { entries })
    }
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> CodecResult<u16> {
    let slice = read_slice(bytes, cursor, 2)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> CodecResult<u32> {
    let slice = read_slice(bytes, cursor, 4)?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> CodecResult<u64> {
    let slice = read_slice(bytes, cursor, 8)?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

fn read_id(bytes: &[u8], cursor: &mut usize) -> CodecResult<[u8; 16]> {
    let len = read_u16(bytes, cursor)? as usize;
    if len != 16 {
        return Err(DigestCodecError::LengthOverflow(len));
    }
    let slice = read_slice(bytes, cursor, len)?;
    let mut arr = [0u8; 16];
    arr.copy_from_slice(slice);
    Ok(arr)
}

fn read_slice<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> CodecResult<&'a [u8]> {
    if *cursor + len > bytes.len() {
        return Err(DigestCodecError::Truncated);
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crdt(byte: u8) -> CrdtId {
        CrdtId::from_bytes([byte; 16])
    }

    fn replica(byte: u8) -> ReplicaId {
        ReplicaId::from_bytes([byte; 16])
    }

    #[test]
    fn encode_decode_round_trip_matches_worked_example() {
        let mut d = Digest::new();
        d.set(crdt(0x11), replica(0x0a), 7);
        let bytes = d.encode();
        assert_eq!(bytes.len(), 2 + 4 + 2 + 16 + 2 + 16 + 8);
        assert_eq!(Digest::decode(&bytes).unwrap(), d);
    }

    #[test]
    fn merge_keeps_larger_counter() {
        let mut a = Digest::new();
        a.set(crdt(1), replica(1), 3);
        let mut b = Digest::new();
        b.set(crdt(1), replica(2), 5);
        let merged = a.merge(&b);
        assert_eq!(merged.counter(crdt(1)), 5);
        assert_eq!(merged.origin(crdt(1)), Some(replica(2)));
    }

    #[test]
    fn gt_requires_strict_and_covering() {
        let mut a = Digest::new();
        a.set(crdt(1), replica(1), 3);
        let mut b = Digest::new();
        b.set(crdt(1), replica(1), 2);
        assert!(a.gt(&b));
        assert!(!b.gt(&a));
        assert!(!a.gt(&a));
    }

    #[test]
    fn since_keeps_only_advanced_entries() {
        let mut newer = Digest::new();
        newer.set(crdt(1), replica(1), 5);
        newer.set(crdt(2), replica(1), 2);
        let mut older = Digest::new();
        older.set(crdt(1), replica(1), 3);
        older.set(crdt(2), replica(1), 2);
        let diff = newer.since(&older);
        assert_eq!(diff.counter(crdt(1)), 5);
        assert_eq!(diff.counter(crdt(2)), 0);
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut bytes = vec![0u8, 9];
        bytes.extend_from_slice(&0u32.to_be_bytes());
        assert!(matches!(
            Digest::decode(&bytes),
            Err(DigestCodecError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let d = Digest::new();
        let mut bytes = d.encode();
        bytes.push(0);
        assert!(matches!(
            Digest::decode(&bytes),
            Err(DigestCodecError::TrailingBytes)
        ));
    }
}
