//! The four anti-entropy message payloads and the envelope that frames
//! them with a [`Header`].

use crate::error::{ProtocolError, Result};
use crate::header::{Header, MessageType};
use mdcs_core::{CrdtId, ReplicaId};
use mdcs_delta::{Digest, DeltaBundle};
use tracing::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncType {
    Full,
    Delta,
}

impl SyncType {
    fn to_byte(self) -> u8 {
        match self {
            SyncType::Full => 0,
            SyncType::Delta => 1,
        }
    }

    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(SyncType::Full),
            1 => Ok(SyncType::Delta),
            other => Err(ProtocolError::InvalidBinary(format!(
                "unrecognized sync_type byte {other}"
            ))),
        }
    }
}

/// Wire-level delta bundle: the delta payload for each item is an opaque,
/// already-encoded blob produced by the owning CRDT's own codec.
pub type WireBundle = DeltaBundle<Vec<u8>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    DigestRequest,
    DigestResponse(Digest),
    SyncRequest {
        sync_type: SyncType,
        digest: Option<Digest>,
    },
    SyncResponse {
        digest: Option<Digest>,
        bundle: WireBundle,
    },
}

impl Message {
    fn message_type(&self) -> MessageType {
        match self {
            Message::DigestRequest => MessageType::DigestRequest,
            Message::DigestResponse(_) => MessageType::DigestResponse,
            Message::SyncRequest { .. } => MessageType::SyncRequest,
            Message::SyncResponse { .. } => MessageType::SyncResponse,
        }
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        match self {
            Message::DigestRequest => Ok(Vec::new()),
            Message::DigestResponse(digest) => Ok(digest.encode()),
            Message::SyncRequest { sync_type, digest } => {
                let mut out = Vec::new();
                out.push(sync_type.to_byte());
                match digest {
                    Some(d) => {
                        out.push(1);
                        let bytes = d.encode();
                        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                        out.extend_from_slice(&bytes);
                    }
                    None => {
                        out.push(0);
                        out.extend_from_slice(&0u32.to_be_bytes());
                    }
                }
                Ok(out)
            }
            Message::SyncResponse { digest, bundle } => {
                let mut out = Vec::new();
                match digest {
                    Some(d) => {
                        out.push(1);
                        let bytes = d.encode();
                        out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                        out.extend_from_slice(&bytes);
                    }
                    None => {
                        out.push(0);
                        out.extend_from_slice(&0u32.to_be_bytes());
                    }
                }
                encode_bundle(bundle, &mut out)?;
                Ok(out)
            }
        }
    }

    pub fn encode_envelope(&self) -> Result<Vec<u8>> {
        let payload = self.encode_payload()?;
        if payload.len() > u32::MAX as usize {
            return Err(ProtocolError::LengthOverflow(payload.len()));
        }
        let header = Header::new(self.message_type(), payload.len() as u32);
        let mut out = Vec::with_capacity(crate::header::HEADER_LEN + payload.len());
        out.extend_from_slice(&header.encode());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn decode_envelope(bytes: &[u8]) -> Result<Self> {
        let header = Header::decode(bytes)?;
        let payload = &bytes[crate::header::HEADER_LEN..];
        let declared = header.payload_length as usize;
        if payload.len() < declared {
            return Err(ProtocolError::Truncated);
        }
        if payload.len() > declared {
            return Err(ProtocolError::TrailingBytes);
        }
        Self::decode_payload(header.message_type, payload)
    }

    fn decode_payload(message_type: MessageType, payload: &[u8]) -> Result<Self> {
        trace!(%message_type, payload_len = payload.len(), "decoding message payload");
        let result = Self::decode_payload_inner(message_type, payload);
        trace!(%message_type, ok = result.is_ok(), "decoded message payload");
        result
    }

    fn decode_payload_inner(message_type: MessageType, payload: &[u8]) -> Result<Self> {
        match message_type {
            MessageType::DigestRequest => {
                if !payload.is_empty() {
                    return Err(ProtocolError::TrailingBytes);
                }
                Ok(Message::DigestRequest)
            }
            MessageType::DigestResponse => {
                let digest = Digest::decode(payload)?;
                Ok(Message::DigestResponse(digest))
            }
            MessageType::SyncRequest => {
                let mut cursor = 0usize;
                let sync_type = SyncType::from_byte(read_u8(payload, &mut cursor)?)?;
                let include_digest = read_u8(payload, &mut cursor)? != 0;
                let digest_len = read_u32(payload, &mut cursor)? as usize;
                let digest_bytes = read_bytes(payload, &mut cursor, digest_len)?;
                let digest = if include_digest {
                    Some(Digest::decode(digest_bytes)?)
                } else {
                    None
                };
                if cursor != payload.len() {
                    return Err(ProtocolError::TrailingBytes);
                }
                Ok(Message::SyncRequest { sync_type, digest })
            }
            MessageType::SyncResponse => {
                let mut cursor = 0usize;
                let digest_flag = read_u8(payload, &mut cursor)? != 0;
                let digest_len = read_u32(payload, &mut cursor)? as usize;
                let digest_bytes = read_bytes(payload, &mut cursor, digest_len)?;
                let digest = if digest_flag {
                    Some(Digest::decode(digest_bytes)?)
                } else {
                    None
                };
                let bundle = decode_bundle(payload, &mut cursor)?;
                if cursor != payload.len() {
                    return Err(ProtocolError::TrailingBytes);
                }
                Ok(Message::SyncResponse { digest, bundle })
            }
        }
    }
}

fn encode_bundle(bundle: &WireBundle, out: &mut Vec<u8>) -> Result<()> {
    let crdt_ids: Vec<&CrdtId> = bundle.crdt_ids().collect();
    out.extend_from_slice(&(crdt_ids.len() as u32).to_be_bytes());
    for crdt_id in crdt_ids {
        let mut items: Vec<_> = bundle.items_for(*crdt_id).to_vec();
        items.sort_by(|a, b| {
            a.0.replica
                .as_bytes()
                .cmp(b.0.replica.as_bytes())
                .then(a.0.counter.cmp(&b.0.counter))
        });

        let id_bytes = crdt_id.as_bytes();
        out.extend_from_slice(&(id_bytes.len() as u16).to_be_bytes());
        out.extend_from_slice(id_bytes);
        out.extend_from_slice(&(items.len() as u32).to_be_bytes());
        for (dot, delta) in &items {
            out.extend_from_slice(dot.replica.as_bytes());
            out.extend_from_slice(&dot.counter.to_be_bytes());
            if delta.len() > u32::MAX as usize {
                return Err(ProtocolError::LengthOverflow(delta.len()));
            }
            out.extend_from_slice(&(delta.len() as u32).to_be_bytes());
            out.extend_from_slice(delta);
        }
    }
    Ok(())
}

fn decode_bundle(bytes: &[u8], cursor: &mut usize) -> Result<WireBundle> {
    let crdt_count = read_u32(bytes, cursor)?;
    let mut bundle = WireBundle::new();
    for _ in 0..crdt_count {
        let id_len = read_u16(bytes, cursor)? as usize;
        if id_len != 16 {
            return Err(ProtocolError::InvalidBinary(format!(
                "unexpected crdt id length {id_len}"
            )));
        }
        let id_bytes = read_bytes(bytes, cursor, id_len)?;
        let mut arr = [0u8; 16];
        arr.copy_from_slice(id_bytes);
        let crdt_id = CrdtId::from_bytes(arr);

        let item_count = read_u32(bytes, cursor)?;
        for _ in 0..item_count {
            let origin_bytes = read_bytes(bytes, cursor, 16)?;
            let mut origin_arr = [0u8; 16];
            origin_arr.copy_from_slice(origin_bytes);
            let origin = ReplicaId::from_bytes(origin_arr);
            let counter = read_u64(bytes, cursor)?;
            let delta_len = read_u32(bytes, cursor)? as usize;
            let delta = read_bytes(bytes, cursor, delta_len)?.to_vec();
            let dot = mdcs_core::Dot::new(origin, counter)
                .ok_or_else(|| ProtocolError::InvalidBinary("zero counter in bundle item".into()))?;
            bundle.insert(crdt_id, dot, delta);
        }
    }
    Ok(bundle)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    Ok(read_bytes(bytes, cursor, 1)?[0])
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    let slice = read_bytes(bytes, cursor, 2)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let slice = read_bytes(bytes, cursor, 4)?;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let slice = read_bytes(bytes, cursor, 8)?;
    Ok(u64::from_be_bytes(slice.try_into().unwrap()))
}

fn read_bytes<'a>(bytes: &'a [u8], cursor: &mut usize, len: usize) -> Result<&'a [u8]> {
    if *cursor + len > bytes.len() {
        return Err(ProtocolError::Truncated);
    }
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(byte: u8) -> ReplicaId {
        ReplicaId::from_bytes([byte; 16])
    }

    fn crdt(byte: u8) -> CrdtId {
        CrdtId::from_bytes([byte; 16])
    }

    #[test]
    fn digest_request_has_empty_payload() {
        let bytes = Message::DigestRequest.encode_envelope().unwrap();
        assert_eq!(bytes.len(), crate::header::HEADER_LEN);
        assert_eq!(Message::decode_envelope(&bytes).unwrap(), Message::DigestRequest);
    }

    #[test]
    fn digest_response_round_trips() {
        let mut digest = Digest::new();
        digest.set(crdt(0x11), replica(0x0a), 7);
        let msg = Message::DigestResponse(digest);
        let bytes = msg.encode_envelope().unwrap();
        assert_eq!(Message::decode_envelope(&bytes).unwrap(), msg);
    }

    #[test]
    fn sync_request_round_trips_with_and_without_digest() {
        let without = Message::SyncRequest {
            sync_type: SyncType::Full,
            digest: None,
        };
        let bytes = without.encode_envelope().unwrap();
        assert_eq!(Message::decode_envelope(&bytes).unwrap(), without);

        let mut digest = Digest::new();
        digest.set(crdt(1), replica(1), 3);
        let with = Message::SyncRequest {
            sync_type: SyncType::Delta,
            digest: Some(digest),
        };
        let bytes = with.encode_envelope().unwrap();
        assert_eq!(Message::decode_envelope(&bytes).unwrap(), with);
    }

    #[test]
    fn sync_response_round_trips() {
        let mut bundle = WireBundle::new();
        bundle.insert(
            crdt(0x11),
            mdcs_core::Dot::new(replica(0x0a), 1).unwrap(),
            vec![1, 2, 3],
        );
        let msg = Message::SyncResponse {
            digest: None,
            bundle,
        };
        let bytes = msg.encode_envelope().unwrap();
        assert_eq!(Message::decode_envelope(&bytes).unwrap(), msg);
    }

    #[test]
    fn decode_rejects_bytes_appended_after_a_well_formed_frame() {
        let mut bytes = Message::DigestRequest.encode_envelope().unwrap();
        bytes.push(0xff);
        assert!(matches!(
            Message::decode_envelope(&bytes),
            Err(ProtocolError::TrailingBytes)
        ));
    }
}
