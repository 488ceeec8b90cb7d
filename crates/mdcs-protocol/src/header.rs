//! The fixed 12-byte frame header.
//!
//! Layout, all big-endian: `u16 protocol_version || u16 message_type_id
//! || u32 flags || u32 payload_length`. `flags` is reserved; any non-zero
//! bit on receipt is a hard failure, leaving room for a future extension
//! without a version bump.

use crate::error::{ProtocolError, Result};
use std::fmt;
use tracing::trace;

pub const HEADER_LEN: usize = 12;
pub const PROTOCOL_VERSION: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageType {
    DigestRequest,
    DigestResponse,
    SyncRequest,
    SyncResponse,
}

impl MessageType {
    pub fn id(self) -> u16 {
        match self {
            MessageType::DigestRequest => 1,
            MessageType::DigestResponse => 2,
            MessageType::SyncRequest => 3,
            MessageType::SyncResponse => 4,
        }
    }

    pub fn from_id(id: u16) -> Result<Self> {
        match id {
            1 => Ok(MessageType::DigestRequest),
            2 => Ok(MessageType::DigestResponse),
            3 => Ok(MessageType::SyncRequest),
            4 => Ok(MessageType::SyncResponse),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageType::DigestRequest => "DigestRequest",
            MessageType::DigestResponse => "DigestResponse",
            MessageType::SyncRequest => "SyncRequest",
            MessageType::SyncResponse => "SyncResponse",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub message_type: MessageType,
    pub payload_length: u32,
}

impl Header {
    pub fn new(message_type: MessageType, payload_length: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            payload_length,
        }
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..4].copy_from_slice(&self.message_type.id().to_be_bytes());
        out[4..8].copy_from_slice(&0u32.to_be_bytes());
        out[8..12].copy_from_slice(&self.payload_length.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ProtocolError::Truncated);
        }
        let version = u16::from_be_bytes([bytes[0], bytes[1]]);
        if version == 0 {
            return Err(ProtocolError::InvalidVersion);
        }
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let message_type = MessageType::from_id(u16::from_be_bytes([bytes[2], bytes[3]]))?;
        let flags = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if flags != 0 {
            return Err(ProtocolError::InvalidFlags(flags));
        }
        let payload_length = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        trace!(version, %message_type, payload_length, "decoded frame header");
        Ok(Self {
            version,
            message_type,
            payload_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let header = Header::new(MessageType::SyncRequest, 42);
        let bytes = header.encode();
        assert_eq!(Header::decode(&bytes).unwrap(), header);
    }

    #[test]
    fn rejects_zero_version() {
        let mut bytes = Header::new(MessageType::DigestRequest, 0).encode();
        bytes[0] = 0;
        bytes[1] = 0;
        assert!(matches!(Header::decode(&bytes), Err(ProtocolError::InvalidVersion)));
    }

    #[test]
    fn rejects_nonzero_flags() {
        let mut bytes = Header::new(MessageType::DigestRequest, 0).encode();
        bytes[7] = 1;
        assert!(matches!(Header::decode(&bytes), Err(ProtocolError::InvalidFlags(1))));
    }

    #[test]
    fn rejects_unknown_message_type() {
        let mut bytes = Header::new(MessageType::DigestRequest, 0).encode();
        bytes[2..4].copy_from_slice(&99u16.to_be_bytes());
        assert!(matches!(Header::decode(&bytes), Err(ProtocolError::InvalidMessageType(99))));
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(matches!(Header::decode(&[0u8; 4]), Err(ProtocolError::Truncated)));
    }
}
