//! Codec error taxonomy for the wire protocol layer.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u16),

    #[error("protocol version must be non-zero")]
    InvalidVersion,

    #[error("unrecognized message type id {0}")]
    InvalidMessageType(u16),

    #[error("non-zero flag bits set: {0:#010x}")]
    InvalidFlags(u32),

    #[error("frame truncated while decoding")]
    Truncated,

    #[error("trailing bytes after a fully decoded message")]
    TrailingBytes,

    #[error("field too large to encode within its length prefix ({0} bytes)")]
    LengthOverflow(usize),

    #[error("invalid binary payload: {0}")]
    InvalidBinary(String),

    #[error("digest codec error: {0}")]
    Digest(#[from] mdcs_delta::DigestCodecError),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
