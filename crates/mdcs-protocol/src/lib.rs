//! Length-prefixed binary wire protocol for replica anti-entropy.
//!
//! Every frame is a fixed 12-byte [`Header`] followed by a payload whose
//! shape depends on the header's message type: an empty digest request,
//! an encoded [`mdcs_delta::Digest`], a sync request carrying an optional
//! digest, or a sync response carrying an optional digest plus a delta
//! bundle of opaque, CRDT-encoded blobs.

pub mod error;
pub mod header;
pub mod message;

pub use error::{ProtocolError, Result};
pub use header::{Header, MessageType, HEADER_LEN, PROTOCOL_VERSION};
pub use message::{Message, SyncType, WireBundle};
