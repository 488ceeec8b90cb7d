//! Fixed-width identifiers used throughout the replica core.
//!
//! Both replica and CRDT identifiers are opaque 16-byte values. Equality
//! is byte-wise; ordering is lexicographic over the raw bytes so they can
//! be used as `BTreeMap` keys with deterministic iteration order.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! fixed_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name([u8; 16]);

        impl $name {
            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                $name(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            /// Generate a fresh identifier via ULID, truncated to its 128-bit payload.
            pub fn generate() -> Self {
                $name(ulid::Ulid::new().to_bytes())
            }

            pub fn to_hex(&self) -> String {
                self.0.iter().map(|b| format!("{:02x}", b)).collect()
            }

            pub fn from_hex(s: &str) -> Option<Self> {
                if s.len() != 32 {
                    return None;
                }
                let mut bytes = [0u8; 16];
                for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
                    let hex_str = std::str::from_utf8(chunk).ok()?;
                    bytes[i] = u8::from_str_radix(hex_str, 16).ok()?;
                }
                Some($name(bytes))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(bytes: [u8; 16]) -> Self {
                $name(bytes)
            }
        }
    };
}

fixed_id!(ReplicaId);
fixed_id!(CrdtId);
