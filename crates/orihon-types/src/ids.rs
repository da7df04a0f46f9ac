//! Typed identifiers for documents, blocks, and users.
//!
//! All ID types wrap a UUID and are opaque on the wire (16 bytes, standard
//! UUID text in JSON). Server-assigned ids are UUIDv7 (time-ordered);
//! `BlockId` is normally **client-generated** (the editor mints an id for a
//! block it is already rendering and submits it in the create operation), so
//! `parse` accepts any UUID version. The `short()` form (first 8 hex chars)
//! is for log readability only, never a lookup key.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A document identifier (UUIDv7, server-assigned at creation).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(uuid::Uuid);

/// A block identifier. Client-generated for blocks created through a batch,
/// server-generated (UUIDv7) for the initial block of a new document.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(uuid::Uuid);

/// A user identifier (assigned by the excluded auth layer, opaque here).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Create a new time-ordered ID (UUIDv7).
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// First 8 hex characters, for log display only, not lookup.
            pub fn short(&self) -> String {
                self.0.as_simple().to_string()[..8].to_string()
            }

            /// Full 32-character hex string (no hyphens).
            pub fn to_hex(&self) -> String {
                self.0.as_simple().to_string()
            }

            /// The raw 16 bytes. Store keys are built from these.
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            /// Reconstruct from 16 bytes.
            pub fn from_bytes(b: [u8; 16]) -> Self {
                Self(uuid::Uuid::from_bytes(b))
            }

            /// Try to reconstruct from a byte slice (must be exactly 16 bytes).
            pub fn try_from_slice(b: &[u8]) -> Option<Self> {
                if b.len() == 16 {
                    let mut arr = [0u8; 16];
                    arr.copy_from_slice(b);
                    Some(Self::from_bytes(arr))
                } else {
                    None
                }
            }

            /// Parse from a hex string (32 chars, no hyphens) or standard UUID format.
            pub fn parse(s: &str) -> Result<Self, ParseIdError> {
                uuid::Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ParseIdError {
                        kind: $name,
                        input: s.to_string(),
                    })
            }

            /// A nil / zero ID, for sentinel values only.
            pub fn nil() -> Self {
                Self(uuid::Uuid::nil())
            }

            /// Check if this is the nil ID.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<uuid::Uuid> for $T {
            fn from(u: uuid::Uuid) -> Self {
                Self(u)
            }
        }

        impl From<$T> for uuid::Uuid {
            fn from(id: $T) -> uuid::Uuid {
                id.0
            }
        }

        impl From<[u8; 16]> for $T {
            fn from(b: [u8; 16]) -> Self {
                Self::from_bytes(b)
            }
        }

        impl From<$T> for [u8; 16] {
            fn from(id: $T) -> [u8; 16] {
                *id.as_bytes()
            }
        }

        impl std::str::FromStr for $T {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Full UUID with hyphens for log readability
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", $name, self.short())
            }
        }
    };
}

impl_typed_id!(DocumentId, "DocumentId");
impl_typed_id!(BlockId, "BlockId");
impl_typed_id!(UserId, "UserId");

// ── Parse errors ────────────────────────────────────────────────────────────

/// Error parsing an identifier from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{input}' is not a UUID")]
pub struct ParseIdError {
    kind: &'static str,
    input: String,
}

// ============================================================================
// Tests
// ============================================================================
