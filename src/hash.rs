//! Content addressing for cape images and records
//!
//! Raw image bytes are addressed by their blake3 digest (64 lower-case hex
//! characters). A confirmed "no cape" observation uses a reserved sentinel
//! that can never be produced by the digest: wrong length and non-hex
//! alphabet.

use crate::types::{CapeType, PlayerId};
use blake3::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved content hash meaning "confirmed absence of a cape".
pub const NO_CAPE: &str = "hasN0Cape";

/// Hex length of a blake3 digest.
pub const DIGEST_HEX_LEN: usize = 64;

/// Digest of the raw cape bytes, or the [`NO_CAPE`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hash the exact byte sequence.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(bytes).as_bytes()))
    }

    pub fn absent() -> Self {
        Self(NO_CAPE.to_string())
    }

    /// `None` bytes map to the sentinel.
    pub fn of_optional(bytes: Option<&[u8]>) -> Self {
        bytes.map(Self::of).unwrap_or_else(Self::absent)
    }

    /// Parse a stored or user-supplied value (digest or sentinel).
    pub fn parse(raw: &str) -> Option<Self> {
        if raw == NO_CAPE || is_digest_hex(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn is_absent(&self) -> bool {
        self.0 == NO_CAPE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a single cape observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn parse(raw: &str) -> Option<Self> {
        is_digest_hex(raw).then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the RecordId for an observation
///
/// RecordId = hash(content_hash || player_id || cape_type || observed_at)
///
/// Each component is domain-separated so that shifting bytes between fields
/// cannot produce the same digest. Identical content observed at different
/// times (or for different players/types) yields distinct ids.
pub fn compute_record_id(
    content_hash: &ContentHash,
    player_id: &PlayerId,
    cape_type: &CapeType,
    observed_at: i64,
) -> RecordId {
    let mut hasher = Hasher::new();

    hasher.update(b"content:");
    hasher.update(content_hash.as_str().as_bytes());

    hasher.update(b"\0player:");
    hasher.update(player_id.as_str().as_bytes());

    hasher.update(b"\0type:");
    hasher.update(cape_type.as_str().as_bytes());

    hasher.update(b"\0time:");
    hasher.update(&observed_at.to_be_bytes());

    RecordId(hex::encode(hasher.finalize().as_bytes()))
}

fn is_digest_hex(raw: &str) -> bool {
    raw.len() == DIGEST_HEX_LEN && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
