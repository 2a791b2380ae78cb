//! Core identifiers shared across the crate.

use crate::error::ResolveError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a canonical player id (undashed UUID).
pub const PLAYER_ID_LEN: usize = 32;

/// Maximum accepted length of a raw player reference (dashed UUID).
pub const MAX_PLAYER_REF_LEN: usize = 36;

/// A provider / cape type name, e.g. `optifine`.
///
/// Membership in the configured set is checked by the provider registry;
/// this type only guarantees the name is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapeType(String);

impl CapeType {
    pub fn new(name: impl Into<String>) -> Result<Self, ResolveError> {
        let name = name.into();
        if Self::is_valid_name(&name) {
            Ok(Self(name))
        } else {
            Err(ResolveError::Config(format!("invalid cape type name '{}'", name)))
        }
    }

    /// Type names are used inside storage keys and URLs.
    pub fn is_valid_name(name: &str) -> bool {
        !name.is_empty()
            && name.len() <= 32
            && name
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical player id: 32 lower-case hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(String);

impl PlayerId {
    /// Accepts dashed or undashed, any case.
    pub fn parse(raw: &str) -> Option<Self> {
        let id: String = raw.chars().filter(|c| *c != '-').collect::<String>().to_ascii_lowercase();
        if id.len() == PLAYER_ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit()) {
            Some(Self(id))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// 8-4-4-4-12 form used by some providers.
    pub fn dashed(&self) -> String {
        let s = &self.0;
        format!(
            "{}-{}-{}-{}-{}",
            &s[0..8],
            &s[8..12],
            &s[12..16],
            &s[16..20],
            &s[20..32]
        )
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A loosely-typed player reference as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlayerRef {
    /// Lower-cased display name.
    Name(String),
    Id(PlayerId),
}

impl PlayerRef {
    /// Parse a raw reference: strip hyphens, lower-case, then disambiguate by shape.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.len() > MAX_PLAYER_REF_LEN {
            return Err(ResolveError::InvalidPlayer(raw.to_string()));
        }

        let stripped: String = raw.chars().filter(|c| *c != '-').collect();
        if let Some(id) = PlayerId::parse(&stripped) {
            return Ok(PlayerRef::Id(id));
        }

        let name = stripped.to_ascii_lowercase();
        let valid_name = (2..=16).contains(&name.len())
            && name
                .bytes()
                .all(|b| matches!(b, b'a'..=b'z' | b'0'..=b'9' | b'_'));
        if valid_name {
            Ok(PlayerRef::Name(name))
        } else {
            Err(ResolveError::InvalidPlayer(raw.to_string()))
        }
    }

    /// Key used for name/id indexes and request coalescing.
    pub fn lookup_key(&self) -> &str {
        match self {
            PlayerRef::Name(name) => name,
            PlayerRef::Id(id) => id.as_str(),
        }
    }
}

impl fmt::Display for PlayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.lookup_key())
    }
}

/// Canonical (display name, id) pair returned by the identity resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    /// Case-preserving display name.
    pub name: String,
    pub id: PlayerId,
}

impl PlayerIdentity {
    pub fn lower_name(&self) -> String {
        self.name.to_ascii_lowercase()
    }
}

/// Pixel dimensions of an image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const ZERO: Dimensions = Dimensions {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}
