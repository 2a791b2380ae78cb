//! Cape Record Store
//!
//! One `CapeRecord` per distinct (type, player, content) observation. Records
//! are queryable by (type, player id) and (type, lower-cased name), newest
//! first. Nothing in this crate deletes records.

pub mod memory;
pub mod persistence;

pub use memory::MemoryRecordStore;
pub use persistence::SledRecordStore;

use crate::error::StorageError;
use crate::hash::{ContentHash, RecordId};
use crate::types::{CapeType, Dimensions, PlayerId, PlayerRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A confirmed cape observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapeRecord {
    pub record_id: RecordId,
    pub player_id: PlayerId,
    /// Case-preserving display name.
    pub player_name: String,
    pub cape_type: CapeType,
    /// Epoch seconds of the last confirmation.
    pub observed_at: i64,
    pub content_hash: ContentHash,
    /// Sniffed file extension, "" when there is no cape.
    pub extension: String,
    pub width: u32,
    pub height: u32,
    /// Present only when the provider animates and extraction found frames.
    pub animation_frames: Option<u32>,
}

impl CapeRecord {
    pub fn exists(&self) -> bool {
        !self.content_hash.is_absent()
    }

    pub fn animated(&self) -> bool {
        self.animation_frames.is_some()
    }

    pub fn lower_name(&self) -> String {
        self.player_name.to_ascii_lowercase()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Whether this record answers a lookup for `player`.
    pub fn matches_player(&self, player: &PlayerRef) -> bool {
        match player {
            PlayerRef::Id(id) => &self.player_id == id,
            PlayerRef::Name(name) => &self.lower_name() == name,
        }
    }
}

/// Aggregate counts over the whole store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordStats {
    pub total: u64,
    pub players: u64,
    pub types: BTreeMap<String, u64>,
}

/// Record Store interface
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Most recent record for `(cape_type, player)`.
    ///
    /// Ordered by `observed_at`; among equal timestamps the most recently
    /// written record wins.
    async fn find_latest(
        &self,
        cape_type: &CapeType,
        player: &PlayerRef,
    ) -> Result<Option<CapeRecord>, StorageError>;

    async fn insert(&self, record: &CapeRecord) -> Result<(), StorageError>;

    /// Move an existing record's confirmation time. The record id is unchanged.
    async fn update_observed_at(
        &self,
        record_id: &RecordId,
        observed_at: i64,
    ) -> Result<(), StorageError>;

    async fn get(&self, record_id: &RecordId) -> Result<Option<CapeRecord>, StorageError>;

    /// Any record referencing `content_hash`.
    async fn find_by_content_hash(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<CapeRecord>, StorageError>;

    /// All records for a player (one type or all types), newest first.
    async fn history(
        &self,
        cape_type: Option<&CapeType>,
        player: &PlayerRef,
    ) -> Result<Vec<CapeRecord>, StorageError>;

    async fn stats(&self) -> Result<RecordStats, StorageError>;
}

/// Shared stats aggregation over an iterator of records.
pub(crate) fn aggregate_stats<'a>(records: impl Iterator<Item = &'a CapeRecord>) -> RecordStats {
    let mut stats = RecordStats::default();
    let mut players = std::collections::HashSet::new();
    for record in records {
        stats.total += 1;
        players.insert(record.player_id.clone());
        *stats
            .types
            .entry(record.cape_type.as_str().to_string())
            .or_insert(0) += 1;
    }
    stats.players = players.len() as u64;
    stats
}
