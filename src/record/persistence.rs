//! Persistence layer for the Cape Record Store
//!
//! Key layout inside a single sled tree:
//!
//! - `record\0{record_id}` → bincode(`StoredRecord`)
//! - `player\0{player_id}\0{type}\0{time}{seq}` → record_id
//! - `name\0{lower_name}\0{type}\0{time}{seq}` → record_id
//! - `content\0{content_hash}\0{record_id}` → empty
//!
//! `time` and `seq` are fixed-width big-endian so a prefix scan yields
//! records in (observed_at, write order) order, and `next_back()` is the
//! latest.

use crate::error::StorageError;
use crate::hash::{ContentHash, RecordId};
use crate::record::{aggregate_stats, CapeRecord, RecordStats, RecordStore};
use crate::types::{CapeType, PlayerRef};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sled::transaction::{abort, ConflictableTransactionError, ConflictableTransactionResult};
use std::path::Path;

const RECORD_PREFIX: &[u8] = b"record\0";
const PLAYER_INDEX: &[u8] = b"player\0";
const NAME_INDEX: &[u8] = b"name\0";
const CONTENT_INDEX: &[u8] = b"content\0";

/// Trailing bytes of an index key: 8 bytes time + 8 bytes seq.
const ORDER_SUFFIX_LEN: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    seq: u64,
    record: CapeRecord,
}

/// Sled-based implementation of RecordStore
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open (or create) a store at the given directory.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path).map_err(|e| {
            StorageError::Database(format!("Failed to open sled database: {}", e))
        })?;
        Ok(Self { db })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn load(&self, record_id: &str) -> Result<Option<StoredRecord>, StorageError> {
        match self.db.get(record_key(record_id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Record ids under an index prefix, with their ordering suffix.
    fn scan_index(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, String)>, StorageError> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(prefix) {
            let (key, value) = item?;
            out.push((order_suffix(&key).to_vec(), ivec_to_string(&value)?));
        }
        Ok(out)
    }

    fn latest_in_index(&self, prefix: &[u8]) -> Result<Option<CapeRecord>, StorageError> {
        match self.db.scan_prefix(prefix).next_back() {
            Some(item) => {
                let (_, value) = item?;
                let record_id = ivec_to_string(&value)?;
                Ok(self.load(&record_id)?.map(|stored| stored.record))
            }
            None => Ok(None),
        }
    }

    fn index_keys(stored: &StoredRecord) -> (Vec<u8>, Vec<u8>) {
        let record = &stored.record;
        let order = order_bytes(record.observed_at, stored.seq);
        let mut player_key = player_prefix(&PlayerRef::Id(record.player_id.clone()), Some(&record.cape_type));
        player_key.extend_from_slice(&order);
        let mut name_key = player_prefix(&PlayerRef::Name(record.lower_name()), Some(&record.cape_type));
        name_key.extend_from_slice(&order);
        (player_key, name_key)
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn find_latest(
        &self,
        cape_type: &CapeType,
        player: &PlayerRef,
    ) -> Result<Option<CapeRecord>, StorageError> {
        self.latest_in_index(&player_prefix(player, Some(cape_type)))
    }

    async fn insert(&self, record: &CapeRecord) -> Result<(), StorageError> {
        let key = record_key(record.record_id.as_str());
        let id_bytes = record.record_id.as_str().as_bytes();

        self.db.transaction(|tx| -> ConflictableTransactionResult<(), StorageError> {
            if let Some(bytes) = tx.get(&key)? {
                let existing: StoredRecord = bincode::deserialize(&bytes).map_err(aborted)?;
                // Same id means same observation; only a conflicting body is an error.
                if &existing.record == record {
                    return Ok(());
                }
                return abort(StorageError::Database(format!(
                    "duplicate record id {}",
                    record.record_id
                )));
            }

            let stored = StoredRecord {
                seq: tx.generate_id()?,
                record: record.clone(),
            };
            let (player_key, name_key) = Self::index_keys(&stored);
            tx.insert(key.as_slice(), bincode::serialize(&stored).map_err(aborted)?)?;
            tx.insert(player_key, id_bytes)?;
            tx.insert(name_key, id_bytes)?;
            tx.insert(content_key(&record.content_hash, &record.record_id), &[] as &[u8])?;
            Ok(())
        })?;
        Ok(())
    }

    async fn update_observed_at(
        &self,
        record_id: &RecordId,
        observed_at: i64,
    ) -> Result<(), StorageError> {
        let key = record_key(record_id.as_str());
        let id_bytes = record_id.as_str().as_bytes();

        // Read, index move and rewrite commit together so concurrent
        // reconfirmations cannot strand a stale index entry.
        self.db.transaction(|tx| -> ConflictableTransactionResult<(), StorageError> {
            let Some(bytes) = tx.get(&key)? else {
                return abort(StorageError::RecordNotFound(record_id.to_string()));
            };
            let mut stored: StoredRecord = bincode::deserialize(&bytes).map_err(aborted)?;
            let (old_player_key, old_name_key) = Self::index_keys(&stored);

            stored.seq = tx.generate_id()?;
            stored.record.observed_at = observed_at;
            let (player_key, name_key) = Self::index_keys(&stored);

            tx.remove(old_player_key)?;
            tx.remove(old_name_key)?;
            tx.insert(player_key, id_bytes)?;
            tx.insert(name_key, id_bytes)?;
            tx.insert(key.as_slice(), bincode::serialize(&stored).map_err(aborted)?)?;
            Ok(())
        })?;
        Ok(())
    }

    async fn get(&self, record_id: &RecordId) -> Result<Option<CapeRecord>, StorageError> {
        Ok(self.load(record_id.as_str())?.map(|stored| stored.record))
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<CapeRecord>, StorageError> {
        let mut prefix = CONTENT_INDEX.to_vec();
        prefix.extend_from_slice(content_hash.as_str().as_bytes());
        prefix.push(0);

        match self.db.scan_prefix(&prefix).next() {
            Some(item) => {
                let (key, _) = item?;
                let record_id = String::from_utf8_lossy(&key[prefix.len()..]).to_string();
                Ok(self.load(&record_id)?.map(|stored| stored.record))
            }
            None => Ok(None),
        }
    }

    async fn history(
        &self,
        cape_type: Option<&CapeType>,
        player: &PlayerRef,
    ) -> Result<Vec<CapeRecord>, StorageError> {
        let mut entries = self.scan_index(&player_prefix(player, cape_type))?;
        // Across types the scan is grouped by type, not by time.
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        let mut records = Vec::with_capacity(entries.len());
        for (_, record_id) in entries {
            if let Some(stored) = self.load(&record_id)? {
                records.push(stored.record);
            }
        }
        Ok(records)
    }

    async fn stats(&self) -> Result<RecordStats, StorageError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix(RECORD_PREFIX) {
            let (_, value) = item?;
            let stored: StoredRecord = bincode::deserialize(&value)?;
            records.push(stored.record);
        }
        Ok(aggregate_stats(records.iter()))
    }
}

fn record_key(record_id: &str) -> Vec<u8> {
    [RECORD_PREFIX, record_id.as_bytes()].concat()
}

fn content_key(content_hash: &ContentHash, record_id: &RecordId) -> Vec<u8> {
    let mut key = CONTENT_INDEX.to_vec();
    key.extend_from_slice(content_hash.as_str().as_bytes());
    key.push(0);
    key.extend_from_slice(record_id.as_str().as_bytes());
    key
}

/// Index prefix for a player lookup, optionally narrowed to one type.
fn player_prefix(player: &PlayerRef, cape_type: Option<&CapeType>) -> Vec<u8> {
    let mut key = match player {
        PlayerRef::Id(_) => PLAYER_INDEX.to_vec(),
        PlayerRef::Name(_) => NAME_INDEX.to_vec(),
    };
    key.extend_from_slice(player.lookup_key().as_bytes());
    key.push(0);
    if let Some(cape_type) = cape_type {
        key.extend_from_slice(cape_type.as_str().as_bytes());
        key.push(0);
    }
    key
}

/// Big-endian time (sign bit flipped so negatives sort first) then seq.
fn order_bytes(observed_at: i64, seq: u64) -> [u8; ORDER_SUFFIX_LEN] {
    let mut out = [0u8; ORDER_SUFFIX_LEN];
    out[..8].copy_from_slice(&((observed_at as u64) ^ (1 << 63)).to_be_bytes());
    out[8..].copy_from_slice(&seq.to_be_bytes());
    out
}

fn order_suffix(key: &[u8]) -> &[u8] {
    &key[key.len().saturating_sub(ORDER_SUFFIX_LEN)..]
}

fn aborted<E: Into<StorageError>>(err: E) -> ConflictableTransactionError<StorageError> {
    ConflictableTransactionError::Abort(err.into())
}

fn ivec_to_string(value: &sled::IVec) -> Result<String, StorageError> {
    String::from_utf8(value.to_vec())
        .map_err(|e| StorageError::Serialization(format!("Invalid record id in index: {}", e)))
}
