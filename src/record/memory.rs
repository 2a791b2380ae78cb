//! In-process record store, used for embedding and tests.

use crate::error::StorageError;
use crate::hash::{ContentHash, RecordId};
use crate::record::{aggregate_stats, CapeRecord, RecordStats, RecordStore};
use crate::types::{CapeType, PlayerRef};
use async_trait::async_trait;
use parking_lot::RwLock;

#[derive(Debug, Clone)]
struct Entry {
    /// Write sequence; breaks `observed_at` ties in favour of the latest write.
    seq: u64,
    record: CapeRecord,
}

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    entries: RwLock<Vec<Entry>>,
    next_seq: RwLock<u64>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of every stored record, in write order.
    pub fn all(&self) -> Vec<CapeRecord> {
        self.entries.read().iter().map(|e| e.record.clone()).collect()
    }

    fn bump_seq(&self) -> u64 {
        let mut seq = self.next_seq.write();
        *seq += 1;
        *seq
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn find_latest(
        &self,
        cape_type: &CapeType,
        player: &PlayerRef,
    ) -> Result<Option<CapeRecord>, StorageError> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| &e.record.cape_type == cape_type && e.record.matches_player(player))
            .max_by_key(|e| (e.record.observed_at, e.seq))
            .map(|e| e.record.clone()))
    }

    async fn insert(&self, record: &CapeRecord) -> Result<(), StorageError> {
        let seq = self.bump_seq();
        let mut entries = self.entries.write();
        if let Some(existing) = entries.iter().find(|e| e.record.record_id == record.record_id) {
            if &existing.record == record {
                return Ok(());
            }
            return Err(StorageError::Database(format!(
                "duplicate record id {}",
                record.record_id
            )));
        }
        entries.push(Entry {
            seq,
            record: record.clone(),
        });
        Ok(())
    }

    async fn update_observed_at(
        &self,
        record_id: &RecordId,
        observed_at: i64,
    ) -> Result<(), StorageError> {
        let seq = self.bump_seq();
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|e| &e.record.record_id == record_id)
            .ok_or_else(|| StorageError::RecordNotFound(record_id.to_string()))?;
        entry.record.observed_at = observed_at;
        entry.seq = seq;
        Ok(())
    }

    async fn get(&self, record_id: &RecordId) -> Result<Option<CapeRecord>, StorageError> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|e| &e.record.record_id == record_id)
            .map(|e| e.record.clone()))
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &ContentHash,
    ) -> Result<Option<CapeRecord>, StorageError> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|e| &e.record.content_hash == content_hash)
            .map(|e| e.record.clone()))
    }

    async fn history(
        &self,
        cape_type: Option<&CapeType>,
        player: &PlayerRef,
    ) -> Result<Vec<CapeRecord>, StorageError> {
        let mut matching: Vec<Entry> = self
            .entries
            .read()
            .iter()
            .filter(|e| cape_type.map_or(true, |t| &e.record.cape_type == t))
            .filter(|e| e.record.matches_player(player))
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            (b.record.observed_at, b.seq).cmp(&(a.record.observed_at, a.seq))
        });
        Ok(matching.into_iter().map(|e| e.record).collect())
    }

    async fn stats(&self) -> Result<RecordStats, StorageError> {
        let entries = self.entries.read();
        Ok(aggregate_stats(entries.iter().map(|e| &e.record)))
    }
}
