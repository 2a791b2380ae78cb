//! Content Store
//!
//! Durable key-value storage for cape images and their derived variants,
//! keyed by content hash: `{content_hash}` for the canonical image and
//! `{content_hash}_{variant}` for transforms and animation artifacts.
//!
//! A successful `put` means the artifact is visible to readers.

use crate::error::StorageError;
use crate::hash::ContentHash;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Variant name for the first frame of an animated cape.
pub const STILL_VARIANT: &str = "still";
/// Variant name for the animated composite (GIF).
pub const ANIMATED_VARIANT: &str = "animated";

/// Key into the content store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentKey(String);

impl ContentKey {
    /// Key of the canonical image.
    pub fn canonical(hash: &ContentHash) -> Result<Self, StorageError> {
        if hash.is_absent() {
            return Err(StorageError::InvalidKey(
                "no content is stored for the no-cape sentinel".to_string(),
            ));
        }
        Ok(Self(hash.as_str().to_string()))
    }

    /// Key of a named variant, `{hash}_{variant}`.
    pub fn variant(hash: &ContentHash, variant: &str) -> Result<Self, StorageError> {
        if !is_valid_variant_name(variant) {
            return Err(StorageError::InvalidKey(format!(
                "invalid variant name '{}'",
                variant
            )));
        }
        let canonical = Self::canonical(hash)?;
        Ok(Self(format!("{}_{}", canonical.0, variant)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Variant names become part of file names and URLs.
pub fn is_valid_variant_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Content Store interface
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store bytes under `key`; returns once the artifact is readable.
    async fn put(&self, key: &ContentKey, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn get(&self, key: &ContentKey) -> Result<Option<Vec<u8>>, StorageError>;

    async fn exists(&self, key: &ContentKey) -> Result<bool, StorageError>;
}

/// Filesystem-backed content store
///
/// Layout: `{root}/{key[0..2]}/{key}`. Writes are atomic (temp file then
/// rename) and keys are immutable: an existing key is left untouched.
#[derive(Debug, Clone)]
pub struct FileContentStore {
    root: PathBuf,
}

impl FileContentStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &ContentKey) -> PathBuf {
        self.root.join(&key.as_str()[0..2]).join(key.as_str())
    }
}

async fn write_synced(file: &mut tokio::fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn put(&self, key: &ContentKey, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = self.path_for(key);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create content directory {:?}: {}", parent, e),
                ))
            })?;
        }

        // Per-writer temp name: concurrent puts of one key must not share a file.
        let tmp = path.with_file_name(format!("{}.tmp-{}", key, Uuid::new_v4().simple()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        if let Err(e) = write_synced(&mut file, &bytes).await {
            drop(file);
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        drop(file);

        // Another writer may have won the race; content is identical either way.
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Ok(());
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                return Ok(());
            }
            return Err(StorageError::IoError(std::io::Error::new(
                e.kind(),
                format!("Failed to move content into place at {:?}: {}", path, e),
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Option<Vec<u8>>, StorageError> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool, StorageError> {
        Ok(tokio::fs::try_exists(self.path_for(key)).await?)
    }
}

/// In-memory content store.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: RwLock<BTreeMap<ContentKey, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects
            .read()
            .keys()
            .map(|k| k.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, key: &ContentKey, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.objects.write().entry(key.clone()).or_insert(bytes);
        Ok(())
    }

    async fn get(&self, key: &ContentKey) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn exists(&self, key: &ContentKey) -> Result<bool, StorageError> {
        Ok(self.objects.read().contains_key(key))
    }
}
