//! Local storage collaborator traits.
//!
//! The sync engine treats local storage purely as the snapshot source of
//! truth; the concrete application store (SQLite fronted by a denormalized
//! backup file) lives outside this workspace. [`MemoryStore`] and
//! [`MemoryBlobStore`] back the test suites; [`FsBlobStore`] stores
//! attachment content one file per attachment id.

use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use crate::stats::{StatsMap, SyncOutcome};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Sync bookkeeping persisted alongside the snapshot.
///
/// Holds the three-way-merge ancestor and the last-cycle status surface so
/// the UI can show "last sync" information after a restart without running
/// a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSyncState {
    /// The snapshot last confirmed identical between local and remote.
    pub baseline: Snapshot,
    /// Digest of the remote payload at the last successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_digest: Option<String>,
    /// Digest of the local snapshot at the last successful cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_digest: Option<String>,
    /// Outcome of the last completed cycle, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<SyncOutcome>,
    /// Per-collection statistics from the last merge.
    #[serde(default)]
    pub last_stats: StatsMap,
    /// Redacted message of the last reportable error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the last cycle finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result_at: Option<DateTime<Utc>>,
}

/// Local snapshot source of truth.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Reads the current local snapshot.
    async fn get_data(&self) -> StoreResult<Snapshot>;

    /// Replaces the local snapshot.
    async fn save_data(&self, snapshot: &Snapshot) -> StoreResult<()>;

    /// Loads the persisted sync bookkeeping, if any exists yet.
    async fn load_sync_state(&self) -> StoreResult<Option<PersistedSyncState>>;

    /// Persists the sync bookkeeping.
    async fn save_sync_state(&self, state: &PersistedSyncState) -> StoreResult<()>;
}

/// Local storage for attachment content, keyed by attachment id.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Returns true if content for the attachment exists locally.
    async fn contains(&self, id: &str) -> StoreResult<bool>;

    /// Reads the attachment content.
    async fn read(&self, id: &str) -> StoreResult<Bytes>;

    /// Writes the attachment content, replacing any previous content.
    async fn write(&self, id: &str, content: Bytes) -> StoreResult<()>;

    /// Removes the attachment content. Removing absent content is not an
    /// error.
    async fn remove(&self, id: &str) -> StoreResult<()>;
}

/// In-memory [`DataStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Snapshot>,
    sync_state: RwLock<Option<PersistedSyncState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with a snapshot.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            sync_state: RwLock::new(None),
        }
    }

    /// Mutates the stored snapshot in place, simulating a local edit.
    pub fn mutate<F: FnOnce(&mut Snapshot)>(&self, f: F) {
        f(&mut self.data.write());
    }

    /// Returns a clone of the stored snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.data.read().clone()
    }
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn get_data(&self) -> StoreResult<Snapshot> {
        Ok(self.data.read().clone())
    }

    async fn save_data(&self, snapshot: &Snapshot) -> StoreResult<()> {
        *self.data.write() = snapshot.clone();
        Ok(())
    }

    async fn load_sync_state(&self) -> StoreResult<Option<PersistedSyncState>> {
        Ok(self.sync_state.read().clone())
    }

    async fn save_sync_state(&self, state: &PersistedSyncState) -> StoreResult<()> {
        *self.sync_state.write() = Some(state.clone());
        Ok(())
    }
}

/// In-memory [`BlobStore`] for tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryBlobStore {
    /// Creates an empty blob store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts content directly, bypassing the async trait.
    pub fn insert(&self, id: impl Into<String>, content: impl Into<Bytes>) {
        self.blobs.write().insert(id.into(), content.into());
    }

    /// Returns the ids of every stored blob.
    pub fn ids(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.blobs.read().contains_key(id))
    }

    async fn read(&self, id: &str) -> StoreResult<Bytes> {
        self.blobs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::BlobNotFound { id: id.to_string() })
    }

    async fn write(&self, id: &str, content: Bytes) -> StoreResult<()> {
        self.blobs.write().insert(id.to_string(), content);
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        self.blobs.write().remove(id);
        Ok(())
    }
}

/// Filesystem [`BlobStore`]: one file per attachment id under a directory.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    /// Creates a blob store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the path for an attachment id.
    ///
    /// Path separators and dots in the id are replaced so every blob
    /// lands directly inside the store directory.
    fn blob_path(&self, id: &str) -> PathBuf {
        let safe: String = id
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        self.dir.join(safe)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(tokio::fs::try_exists(self.blob_path(id)).await?)
    }

    async fn read(&self, id: &str) -> StoreResult<Bytes> {
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::BlobNotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, id: &str, content: Bytes) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.blob_path(id);
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, &content).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> StoreResult<()> {
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
