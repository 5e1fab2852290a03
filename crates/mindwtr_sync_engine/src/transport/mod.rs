//! Transport layer abstraction for sync remotes.
//!
//! A transport moves the opaque serialized snapshot and attachment blobs
//! to and from one remote location. Backends add their own auth and error
//! classification behind one uniform contract; the orchestrator selects a
//! backend once per cycle via exhaustive match on [`crate::SyncBackend`].

mod cloud;
mod file;
mod webdav;

pub use cloud::CloudTransport;
pub use file::FileTransport;
pub use webdav::WebdavTransport;

use crate::checksum;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use bytes::Bytes;
use mindwtr_core::Snapshot;

/// A remote snapshot together with the digest of its raw payload.
///
/// The digest is computed over the bytes as fetched, so an unchanged
/// remote is recognized without re-serializing.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedSnapshot {
    /// The parsed snapshot.
    pub snapshot: Snapshot,
    /// SHA-256 hex digest of the raw payload.
    pub digest: String,
}

/// A sync transport handles communication with one remote location.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetches the remote snapshot.
    ///
    /// Returns `None` if the remote has no snapshot yet (first sync, not
    /// an error).
    async fn fetch(&self) -> SyncResult<Option<FetchedSnapshot>>;

    /// Pushes the serialized snapshot, replacing the remote copy.
    async fn push(&self, payload: &[u8]) -> SyncResult<()>;

    /// Fetches attachment content by blob key.
    async fn fetch_blob(&self, key: &str) -> SyncResult<Bytes>;

    /// Pushes attachment content by blob key.
    async fn push_blob(&self, key: &str, content: Bytes) -> SyncResult<()>;

    /// Returns true if the remote has content for the blob key.
    async fn blob_exists(&self, key: &str) -> SyncResult<bool>;

    /// Deletes remote attachment content. Deleting an absent blob is not
    /// an error.
    async fn delete_blob(&self, key: &str) -> SyncResult<()>;
}

/// Parses a fetched payload, classifying parse failures as corrupt data.
pub(crate) fn parse_snapshot(bytes: &[u8]) -> SyncResult<FetchedSnapshot> {
    let snapshot = Snapshot::from_json(bytes).map_err(|e| SyncError::corrupt(e.to_string()))?;
    Ok(FetchedSnapshot {
        snapshot,
        digest: checksum::digest(bytes),
    })
}

/// Failure mode injected into [`MockTransport`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Connectivity failure.
    Offline,
    /// Credentials rejected.
    Unauthorized,
    /// Remote payload unparsable.
    Corrupt,
    /// Generic failure.
    Unknown,
}

impl MockFailure {
    fn to_error(self) -> SyncError {
        match self {
            MockFailure::Offline => SyncError::offline("mock: connection refused"),
            MockFailure::Unauthorized => SyncError::unauthorized("mock: HTTP 401"),
            MockFailure::Corrupt => SyncError::corrupt("mock: invalid payload"),
            MockFailure::Unknown => SyncError::unknown("mock: internal error"),
        }
    }
}

/// A mock transport for tests: an in-memory remote with scripted failures
/// and call counters.
#[derive(Debug, Default)]
pub struct MockTransport {
    remote: parking_lot::Mutex<Option<Vec<u8>>>,
    blobs: parking_lot::Mutex<std::collections::HashMap<String, Bytes>>,
    fail_fetch: parking_lot::Mutex<Option<MockFailure>>,
    fail_push: parking_lot::Mutex<Option<MockFailure>>,
    fail_blob: parking_lot::Mutex<Option<MockFailure>>,
    fetch_delay: parking_lot::Mutex<Option<std::time::Duration>>,
    fetch_calls: std::sync::atomic::AtomicU64,
    push_calls: std::sync::atomic::AtomicU64,
}

impl MockTransport {
    /// Creates a mock transport with no remote snapshot (first sync).
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the remote snapshot.
    pub fn set_remote(&self, snapshot: &Snapshot) {
        *self.remote.lock() = Some(snapshot.to_canonical_json());
    }

    /// Seeds raw remote bytes (for corrupt-payload tests).
    pub fn set_remote_bytes(&self, bytes: Vec<u8>) {
        *self.remote.lock() = Some(bytes);
    }

    /// Returns the current remote snapshot, if pushed or seeded.
    pub fn remote_snapshot(&self) -> Option<Snapshot> {
        self.remote
            .lock()
            .as_ref()
            .and_then(|bytes| Snapshot::from_json(bytes).ok())
    }

    /// Seeds remote blob content.
    pub fn insert_blob(&self, key: impl Into<String>, content: impl Into<Bytes>) {
        self.blobs.lock().insert(key.into(), content.into());
    }

    /// Returns the keys of every remote blob.
    pub fn blob_keys(&self) -> Vec<String> {
        self.blobs.lock().keys().cloned().collect()
    }

    /// Delays every fetch, for exercising in-flight concurrency.
    pub fn set_fetch_delay(&self, delay: std::time::Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    /// Makes the next and all following fetches fail.
    pub fn fail_fetch_with(&self, failure: MockFailure) {
        *self.fail_fetch.lock() = Some(failure);
    }

    /// Makes the next and all following pushes fail.
    pub fn fail_push_with(&self, failure: MockFailure) {
        *self.fail_push.lock() = Some(failure);
    }

    /// Makes all blob operations fail.
    pub fn fail_blobs_with(&self, failure: MockFailure) {
        *self.fail_blob.lock() = Some(failure);
    }

    /// Clears every scripted failure.
    pub fn clear_failures(&self) {
        *self.fail_fetch.lock() = None;
        *self.fail_push.lock() = None;
        *self.fail_blob.lock() = None;
    }

    /// Number of fetch calls made.
    pub fn fetch_calls(&self) -> u64 {
        self.fetch_calls.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Number of push calls made.
    pub fn push_calls(&self) -> u64 {
        self.push_calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn fetch(&self) -> SyncResult<Option<FetchedSnapshot>> {
        self.fetch_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(failure) = *self.fail_fetch.lock() {
            return Err(failure.to_error());
        }
        match self.remote.lock().as_deref() {
            Some(bytes) => Ok(Some(parse_snapshot(bytes)?)),
            None => Ok(None),
        }
    }

    async fn push(&self, payload: &[u8]) -> SyncResult<()> {
        self.push_calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(failure) = *self.fail_push.lock() {
            return Err(failure.to_error());
        }
        *self.remote.lock() = Some(payload.to_vec());
        Ok(())
    }

    async fn fetch_blob(&self, key: &str) -> SyncResult<Bytes> {
        if let Some(failure) = *self.fail_blob.lock() {
            return Err(failure.to_error());
        }
        self.blobs
            .lock()
            .get(key)
            .cloned()
            .ok_or(SyncError::NotFound)
    }

    async fn push_blob(&self, key: &str, content: Bytes) -> SyncResult<()> {
        if let Some(failure) = *self.fail_blob.lock() {
            return Err(failure.to_error());
        }
        self.blobs.lock().insert(key.to_string(), content);
        Ok(())
    }

    async fn blob_exists(&self, key: &str) -> SyncResult<bool> {
        if let Some(failure) = *self.fail_blob.lock() {
            return Err(failure.to_error());
        }
        Ok(self.blobs.lock().contains_key(key))
    }

    async fn delete_blob(&self, key: &str) -> SyncResult<()> {
        if let Some(failure) = *self.fail_blob.lock() {
            return Err(failure.to_error());
        }
        self.blobs.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_snapshot_classifies_garbage_as_corrupt() {
        let err = parse_snapshot(b"{{{").unwrap_err();
        assert!(matches!(err, SyncError::DataCorrupt { .. }));
    }

    #[tokio::test]
    async fn mock_roundtrip() {
        let transport = MockTransport::new();
        assert!(transport.fetch().await.unwrap().is_none());

        let snapshot = Snapshot::new();
        transport.push(&snapshot.to_canonical_json()).await.unwrap();
        let fetched = transport.fetch().await.unwrap().unwrap();
        assert_eq!(fetched.snapshot, snapshot);
        assert_eq!(transport.fetch_calls(), 2);
        assert_eq!(transport.push_calls(), 1);
    }

    #[tokio::test]
    async fn mock_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_fetch_with(MockFailure::Offline);
        assert!(transport.fetch().await.unwrap_err().is_offline());

        transport.clear_failures();
        assert!(transport.fetch().await.unwrap().is_none());
    }
}
