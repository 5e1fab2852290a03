//! File backend: a snapshot file in a local or shared directory.

use crate::config::FileConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{parse_snapshot, FetchedSnapshot, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::PathBuf;

/// Transport that reads and writes a snapshot file at a configured path.
///
/// Attachment blobs live in an `attachments/` directory next to the
/// snapshot. Writes go through a temp file and rename so a crash mid-write
/// never leaves a truncated snapshot behind.
#[derive(Debug, Clone)]
pub struct FileTransport {
    config: FileConfig,
}

impl FileTransport {
    /// Creates a file transport for the configured sync location.
    pub fn new(config: FileConfig) -> Self {
        Self { config }
    }

    fn attachments_dir(&self) -> PathBuf {
        self.config.sync_dir().join("attachments")
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
            .collect();
        self.attachments_dir().join(safe)
    }
}

fn classify_io(err: io::Error, context: &str) -> SyncError {
    match err.kind() {
        io::ErrorKind::PermissionDenied => {
            SyncError::unauthorized(format!("{context}: {err}"))
        }
        io::ErrorKind::TimedOut | io::ErrorKind::NotConnected => {
            // A sync directory on an unreachable network mount behaves
            // like any other offline remote.
            SyncError::offline(format!("{context}: {err}"))
        }
        _ => SyncError::unknown(format!("{context}: {err}")),
    }
}

async fn write_atomically(path: &PathBuf, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, content).await?;
    // Windows cannot rename over an existing file.
    if cfg!(windows) && tokio::fs::try_exists(path).await? {
        tokio::fs::remove_file(path).await?;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[async_trait]
impl Transport for FileTransport {
    async fn fetch(&self) -> SyncResult<Option<FetchedSnapshot>> {
        match tokio::fs::read(self.config.snapshot_path()).await {
            Ok(bytes) => Ok(Some(parse_snapshot(&bytes)?)),
            // Missing file is the first sync, not an error.
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(classify_io(e, "read snapshot")),
        }
    }

    async fn push(&self, payload: &[u8]) -> SyncResult<()> {
        write_atomically(&self.config.snapshot_path(), payload)
            .await
            .map_err(|e| classify_io(e, "write snapshot"))
    }

    async fn fetch_blob(&self, key: &str) -> SyncResult<Bytes> {
        match tokio::fs::read(self.blob_path(key)).await {
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SyncError::NotFound),
            Err(e) => Err(classify_io(e, "read blob")),
        }
    }

    async fn push_blob(&self, key: &str, content: Bytes) -> SyncResult<()> {
        write_atomically(&self.blob_path(key), &content)
            .await
            .map_err(|e| classify_io(e, "write blob"))
    }

    async fn blob_exists(&self, key: &str) -> SyncResult<bool> {
        tokio::fs::try_exists(self.blob_path(key))
            .await
            .map_err(|e| classify_io(e, "stat blob"))
    }

    async fn delete_blob(&self, key: &str) -> SyncResult<()> {
        match tokio::fs::remove_file(self.blob_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(classify_io(e, "delete blob")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use mindwtr_core::{Snapshot, Task};

    fn sample_snapshot() -> Snapshot {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert_task(Task::new("from file", t0));
        snapshot
    }

    #[tokio::test]
    async fn missing_snapshot_is_first_sync() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileConfig::new(dir.path()));
        assert!(transport.fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn push_then_fetch_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileConfig::new(dir.path()));

        let snapshot = sample_snapshot();
        transport.push(&snapshot.to_canonical_json()).await.unwrap();

        let fetched = transport.fetch().await.unwrap().unwrap();
        assert_eq!(fetched.snapshot, snapshot);
        // No stray temp file left behind
        assert!(!dir.path().join("mindwtr-sync.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_snapshot_file_reported() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("mindwtr-sync.json"), b"half a json")
            .await
            .unwrap();

        let transport = FileTransport::new(FileConfig::new(dir.path()));
        assert!(matches!(
            transport.fetch().await.unwrap_err(),
            SyncError::DataCorrupt { .. }
        ));
    }

    #[tokio::test]
    async fn legacy_path_config_reads_current_file() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileConfig::new(dir.path().join("gtd-data.json")));

        let snapshot = sample_snapshot();
        transport.push(&snapshot.to_canonical_json()).await.unwrap();
        assert!(dir.path().join("mindwtr-sync.json").exists());
        assert_eq!(
            transport.fetch().await.unwrap().unwrap().snapshot,
            snapshot
        );
    }

    #[tokio::test]
    async fn blob_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let transport = FileTransport::new(FileConfig::new(dir.path()));

        assert!(!transport.blob_exists("att-1").await.unwrap());
        assert!(matches!(
            transport.fetch_blob("att-1").await.unwrap_err(),
            SyncError::NotFound
        ));

        transport
            .push_blob("att-1", Bytes::from_static(b"content"))
            .await
            .unwrap();
        assert!(transport.blob_exists("att-1").await.unwrap());
        assert_eq!(
            transport.fetch_blob("att-1").await.unwrap(),
            Bytes::from_static(b"content")
        );

        transport.delete_blob("att-1").await.unwrap();
        assert!(!transport.blob_exists("att-1").await.unwrap());
        // Idempotent delete
        transport.delete_blob("att-1").await.unwrap();
    }
}
