//! Attachment content synchronization.
//!
//! Runs after the structured merge has been pushed. Blobs are large and
//! fail independently, so every transfer is contained: a failed transfer
//! is marked in [`AttachmentProgress`] and retried on the next full cycle
//! rather than in a tight loop, since attachment transfers share the
//! network path with structured-data sync.

use crate::error::{SyncError, SyncResult};
use crate::status::{StatusBus, SyncEvent};
use crate::transport::Transport;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use mindwtr_core::{Attachment, AttachmentKind, BlobStore, Snapshot};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// State of one attachment transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttachmentStatus {
    /// Waiting for its turn.
    Queued,
    /// Bytes are moving.
    Transferring,
    /// Content exists on both sides.
    Completed,
    /// Transfer failed or was cancelled; retried next cycle.
    Failed,
}

/// Ephemeral per-transfer progress, keyed by attachment id.
///
/// Not persisted; rebuilt on every reconcile pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentProgress {
    /// Transfer state.
    pub status: AttachmentStatus,
    /// Bytes moved so far.
    pub bytes_transferred: u64,
    /// Total bytes, once known.
    pub total_bytes: u64,
}

impl AttachmentProgress {
    fn queued() -> Self {
        Self {
            status: AttachmentStatus::Queued,
            bytes_transferred: 0,
            total_bytes: 0,
        }
    }
}

/// Cancellation flag for one attachment transfer.
///
/// Cancelling a transfer never cancels the structured-data cycle it is
/// nested inside.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Creates an un-cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> SyncResult<()> {
        if self.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Counts from one reconcile pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttachmentReport {
    /// Blobs uploaded to the remote.
    pub uploaded: u64,
    /// Blobs downloaded from the remote.
    pub downloaded: u64,
    /// Transfers that failed or were cancelled.
    pub failed: u64,
    /// Blob pairs deleted by retention cleanup.
    pub cleaned: u64,
}

/// Synchronizes attachment content between the local blob store and the
/// active transport.
pub struct AttachmentSynchronizer {
    blobs: Arc<dyn BlobStore>,
    bus: Arc<StatusBus>,
    progress: Mutex<HashMap<String, AttachmentProgress>>,
    cancels: Mutex<HashMap<String, CancelHandle>>,
}

impl AttachmentSynchronizer {
    /// Creates a synchronizer over the local blob store.
    pub fn new(blobs: Arc<dyn BlobStore>, bus: Arc<StatusBus>) -> Self {
        Self {
            blobs,
            bus,
            progress: Mutex::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the progress of an attachment transfer, if one ran this
    /// cycle.
    pub fn progress(&self, id: &str) -> Option<AttachmentProgress> {
        self.progress.lock().get(id).copied()
    }

    /// Returns the cancel handle for an attachment, creating one if the
    /// transfer has not been seen yet.
    pub fn cancel_handle(&self, id: &str) -> CancelHandle {
        self.cancels
            .lock()
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    /// Clears progress and cancellation state.
    pub fn reset(&self) {
        self.progress.lock().clear();
        self.cancels.lock().clear();
    }

    fn set_progress(&self, id: &str, progress: AttachmentProgress) {
        self.progress.lock().insert(id.to_string(), progress);
        self.bus.publish(&SyncEvent::AttachmentProgress {
            id: id.to_string(),
            progress,
        });
    }

    /// Ensures every live file attachment in the merged snapshot has its
    /// content on both sides, and applies retention cleanup to expired
    /// tombstones.
    ///
    /// Transfer failures are contained: they mark the attachment Failed
    /// and are retried on the next cycle.
    pub async fn reconcile(
        &self,
        snapshot: &Snapshot,
        transport: &dyn Transport,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> AttachmentReport {
        // Progress is ephemeral: rebuilt for each pass.
        self.progress.lock().clear();
        let mut report = AttachmentReport::default();

        for (attachment, owner_deleted_at) in snapshot.attachments() {
            if attachment.kind != AttachmentKind::File {
                continue;
            }

            let tombstoned_at = attachment.deleted_at.or(owner_deleted_at);
            if let Some(deleted_at) = tombstoned_at {
                if tombstone_expired(deleted_at, now, retention) {
                    match self.cleanup(attachment, transport).await {
                        Ok(()) => report.cleaned += 1,
                        Err(e) => {
                            tracing::warn!(
                                id = %attachment.id,
                                error = %crate::redact::redact(&e.to_string()),
                                "attachment cleanup failed"
                            );
                            report.failed += 1;
                        }
                    }
                }
                // Within the retention window the content stays put so the
                // deletion can still be undone.
                continue;
            }

            match self.transfer(attachment, transport).await {
                Ok(Direction::Uploaded) => report.uploaded += 1,
                Ok(Direction::Downloaded) => report.downloaded += 1,
                Ok(Direction::InSync) => {}
                Err(e) => {
                    self.set_progress(
                        &attachment.id,
                        AttachmentProgress {
                            status: AttachmentStatus::Failed,
                            bytes_transferred: 0,
                            total_bytes: 0,
                        },
                    );
                    tracing::warn!(
                        id = %attachment.id,
                        error = %crate::redact::redact(&e.to_string()),
                        "attachment transfer failed, will retry next cycle"
                    );
                    report.failed += 1;
                }
            }
        }

        report
    }

    async fn transfer(
        &self,
        attachment: &Attachment,
        transport: &dyn Transport,
    ) -> SyncResult<Direction> {
        let cancel = self.cancel_handle(&attachment.id);
        self.set_progress(&attachment.id, AttachmentProgress::queued());

        let local_has = self.blobs.contains(&attachment.id).await?;
        let remote_has = transport.blob_exists(&attachment.id).await?;

        match (local_has, remote_has) {
            (true, false) => {
                cancel.check()?;
                let content = self.blobs.read(&attachment.id).await?;
                let total = content.len() as u64;
                self.set_progress(
                    &attachment.id,
                    AttachmentProgress {
                        status: AttachmentStatus::Transferring,
                        bytes_transferred: 0,
                        total_bytes: total,
                    },
                );
                cancel.check()?;
                transport.push_blob(&attachment.id, content).await?;
                self.set_progress(
                    &attachment.id,
                    AttachmentProgress {
                        status: AttachmentStatus::Completed,
                        bytes_transferred: total,
                        total_bytes: total,
                    },
                );
                Ok(Direction::Uploaded)
            }
            (false, true) => {
                cancel.check()?;
                self.set_progress(
                    &attachment.id,
                    AttachmentProgress {
                        status: AttachmentStatus::Transferring,
                        bytes_transferred: 0,
                        total_bytes: 0,
                    },
                );
                let content: Bytes = transport.fetch_blob(&attachment.id).await?;
                let total = content.len() as u64;
                cancel.check()?;
                self.blobs.write(&attachment.id, content).await?;
                self.set_progress(
                    &attachment.id,
                    AttachmentProgress {
                        status: AttachmentStatus::Completed,
                        bytes_transferred: total,
                        total_bytes: total,
                    },
                );
                Ok(Direction::Downloaded)
            }
            (true, true) => {
                self.progress.lock().remove(&attachment.id);
                Ok(Direction::InSync)
            }
            // Dangling reference: the owning client has not uploaded the
            // content yet. Non-fatal, retried next cycle.
            (false, false) => Err(SyncError::NotFound),
        }
    }

    async fn cleanup(
        &self,
        attachment: &Attachment,
        transport: &dyn Transport,
    ) -> SyncResult<()> {
        transport.delete_blob(&attachment.id).await?;
        self.blobs.remove(&attachment.id).await?;
        tracing::debug!(id = %attachment.id, "attachment blobs removed by retention cleanup");
        Ok(())
    }
}

enum Direction {
    Uploaded,
    Downloaded,
    InSync,
}

fn tombstone_expired(deleted_at: DateTime<Utc>, now: DateTime<Utc>, retention: Duration) -> bool {
    let retention = ChronoDuration::from_std(retention).unwrap_or(ChronoDuration::MAX);
    now.signed_duration_since(deleted_at) > retention
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockFailure, MockTransport};
    use chrono::TimeZone;
    use mindwtr_core::{MemoryBlobStore, Task};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn retention_30d() -> Duration {
        Duration::from_secs(30 * 24 * 60 * 60)
    }

    fn snapshot_with_attachment(attachment: Attachment, owner_deleted: bool) -> Snapshot {
        let mut task = Task::new("owner", t0());
        task.attachments.push(attachment);
        if owner_deleted {
            task.mark_deleted(t0());
        }
        let mut snapshot = Snapshot::new();
        snapshot.insert_task(task);
        snapshot
    }

    fn synchronizer(blobs: Arc<MemoryBlobStore>) -> AttachmentSynchronizer {
        AttachmentSynchronizer::new(blobs, Arc::new(StatusBus::new()))
    }

    #[tokio::test]
    async fn uploads_when_only_local_has_content() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"content"));

        let transport = MockTransport::new();
        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report.uploaded, 1);
        assert_eq!(report.failed, 0);
        assert!(transport.blob_keys().contains(&attachment.id));
        assert_eq!(
            sync.progress(&attachment.id).unwrap().status,
            AttachmentStatus::Completed
        );
    }

    #[tokio::test]
    async fn downloads_when_only_remote_has_content() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        let transport = MockTransport::new();
        transport.insert_blob(attachment.id.clone(), Bytes::from_static(b"remote bytes"));

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report.downloaded, 1);
        assert!(blobs.ids().contains(&attachment.id));

        let progress = sync.progress(&attachment.id).unwrap();
        assert_eq!(progress.status, AttachmentStatus::Completed);
        assert_eq!(progress.total_bytes, 12);
        assert_eq!(progress.bytes_transferred, 12);
    }

    #[tokio::test]
    async fn in_sync_content_is_left_alone() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"same"));
        let transport = MockTransport::new();
        transport.insert_blob(attachment.id.clone(), Bytes::from_static(b"same"));

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report, AttachmentReport::default());
    }

    #[tokio::test]
    async fn link_attachments_are_skipped() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::link("https://example.com", "Docs", t0());
        let transport = MockTransport::new();

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report, AttachmentReport::default());
        assert!(sync.progress(&attachment.id).is_none());
    }

    #[tokio::test]
    async fn dangling_reference_is_failed_not_fatal() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("ghost.bin", "Ghost", t0());
        let transport = MockTransport::new();

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(
            sync.progress(&attachment.id).unwrap().status,
            AttachmentStatus::Failed
        );
    }

    #[tokio::test]
    async fn transfer_failure_marks_failed_and_continues() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"content"));

        let transport = MockTransport::new();
        transport.fail_blobs_with(MockFailure::Offline);

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.uploaded, 0);
        assert_eq!(
            sync.progress(&attachment.id).unwrap().status,
            AttachmentStatus::Failed
        );
    }

    #[tokio::test]
    async fn cancelled_transfer_is_failed_without_moving_bytes() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"content"));
        let transport = MockTransport::new();

        let sync = synchronizer(Arc::clone(&blobs));
        sync.cancel_handle(&attachment.id).cancel();
        let snapshot = snapshot_with_attachment(attachment.clone(), false);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;
        assert_eq!(report.failed, 1);
        assert!(transport.blob_keys().is_empty());
    }

    #[tokio::test]
    async fn expired_tombstone_blobs_are_cleaned_on_both_sides() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("old.bin", "Old", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"x"));
        let transport = MockTransport::new();
        transport.insert_blob(attachment.id.clone(), Bytes::from_static(b"x"));

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), true);

        // Owner tombstoned at t0; reconcile well past the retention window.
        let later = t0() + ChronoDuration::days(60);
        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), later)
            .await;
        assert_eq!(report.cleaned, 1);
        assert!(transport.blob_keys().is_empty());
        assert!(blobs.ids().is_empty());
    }

    #[tokio::test]
    async fn recent_tombstone_keeps_content() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("recent.bin", "Recent", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"x"));
        let transport = MockTransport::new();

        let sync = synchronizer(Arc::clone(&blobs));
        let snapshot = snapshot_with_attachment(attachment.clone(), true);

        let report = sync
            .reconcile(&snapshot, &transport, retention_30d(), t0() + ChronoDuration::days(1))
            .await;
        assert_eq!(report, AttachmentReport::default());
        assert!(blobs.ids().contains(&attachment.id));
    }

    #[tokio::test]
    async fn progress_events_are_published() {
        let blobs = Arc::new(MemoryBlobStore::new());
        let attachment = Attachment::file("doc.pdf", "Doc", t0());
        blobs.insert(attachment.id.clone(), Bytes::from_static(b"content"));
        let transport = MockTransport::new();

        let bus = Arc::new(StatusBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(move |event| {
            if let SyncEvent::AttachmentProgress { progress, .. } = event {
                seen_clone.lock().push(progress.status);
            }
        });

        let sync = AttachmentSynchronizer::new(Arc::clone(&blobs) as Arc<dyn BlobStore>, bus);
        let snapshot = snapshot_with_attachment(attachment, false);
        sync.reconcile(&snapshot, &transport, retention_30d(), t0())
            .await;

        assert_eq!(
            seen.lock().as_slice(),
            &[
                AttachmentStatus::Queued,
                AttachmentStatus::Transferring,
                AttachmentStatus::Completed
            ]
        );
    }
}
