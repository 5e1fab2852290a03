//! Sync orchestrator.
//!
//! One orchestrator per process owns the end-to-end cycle: select the
//! backend, fetch, merge, push, reconcile attachments, persist the
//! baseline and stats, broadcast status. All dependencies (storage,
//! transport factory, clock) are injected at construction so there is no
//! hidden global state, and [`SyncOrchestrator::reset_for_tests`] restores
//! a pristine instance between test cases.

use crate::attachments::{AttachmentReport, AttachmentSynchronizer};
use crate::checksum;
use crate::config::{CloudConfig, FileConfig, SyncBackend, SyncConfig, WebdavConfig};
use crate::error::{SyncError, SyncResult};
use crate::merge;
use crate::redact::redact;
use crate::status::{Clock, StatusBus, Subscription, SyncEvent, SyncStatus, SyncStep};
use crate::transport::{CloudTransport, FileTransport, Transport, WebdavTransport};
use mindwtr_core::{
    conflict_count, BlobStore, DataStore, PersistedSyncState, Snapshot, StatsMap, SyncOutcome,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Result of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// True if the cycle completed, even when conflicts were resolved.
    pub success: bool,
    /// Redacted error message when the cycle failed.
    pub error: Option<String>,
    /// Per-collection merge statistics, when a merge ran.
    pub stats: StatsMap,
    /// Attachment reconcile counts, when that phase ran.
    pub attachments: AttachmentReport,
}

/// Builds the transport for the selected backend.
pub trait TransportFactory: Send + Sync {
    /// Returns the transport for a backend. Called once per cycle, never
    /// for [`SyncBackend::Off`].
    fn transport(&self, backend: SyncBackend) -> SyncResult<Arc<dyn Transport>>;
}

/// Factory that hands out one fixed transport regardless of backend.
///
/// Useful in tests and in embedders that construct the transport
/// themselves.
pub struct StaticTransportFactory(Arc<dyn Transport>);

impl StaticTransportFactory {
    /// Wraps an already-built transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self(transport)
    }
}

impl TransportFactory for StaticTransportFactory {
    fn transport(&self, _backend: SyncBackend) -> SyncResult<Arc<dyn Transport>> {
        Ok(Arc::clone(&self.0))
    }
}

/// Transport factory over the configured backends.
///
/// Transports are built lazily and cached so per-transport state (the
/// WebDAV download backoff gate) survives across cycles.
pub struct BackendTransportFactory {
    file: Option<FileConfig>,
    webdav: Option<WebdavConfig>,
    cloud: Option<CloudConfig>,
    config: SyncConfig,
    cache: Mutex<HashMap<&'static str, Arc<dyn Transport>>>,
}

impl BackendTransportFactory {
    /// Creates a factory from the persisted backend configuration.
    pub fn new(
        file: Option<FileConfig>,
        webdav: Option<WebdavConfig>,
        cloud: Option<CloudConfig>,
        config: SyncConfig,
    ) -> Self {
        Self {
            file,
            webdav,
            cloud,
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn build(&self, backend: SyncBackend) -> SyncResult<Arc<dyn Transport>> {
        match backend {
            SyncBackend::File => {
                let config = self
                    .file
                    .clone()
                    .ok_or_else(|| SyncError::unknown("file backend selected but not configured"))?;
                Ok(Arc::new(FileTransport::new(config)))
            }
            SyncBackend::Webdav => {
                let config = self.webdav.clone().ok_or_else(|| {
                    SyncError::unknown("webdav backend selected but not configured")
                })?;
                Ok(Arc::new(WebdavTransport::new(
                    config,
                    self.config.timeout,
                    self.config.webdav_backoff.clone(),
                )?))
            }
            SyncBackend::Cloud => {
                let config = self.cloud.clone().ok_or_else(|| {
                    SyncError::unknown("cloud backend selected but not configured")
                })?;
                Ok(Arc::new(CloudTransport::new(config, self.config.timeout)?))
            }
            SyncBackend::Off => Err(SyncError::unknown("no transport when sync is off")),
        }
    }
}

impl TransportFactory for BackendTransportFactory {
    fn transport(&self, backend: SyncBackend) -> SyncResult<Arc<dyn Transport>> {
        let mut cache = self.cache.lock();
        if let Some(cached) = cache.get(backend.as_str()) {
            return Ok(Arc::clone(cached));
        }
        let transport = self.build(backend)?;
        cache.insert(backend.as_str(), Arc::clone(&transport));
        Ok(transport)
    }
}

struct Inner {
    backend: SyncBackend,
    config: SyncConfig,
    store: Arc<dyn DataStore>,
    factory: Arc<dyn TransportFactory>,
    clock: Arc<dyn Clock>,
    bus: Arc<StatusBus>,
    attachments: AttachmentSynchronizer,
    status: Mutex<SyncStatus>,
    // Serializes cycles; waiters behind it either run the trailing rerun
    // or return the report of a cycle that already observed their request.
    cycle_lock: tokio::sync::Mutex<()>,
    request_seq: AtomicU64,
    satisfied_seq: AtomicU64,
    last_report: Mutex<Option<SyncReport>>,
    last_cycle_at: Mutex<Option<Instant>>,
    last_surfaced: Mutex<Option<(String, Instant)>>,
    debounce_pending: AtomicBool,
}

/// Orchestrates sync cycles for one process.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    /// Creates an orchestrator with injected dependencies.
    pub fn new(
        backend: SyncBackend,
        config: SyncConfig,
        store: Arc<dyn DataStore>,
        blobs: Arc<dyn BlobStore>,
        factory: Arc<dyn TransportFactory>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let bus = Arc::new(StatusBus::new());
        let attachments = AttachmentSynchronizer::new(blobs, Arc::clone(&bus));
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                store,
                factory,
                clock,
                bus,
                attachments,
                status: Mutex::new(SyncStatus::default()),
                cycle_lock: tokio::sync::Mutex::new(()),
                request_seq: AtomicU64::new(0),
                satisfied_seq: AtomicU64::new(0),
                last_report: Mutex::new(None),
                last_cycle_at: Mutex::new(None),
                last_surfaced: Mutex::new(None),
                debounce_pending: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the current sync status.
    pub fn status(&self) -> SyncStatus {
        *self.inner.status.lock()
    }

    /// Subscribes to status and attachment-progress events. Listeners are
    /// notified on every transition, including once more after a trailing
    /// queued cycle finishes.
    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.bus.subscribe(listener)
    }

    /// Returns the attachment synchronizer, for progress queries and
    /// per-attachment cancellation.
    pub fn attachments(&self) -> &AttachmentSynchronizer {
        &self.inner.attachments
    }

    /// Requests a sync, debounced against the minimum cycle spacing.
    ///
    /// The entry point for UI actions, background timers, and lifecycle
    /// events. The request is never silently dropped: a cycle always
    /// eventually runs with the latest local data, but rapid requests
    /// coalesce into one pending run.
    pub fn request_sync(&self, min_interval: Option<Duration>) {
        if self.inner.backend == SyncBackend::Off {
            return;
        }
        // A pending debounced run will observe this request's data.
        if self.inner.debounce_pending.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = self.clone();
        let interval = min_interval.unwrap_or(this.inner.config.min_sync_interval);
        tokio::spawn(async move {
            let wait = {
                let last = *this.inner.last_cycle_at.lock();
                match last {
                    Some(last) => (last + interval).saturating_duration_since(Instant::now()),
                    None => Duration::ZERO,
                }
            };
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            this.inner.debounce_pending.store(false, Ordering::SeqCst);
            this.perform_sync().await;
        });
    }

    /// Runs exactly one sync cycle end to end.
    ///
    /// Calling this while a cycle is in flight never starts a second
    /// concurrent cycle: the call marks the status queued, waits, and
    /// either runs the single trailing rerun or returns the report of a
    /// cycle that already observed its request. Every caller resolves.
    pub async fn perform_sync(&self) -> SyncReport {
        let my_seq = self.inner.request_seq.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut status = self.inner.status.lock();
            if status.in_flight && !status.queued {
                status.queued = true;
                let snapshot = *status;
                drop(status);
                self.publish_status(snapshot);
            }
        }

        let _guard = self.inner.cycle_lock.lock().await;

        // A cycle that started after this request arrived has already run
        // with data at least as fresh as ours.
        if self.inner.satisfied_seq.load(Ordering::SeqCst) >= my_seq {
            if let Some(report) = self.inner.last_report.lock().clone() {
                return report;
            }
        }

        let started_seq = self.inner.request_seq.load(Ordering::SeqCst);
        *self.inner.last_cycle_at.lock() = Some(Instant::now());

        let report = self.run_cycle().await;

        self.inner.satisfied_seq.store(started_seq, Ordering::SeqCst);
        *self.inner.last_report.lock() = Some(report.clone());
        report
    }

    /// Clears all orchestrator state: status, queued bookkeeping,
    /// listeners, error dedup, attachment progress. The persisted sync
    /// state in the data store is left untouched.
    pub fn reset_for_tests(&self) {
        *self.inner.status.lock() = SyncStatus::default();
        self.inner.request_seq.store(0, Ordering::SeqCst);
        self.inner.satisfied_seq.store(0, Ordering::SeqCst);
        *self.inner.last_report.lock() = None;
        *self.inner.last_cycle_at.lock() = None;
        *self.inner.last_surfaced.lock() = None;
        self.inner.debounce_pending.store(false, Ordering::SeqCst);
        self.inner.bus.clear();
        self.inner.attachments.reset();
    }

    fn publish_status(&self, status: SyncStatus) {
        self.inner.bus.publish(&SyncEvent::StatusChanged { status });
    }

    fn set_step(&self, step: SyncStep) {
        let snapshot = {
            let mut status = self.inner.status.lock();
            status.step = step;
            *status
        };
        self.publish_status(snapshot);
    }

    async fn run_cycle(&self) -> SyncReport {
        if self.inner.backend == SyncBackend::Off {
            return SyncReport {
                success: true,
                ..Default::default()
            };
        }

        let begin = {
            let mut status = self.inner.status.lock();
            status.in_flight = true;
            status.queued = false;
            status.step = SyncStep::Fetching;
            *status
        };
        self.publish_status(begin);

        let outcome = self.cycle_body().await;

        let report = match outcome {
            Ok(report) => report,
            Err(e) => self.handle_cycle_error(e).await,
        };

        let done = {
            let mut status = self.inner.status.lock();
            status.in_flight = false;
            status.step = SyncStep::Idle;
            *status
        };
        self.publish_status(done);
        report
    }

    async fn cycle_body(&self) -> SyncResult<SyncReport> {
        let local = self.inner.store.get_data().await?;
        let persisted = self
            .inner
            .store
            .load_sync_state()
            .await?
            .unwrap_or_default();

        let transport = self.inner.factory.transport(self.inner.backend)?;

        let fetched = transport.fetch().await?;
        tracing::debug!(
            remote_present = fetched.is_some(),
            "fetched remote snapshot"
        );

        self.set_step(SyncStep::Merging);

        let (remote, remote_digest) = match &fetched {
            Some(f) => (f.snapshot.clone(), Some(f.digest.clone())),
            // First sync: the local snapshot becomes the initial remote.
            None => (Snapshot::new(), None),
        };

        // Nothing changed on either side since the last cycle: skip the
        // merge and push entirely.
        let local_digest = checksum::snapshot_digest(&local);
        if remote_digest.is_some()
            && remote_digest == persisted.remote_digest
            && Some(&local_digest) == persisted.local_digest.as_ref()
        {
            tracing::debug!("digests unchanged since baseline, skipping merge");
            self.finish_success(persisted.last_stats.clone(), SyncOutcome::Success)
                .await?;
            return Ok(SyncReport {
                success: true,
                stats: persisted.last_stats,
                ..Default::default()
            });
        }

        let merged = merge::merge(&local, &remote, &persisted.baseline);
        let conflicts = conflict_count(&merged.stats);
        if conflicts > 0 {
            tracing::info!(conflicts, "merge resolved conflicts by recency");
        }

        self.set_step(SyncStep::Pushing);
        let payload = merged.merged.to_canonical_json();
        transport.push(&payload).await?;
        self.inner.store.save_data(&merged.merged).await?;

        self.set_step(SyncStep::SyncingAttachments);
        let attachment_report = self
            .inner
            .attachments
            .reconcile(
                &merged.merged,
                transport.as_ref(),
                self.inner.config.attachment_retention,
                self.inner.clock.now(),
            )
            .await;
        if attachment_report.failed > 0 {
            tracing::warn!(
                failed = attachment_report.failed,
                "attachment transfers failed, will retry next cycle"
            );
        }

        let outcome = if conflicts > 0 {
            SyncOutcome::Conflict
        } else {
            SyncOutcome::Success
        };
        let digest = checksum::digest(&payload);
        let state = PersistedSyncState {
            baseline: merged.merged,
            remote_digest: Some(digest.clone()),
            local_digest: Some(digest),
            last_result: Some(outcome),
            last_stats: merged.stats.clone(),
            last_error: None,
            last_result_at: Some(self.inner.clock.now()),
        };
        self.inner.store.save_sync_state(&state).await?;

        {
            let mut status = self.inner.status.lock();
            status.last_result = Some(outcome);
            status.last_result_at = state.last_result_at;
        }

        Ok(SyncReport {
            success: true,
            error: None,
            stats: merged.stats,
            attachments: attachment_report,
        })
    }

    /// Records a clean short-circuited cycle.
    async fn finish_success(&self, stats: StatsMap, outcome: SyncOutcome) -> SyncResult<()> {
        let now = self.inner.clock.now();
        {
            let mut status = self.inner.status.lock();
            status.last_result = Some(outcome);
            status.last_result_at = Some(now);
        }
        let mut persisted = self
            .inner
            .store
            .load_sync_state()
            .await?
            .unwrap_or_default();
        persisted.last_result = Some(outcome);
        persisted.last_stats = stats;
        persisted.last_error = None;
        persisted.last_result_at = Some(now);
        self.inner.store.save_sync_state(&persisted).await?;
        Ok(())
    }

    async fn handle_cycle_error(&self, error: SyncError) -> SyncReport {
        let message = redact(&error.to_string());

        if error.is_offline() {
            // Offline is transient: retried on the next natural trigger
            // and never surfaced as a reportable failure.
            tracing::debug!(error = %message, "sync skipped while offline");
            return SyncReport {
                success: false,
                error: Some(message),
                ..Default::default()
            };
        }

        let now = self.inner.clock.now();
        {
            let mut status = self.inner.status.lock();
            status.last_result = Some(SyncOutcome::Error);
            status.last_result_at = Some(now);
        }

        if self.should_surface(&message) {
            tracing::error!(error = %message, "sync failed");
        } else {
            tracing::debug!(error = %message, "sync failed (already reported)");
        }

        // Keep the old baseline: a failed cycle must never advance it.
        match self.inner.store.load_sync_state().await {
            Ok(state) => {
                let mut state = state.unwrap_or_default();
                state.last_result = Some(SyncOutcome::Error);
                state.last_error = Some(message.clone());
                state.last_result_at = Some(now);
                if let Err(e) = self.inner.store.save_sync_state(&state).await {
                    tracing::warn!(error = %e, "failed to persist sync error state");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load sync state while recording error");
            }
        }

        SyncReport {
            success: false,
            error: Some(message),
            ..Default::default()
        }
    }

    /// Returns true when an error message should be surfaced to the user,
    /// deduplicating repeats inside the configured window.
    fn should_surface(&self, message: &str) -> bool {
        let mut last = self.inner.last_surfaced.lock();
        let now = Instant::now();
        match last.as_ref() {
            Some((prev, at))
                if prev == message
                    && now.saturating_duration_since(*at) < self.inner.config.error_dedup_window =>
            {
                false
            }
            _ => {
                *last = Some((message.to_string(), now));
                true
            }
        }
    }
}
