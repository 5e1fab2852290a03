//! WebDAV backend: snapshot and blobs in a Basic-auth WebDAV folder.

use crate::config::{BackoffConfig, WebdavConfig, SNAPSHOT_FILE_NAME};
use crate::error::{classify_http_error, classify_status, SyncError, SyncResult};
use crate::transport::{parse_snapshot, FetchedSnapshot, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Gate that delays download attempts after repeated failures.
///
/// The delay grows with each consecutive failure up to the configured cap
/// and resets on any successful round trip. While the gate is closed,
/// downloads report offline without touching the network.
#[derive(Debug, Default)]
struct DownloadGate {
    failures: u32,
    blocked_until: Option<Instant>,
}

/// Transport for a WebDAV folder.
pub struct WebdavTransport {
    base_url: String,
    config: WebdavConfig,
    client: reqwest::Client,
    backoff: BackoffConfig,
    gate: Mutex<DownloadGate>,
}

impl WebdavTransport {
    /// Creates a WebDAV transport.
    pub fn new(
        config: WebdavConfig,
        timeout: Duration,
        backoff: BackoffConfig,
    ) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::unknown(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
            client,
            backoff,
            gate: Mutex::new(DownloadGate::default()),
        })
    }

    /// Returns how long the download gate stays closed, if it is.
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let gate = self.gate.lock();
        gate.blocked_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    fn snapshot_url(&self) -> String {
        format!("{}/{}", self.base_url, SNAPSHOT_FILE_NAME)
    }

    fn attachments_url(&self) -> String {
        format!("{}/attachments", self.base_url)
    }

    fn blob_url(&self, key: &str) -> String {
        format!("{}/attachments/{}", self.base_url, key)
    }

    fn check_gate(&self) -> SyncResult<()> {
        if let Some(remaining) = self.backoff_remaining() {
            return Err(SyncError::offline(format!(
                "webdav download backoff active for {}s",
                remaining.as_secs().max(1)
            )));
        }
        Ok(())
    }

    fn record_failure(&self) {
        let mut gate = self.gate.lock();
        gate.failures = gate.failures.saturating_add(1);
        let delay = self.backoff.delay_for_attempt(gate.failures);
        gate.blocked_until = Some(Instant::now() + delay);
        tracing::debug!(
            failures = gate.failures,
            delay_secs = delay.as_secs(),
            "webdav download failed, arming backoff"
        );
    }

    fn record_success(&self) {
        let mut gate = self.gate.lock();
        gate.failures = 0;
        gate.blocked_until = None;
    }

    /// Classifies a download failure, arming the backoff gate for
    /// failures a retry could help with.
    fn classify_download(&self, err: SyncError) -> SyncError {
        match &err {
            SyncError::Offline { .. } | SyncError::Unknown { .. } => self.record_failure(),
            // Auth and parse failures need the user, not a retry.
            _ => {}
        }
        err
    }

    async fn get(&self, url: &str) -> SyncResult<reqwest::Response> {
        self.client
            .get(url)
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .send()
            .await
            .map_err(classify_http_error)
    }

    async fn put(&self, url: &str, body: Bytes) -> SyncResult<reqwest::Response> {
        self.client
            .put(url)
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .body(body)
            .send()
            .await
            .map_err(classify_http_error)
    }

    /// Creates the attachments collection. Servers answer 405 when it
    /// already exists; that is fine.
    async fn mkcol_attachments(&self) -> SyncResult<()> {
        let method = reqwest::Method::from_bytes(b"MKCOL")
            .map_err(|e| SyncError::unknown(e.to_string()))?;
        let response = self
            .client
            .request(method, self.attachments_url())
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::METHOD_NOT_ALLOWED => Ok(()),
            s => Err(classify_status(s, "mkcol attachments")),
        }
    }
}

#[async_trait]
impl Transport for WebdavTransport {
    async fn fetch(&self) -> SyncResult<Option<FetchedSnapshot>> {
        self.check_gate()?;
        let response = self
            .get(&self.snapshot_url())
            .await
            .map_err(|e| self.classify_download(e))?;
        match response.status() {
            s if s.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| self.classify_download(classify_http_error(e)))?;
                let fetched = parse_snapshot(&bytes)?;
                self.record_success();
                Ok(Some(fetched))
            }
            // A 404 is a completed round trip: first sync.
            reqwest::StatusCode::NOT_FOUND => {
                self.record_success();
                Ok(None)
            }
            s => {
                let err = classify_status(s, "fetch snapshot");
                Err(self.classify_download(err))
            }
        }
    }

    async fn push(&self, payload: &[u8]) -> SyncResult<()> {
        let response = self
            .put(&self.snapshot_url(), Bytes::copy_from_slice(payload))
            .await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s => Err(classify_status(s, "push snapshot")),
        }
    }

    async fn fetch_blob(&self, key: &str) -> SyncResult<Bytes> {
        self.check_gate()?;
        let response = self
            .get(&self.blob_url(key))
            .await
            .map_err(|e| self.classify_download(e))?;
        match response.status() {
            s if s.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| self.classify_download(classify_http_error(e)))?;
                self.record_success();
                Ok(bytes)
            }
            s => Err(classify_status(s, "fetch blob")),
        }
    }

    async fn push_blob(&self, key: &str, content: Bytes) -> SyncResult<()> {
        let response = self.put(&self.blob_url(key), content.clone()).await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            // Missing collection: create it and retry once.
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::CONFLICT => {
                self.mkcol_attachments().await?;
                let response = self.put(&self.blob_url(key), content).await?;
                match response.status() {
                    s if s.is_success() => Ok(()),
                    s => Err(classify_status(s, "push blob")),
                }
            }
            s => Err(classify_status(s, "push blob")),
        }
    }

    async fn blob_exists(&self, key: &str) -> SyncResult<bool> {
        let response = self
            .client
            .head(self.blob_url(key))
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(classify_status(s, "stat blob")),
        }
    }

    async fn delete_blob(&self, key: &str) -> SyncResult<()> {
        let response = self
            .client
            .delete(self.blob_url(key))
            .basic_auth(&self.config.username, Some(self.config.password.expose()))
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::NOT_FOUND => Ok(()),
            s => Err(classify_status(s, "delete blob")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_with(base_url: &str, backoff: BackoffConfig) -> WebdavTransport {
        WebdavTransport::new(
            WebdavConfig::new(base_url, "alice", "hunter2"),
            Duration::from_millis(500),
            backoff,
        )
        .unwrap()
    }

    #[test]
    fn urls_join_under_the_base() {
        let transport = transport_with(
            "https://dav.example.com/remote.php/files/",
            BackoffConfig::default(),
        );
        assert_eq!(
            transport.snapshot_url(),
            "https://dav.example.com/remote.php/files/mindwtr-sync.json"
        );
        assert_eq!(
            transport.blob_url("att-1"),
            "https://dav.example.com/remote.php/files/attachments/att-1"
        );
    }

    #[tokio::test]
    async fn repeated_failures_arm_the_gate() {
        // Nothing listens on this port: connections are refused instantly.
        let transport = transport_with(
            "http://127.0.0.1:9",
            BackoffConfig::new(Duration::from_secs(60), Duration::from_secs(300), 2.0),
        );

        let err = transport.fetch().await.unwrap_err();
        assert!(err.is_offline());
        assert!(transport.backoff_remaining().is_some());

        // While the gate is closed the next fetch fails fast, offline,
        // without a network attempt.
        let err = transport.fetch().await.unwrap_err();
        assert!(err.is_offline());
        assert!(err.to_string().contains("backoff"));
    }

    #[tokio::test]
    async fn gate_resets_on_success() {
        let transport = transport_with("http://127.0.0.1:9", BackoffConfig::default());
        transport.record_failure();
        assert!(transport.backoff_remaining().is_some());

        transport.record_success();
        assert!(transport.backoff_remaining().is_none());
        assert_eq!(transport.gate.lock().failures, 0);
    }

    #[tokio::test]
    async fn gate_delay_grows_with_failures() {
        let backoff = BackoffConfig::new(Duration::from_secs(5), Duration::from_secs(60), 2.0);
        let transport = transport_with("http://127.0.0.1:9", backoff);

        transport.record_failure();
        let first = transport.backoff_remaining().unwrap();
        transport.record_failure();
        let second = transport.backoff_remaining().unwrap();
        assert!(second > first);
    }
}
