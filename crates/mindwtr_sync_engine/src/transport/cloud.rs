//! Cloud backend: a single token-authenticated HTTP endpoint.

use crate::config::CloudConfig;
use crate::error::{classify_http_error, classify_status, SyncError, SyncResult};
use crate::transport::{parse_snapshot, FetchedSnapshot, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Transport for the mindwtr cloud endpoint.
///
/// Same error taxonomy as WebDAV minus the folder-path concept: the
/// snapshot lives at `/snapshot` and blobs under `/blobs/<key>`.
pub struct CloudTransport {
    base_url: String,
    config: CloudConfig,
    client: reqwest::Client,
}

impl CloudTransport {
    /// Creates a cloud transport.
    pub fn new(config: CloudConfig, timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::unknown(e.to_string()))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    fn snapshot_url(&self) -> String {
        format!("{}/snapshot", self.base_url)
    }

    fn blob_url(&self, key: &str) -> String {
        format!("{}/blobs/{}", self.base_url, key)
    }
}

#[async_trait]
impl Transport for CloudTransport {
    async fn fetch(&self) -> SyncResult<Option<FetchedSnapshot>> {
        let response = self
            .client
            .get(self.snapshot_url())
            .bearer_auth(self.config.token.expose())
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => {
                let bytes = response.bytes().await.map_err(classify_http_error)?;
                Ok(Some(parse_snapshot(&bytes)?))
            }
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            s => Err(classify_status(s, "fetch snapshot")),
        }
    }

    async fn push(&self, payload: &[u8]) -> SyncResult<()> {
        let response = self
            .client
            .put(self.snapshot_url())
            .bearer_auth(self.config.token.expose())
            .body(payload.to_vec())
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s => Err(classify_status(s, "push snapshot")),
        }
    }

    async fn fetch_blob(&self, key: &str) -> SyncResult<Bytes> {
        let response = self
            .client
            .get(self.blob_url(key))
            .bearer_auth(self.config.token.expose())
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => response.bytes().await.map_err(classify_http_error),
            s => Err(classify_status(s, "fetch blob")),
        }
    }

    async fn push_blob(&self, key: &str, content: Bytes) -> SyncResult<()> {
        let response = self
            .client
            .put(self.blob_url(key))
            .bearer_auth(self.config.token.expose())
            .body(content)
            .send()
            .await
            .map_err(classify_http_error)?;
        match response.status() {
            s if s.is_success() => Ok(()),
            s => Err(classify_status(s, "push blob")),
        }
    }

    async fn blob_exists(&self, key: &str) -> SyncResult<bool> {
        let response = self
            .client
            .head(self.blob_url(key))
            .bearer_auth(self.config.token.expose())
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
            .bearer_auth(self.config.token.expose())
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
