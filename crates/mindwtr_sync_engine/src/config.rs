//! Configuration for the sync engine.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current snapshot file name on file-based remotes.
pub(crate) const SNAPSHOT_FILE_NAME: &str = "mindwtr-sync.json";

/// Snapshot file name written by pre-rename releases. Still accepted in
/// configured paths so existing setups keep working.
pub(crate) const LEGACY_SNAPSHOT_FILE_NAME: &str = "gtd-data.json";

/// Platform the engine runs on. Determines the default backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Desktop client: sync is opt-in, default backend is `Off`.
    Desktop,
    /// Mobile client: defaults to the shared-file backend.
    Mobile,
}

/// The configured sync backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncBackend {
    /// Snapshot file in a local or shared directory.
    File,
    /// WebDAV folder with Basic auth.
    Webdav,
    /// Token-authenticated cloud endpoint.
    Cloud,
    /// Sync disabled.
    #[default]
    Off,
}

impl SyncBackend {
    /// Normalizes a persisted backend setting.
    ///
    /// Known values map to themselves; unknown or missing values fall back
    /// to the platform default (`Off` on desktop, `File` on mobile). The
    /// asymmetry is deliberate and must be preserved.
    pub fn normalize(raw: Option<&str>, platform: Platform) -> Self {
        match raw {
            Some("file") => SyncBackend::File,
            Some("webdav") => SyncBackend::Webdav,
            Some("cloud") => SyncBackend::Cloud,
            Some("off") => SyncBackend::Off,
            _ => match platform {
                Platform::Desktop => SyncBackend::Off,
                Platform::Mobile => SyncBackend::File,
            },
        }
    }

    /// Returns the setting string for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncBackend::File => "file",
            SyncBackend::Webdav => "webdav",
            SyncBackend::Cloud => "cloud",
            SyncBackend::Off => "off",
        }
    }
}

impl fmt::Display for SyncBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A credential that must never appear in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps a credential.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the wrapped credential for use in an auth header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// File backend configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Configured sync location: the snapshot file itself (current or
    /// legacy name) or its containing directory, with or without a
    /// trailing slash.
    pub path: PathBuf,
}

impl FileConfig {
    /// Creates a file backend config.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the directory that holds the snapshot and attachments.
    ///
    /// A path naming the current-format or legacy snapshot file resolves
    /// to its parent; anything else is treated as the directory itself.
    /// `Path` normalization already makes a trailing slash and a bare
    /// directory path equivalent.
    pub fn sync_dir(&self) -> PathBuf {
        match self.path.file_name().and_then(|n| n.to_str()) {
            Some(SNAPSHOT_FILE_NAME) | Some(LEGACY_SNAPSHOT_FILE_NAME) => self
                .path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
            _ => self.path.clone(),
        }
    }

    /// Returns the full path of the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.sync_dir().join(SNAPSHOT_FILE_NAME)
    }
}

/// WebDAV backend configuration.
#[derive(Debug, Clone)]
pub struct WebdavConfig {
    /// Base URL of the WebDAV folder.
    pub base_url: String,
    /// Basic auth username.
    pub username: String,
    /// Basic auth password. Stored separately from settings, never logged.
    pub password: Secret,
}

impl WebdavConfig {
    /// Creates a WebDAV backend config.
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<Secret>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Cloud backend configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Base URL of the cloud endpoint.
    pub base_url: String,
    /// Bearer token. Never logged.
    pub token: Secret,
}

impl CloudConfig {
    /// Creates a cloud backend config.
    pub fn new(base_url: impl Into<String>, token: impl Into<Secret>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

/// Configuration for sync behavior.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum spacing between self-initiated cycles.
    pub min_sync_interval: Duration,
    /// Age a tombstone must reach before its attachment blobs are deleted.
    pub attachment_retention: Duration,
    /// Request timeout for transport calls.
    pub timeout: Duration,
    /// Window within which the same error string is not re-surfaced.
    pub error_dedup_window: Duration,
    /// Backoff applied to repeated WebDAV download failures.
    pub webdav_backoff: BackoffConfig,
}

impl SyncConfig {
    /// Creates the default sync configuration.
    pub fn new() -> Self {
        Self {
            min_sync_interval: Duration::from_secs(5),
            attachment_retention: Duration::from_secs(30 * 24 * 60 * 60),
            timeout: Duration::from_secs(30),
            error_dedup_window: Duration::from_secs(10 * 60),
            webdav_backoff: BackoffConfig::default(),
        }
    }

    /// Sets the minimum spacing between self-initiated cycles.
    pub fn with_min_sync_interval(mut self, interval: Duration) -> Self {
        self.min_sync_interval = interval;
        self
    }

    /// Sets the attachment retention window.
    pub fn with_attachment_retention(mut self, retention: Duration) -> Self {
        self.attachment_retention = retention;
        self
    }

    /// Sets the transport request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the error dedup window.
    pub fn with_error_dedup_window(mut self, window: Duration) -> Self {
        self.error_dedup_window = window;
        self
    }

    /// Sets the WebDAV download backoff curve.
    pub fn with_webdav_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.webdav_backoff = backoff;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for failure backoff.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Cap on the delay regardless of failure count.
    pub max_delay: Duration,
    /// Multiplier applied per consecutive failure.
    pub multiplier: f64,
}

impl BackoffConfig {
    /// Creates a backoff configuration.
    pub fn new(initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Calculates the delay after the given number of consecutive
    /// failures (1-indexed; zero failures means no delay).
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_delay.as_secs_f64()
            * self.multiplier.powi(failures.saturating_sub(1) as i32);
        Duration::from_secs_f64(base.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(5 * 60), 2.0)
    }
}
