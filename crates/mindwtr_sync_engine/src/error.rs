//! Error types for the sync engine.

use mindwtr_core::StoreError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
///
/// The taxonomy drives user-visible behavior: only [`SyncError::Unauthorized`],
/// [`SyncError::DataCorrupt`], and [`SyncError::Unknown`] produce an alert.
/// Offline failures are transient and retried silently.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No network path to the remote (DNS failure, connection refused or
    /// reset, timeout, network unreachable).
    #[error("offline: {message}")]
    Offline {
        /// Description of the connectivity failure.
        message: String,
    },

    /// Credentials were rejected by the remote. Actionable: the UI must
    /// prompt for reconfiguration rather than retry blindly.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Description of the auth failure.
        message: String,
    },

    /// The remote has no snapshot yet. Not a failure: the first cycle
    /// pushes the local snapshot as the initial remote.
    #[error("remote snapshot not found")]
    NotFound,

    /// The remote payload could not be parsed. The cycle aborts without
    /// touching local data.
    #[error("remote payload corrupt: {message}")]
    DataCorrupt {
        /// Description of the parse failure.
        message: String,
    },

    /// An attachment transfer was cancelled.
    #[error("transfer cancelled")]
    Cancelled,

    /// Local storage error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Anything else; redacted and surfaced as an error.
    #[error("sync failed: {message}")]
    Unknown {
        /// Description of the failure.
        message: String,
    },
}

impl SyncError {
    /// Creates an offline error.
    pub fn offline(message: impl Into<String>) -> Self {
        Self::Offline {
            message: message.into(),
        }
    }

    /// Creates an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates a corrupt-payload error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::DataCorrupt {
            message: message.into(),
        }
    }

    /// Creates an unknown error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Returns true for transient connectivity failures that must not be
    /// surfaced as data-loss errors.
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::Offline { .. })
    }

    /// Returns true if the error should produce a user-visible alert.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthorized { .. } | SyncError::DataCorrupt { .. } | SyncError::Unknown { .. }
        ) || matches!(self, SyncError::Store(_))
    }
}

/// Classifies a reqwest error into the sync taxonomy.
///
/// Connectivity failures become [`SyncError::Offline`]; 401/403 become
/// [`SyncError::Unauthorized`]; everything else is [`SyncError::Unknown`].
pub(crate) fn classify_http_error(err: reqwest::Error) -> SyncError {
    if err.is_connect() || err.is_timeout() {
        return SyncError::offline(err.to_string());
    }
    if let Some(status) = err.status() {
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return SyncError::unauthorized(err.to_string());
        }
    }
    // reqwest reports DNS and socket errors as request errors without a
    // status; treat any status-less request failure as connectivity.
    if err.status().is_none() && err.is_request() {
        return SyncError::offline(err.to_string());
    }
    SyncError::unknown(err.to_string())
}

/// Classifies an HTTP status code for a snapshot or blob request.
pub(crate) fn classify_status(status: reqwest::StatusCode, context: &str) -> SyncError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            SyncError::unauthorized(format!("{context}: HTTP {status}"))
        }
        reqwest::StatusCode::NOT_FOUND => SyncError::NotFound,
        s if s.is_server_error() => SyncError::unknown(format!("{context}: HTTP {s}")),
        s => SyncError::unknown(format!("{context}: unexpected HTTP {s}")),
    }
}
