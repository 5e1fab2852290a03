//! Error types for storage collaborators.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the local storage layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error from the backing file or database.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored payload could not be parsed.
    #[error("corrupt store payload: {message}")]
    Corrupt {
        /// Description of the parse failure.
        message: String,
    },

    /// Requested blob does not exist locally.
    #[error("blob not found: {id}")]
    BlobNotFound {
        /// Attachment id of the missing blob.
        id: String,
    },
}

impl StoreError {
    /// Creates a corrupt-payload error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::corrupt("truncated JSON");
        assert_eq!(err.to_string(), "corrupt store payload: truncated JSON");

        let err = StoreError::BlobNotFound { id: "att-1".into() };
        assert!(err.to_string().contains("att-1"));
    }
}
