//! Content digests for change detection.
//!
//! The orchestrator compares payload digests against the persisted
//! baseline digests to skip merge and push work when neither side changed.

use mindwtr_core::Snapshot;
use sha2::{Digest, Sha256};

/// Returns the SHA-256 digest of a payload as lowercase hex.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash = hasher.finalize();
    let mut out = String::with_capacity(hash.len() * 2);
    for byte in hash {
        use std::fmt::Write;
        // Writing to a String cannot fail.
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Returns the digest of a snapshot's canonical JSON form.
pub fn snapshot_digest(snapshot: &Snapshot) -> String {
    digest(&snapshot.to_canonical_json())
}
