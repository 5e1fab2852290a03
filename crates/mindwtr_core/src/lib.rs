//! # mindwtr Core
//!
//! Shared data model and storage contracts for mindwtr.
//!
//! This crate provides:
//! - Syncable entity types (tasks, projects, sections, areas, settings)
//! - The [`Snapshot`] document exchanged with sync remotes
//! - Attachment metadata carried by tasks and projects
//! - Per-collection sync statistics
//! - The local storage collaborator traits with test implementations
//!
//! ## Architecture
//!
//! Entities are identified by globally unique string ids assigned at
//! creation. Every mutation bumps `updatedAt`; deletions set `deletedAt`
//! and retain the entity as a tombstone so the deletion can propagate to
//! other replicas. Snapshots keep their collections in id-keyed sorted
//! maps so the canonical JSON encoding is deterministic.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod snapshot;
mod stats;
mod store;

pub use entity::{
    Area, Attachment, AttachmentKind, Project, ProjectStatus, Section, Setting, Syncable, Task,
    TaskStatus,
};
pub use error::{StoreError, StoreResult};
pub use snapshot::Snapshot;
pub use stats::{conflict_count, CollectionName, StatsMap, SyncOutcome, SyncStats};
pub use store::{
    BlobStore, DataStore, FsBlobStore, MemoryBlobStore, MemoryStore, PersistedSyncState,
};
