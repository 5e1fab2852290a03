//! The snapshot document exchanged with sync remotes.

use crate::entity::{Area, Attachment, Project, Section, Setting, Syncable, Task};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The full exported state: every collection keyed by entity id.
///
/// Collections are sorted maps so the canonical JSON encoding is
/// deterministic regardless of insertion order. Order is irrelevant to
/// identity; identity is by id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Tasks by id.
    #[serde(default)]
    pub tasks: BTreeMap<String, Task>,
    /// Projects by id.
    #[serde(default)]
    pub projects: BTreeMap<String, Project>,
    /// Sections by id.
    #[serde(default)]
    pub sections: BTreeMap<String, Section>,
    /// Areas by id.
    #[serde(default)]
    pub areas: BTreeMap<String, Area>,
    /// Settings by key.
    #[serde(default)]
    pub settings: BTreeMap<String, Setting>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if every collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entity_count() == 0
    }

    /// Returns the total number of entities across all collections,
    /// tombstones included.
    pub fn entity_count(&self) -> usize {
        self.tasks.len()
            + self.projects.len()
            + self.sections.len()
            + self.areas.len()
            + self.settings.len()
    }

    /// Inserts a task, keyed by its id.
    pub fn insert_task(&mut self, task: Task) {
        self.tasks.insert(task.id().to_string(), task);
    }

    /// Inserts a project, keyed by its id.
    pub fn insert_project(&mut self, project: Project) {
        self.projects.insert(project.id().to_string(), project);
    }

    /// Iterates over every attachment in the snapshot together with the
    /// tombstone timestamp of its owning entity (if the owner is deleted).
    ///
    /// Attachment reconciliation and retention cleanup both walk this view.
    pub fn attachments(
        &self,
    ) -> impl Iterator<Item = (&Attachment, Option<chrono::DateTime<chrono::Utc>>)> + '_ {
        let task_attachments = self
            .tasks
            .values()
            .flat_map(|t| t.attachments.iter().map(move |a| (a, t.deleted_at())));
        let project_attachments = self
            .projects
            .values()
            .flat_map(|p| p.attachments.iter().map(move |a| (a, p.deleted_at())));
        task_attachments.chain(project_attachments)
    }

    /// Serializes the snapshot to its canonical JSON byte form.
    ///
    /// Canonical means: sorted collection keys (guaranteed by the map
    /// type) and fixed field order, so equal snapshots always produce
    /// equal bytes.
    pub fn to_canonical_json(&self) -> Vec<u8> {
        // Serializing an in-memory snapshot cannot fail on well-formed data.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Parses a snapshot from JSON bytes.
    ///
    /// Missing collections default to empty; a payload that is not valid
    /// JSON for this shape is an error the caller classifies as corrupt.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
