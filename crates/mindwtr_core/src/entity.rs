//! Syncable entity types.
//!
//! Every entity carries the sync-relevant triplet: an immutable `id`, an
//! `updatedAt` timestamp bumped by the owning client on every mutation, and
//! an optional `deletedAt` tombstone. Field names on the wire are camelCase
//! to match the application's JSON document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Common shape shared by every entity that participates in sync.
pub trait Syncable {
    /// Returns the entity id (immutable, globally unique).
    fn id(&self) -> &str;

    /// Returns the last-mutation timestamp.
    fn updated_at(&self) -> DateTime<Utc>;

    /// Returns the tombstone timestamp, if the entity is logically deleted.
    fn deleted_at(&self) -> Option<DateTime<Utc>>;

    /// Returns true if the entity is a tombstone.
    fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }
}

macro_rules! impl_syncable {
    ($ty:ty) => {
        impl Syncable for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn updated_at(&self) -> DateTime<Utc> {
                self.updated_at
            }

            fn deleted_at(&self) -> Option<DateTime<Utc>> {
                self.deleted_at
            }
        }
    };
}

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Captured but not yet processed.
    #[default]
    Inbox,
    /// Actionable next step.
    Next,
    /// Blocked on someone or something else.
    Waiting,
    /// Deferred indefinitely.
    Someday,
    /// Completed.
    Done,
}

/// Lifecycle status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Actively worked on.
    #[default]
    Active,
    /// Temporarily on hold.
    Paused,
    /// Finished.
    Completed,
    /// Abandoned.
    Dropped,
}

/// Kind of content an attachment references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    /// Binary content transferred by the attachment synchronizer.
    File,
    /// External URL; nothing to transfer.
    Link,
}

/// Attachment metadata carried inline by tasks and projects.
///
/// Binary content is referenced by `uri` and transferred separately from
/// the structured snapshot; only [`AttachmentKind::File`] attachments have
/// transferable content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment id, also the blob key on every backend.
    pub id: String,
    /// What the attachment references.
    pub kind: AttachmentKind,
    /// Content location (relative blob name for files, URL for links).
    pub uri: String,
    /// Display title.
    pub title: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Attachment {
    /// Creates a file attachment.
    pub fn file(uri: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: AttachmentKind::File,
            uri: uri.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Creates a link attachment.
    pub fn link(uri: impl Into<String>, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            kind: AttachmentKind::Link,
            ..Self::file(uri, title, now)
        }
    }

    /// Returns true if the attachment is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Entity id.
    pub id: String,
    /// Task title.
    pub title: String,
    /// Workflow status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Priority label, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    /// Earliest start time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Owning project, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Section within the owning project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Markdown description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Attachments carried by the task.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Completion timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Creates a new inbox task.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            status: TaskStatus::Inbox,
            priority: None,
            start_time: None,
            due_date: None,
            project_id: None,
            section_id: None,
            tags: Vec::new(),
            description: None,
            attachments: Vec::new(),
            completed_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Marks the task deleted, retaining it as a tombstone.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

impl_syncable!(Task);

/// A project grouping tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Entity id.
    pub id: String,
    /// Project title.
    pub title: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: ProjectStatus,
    /// Display color.
    pub color: String,
    /// Owning area, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    /// Supporting notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub support_notes: Option<String>,
    /// Attachments carried by the project.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Creates a new active project.
    pub fn new(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            status: ProjectStatus::Active,
            color: "#6B7280".to_string(),
            area_id: None,
            support_notes: None,
            attachments: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Marks the project deleted, retaining it as a tombstone.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.deleted_at = Some(now);
        self.updated_at = now;
    }
}

impl_syncable!(Project);

/// A section partitioning a project's tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Entity id.
    pub id: String,
    /// Section title.
    pub title: String,
    /// Owning project.
    pub project_id: String,
    /// Sort position within the project.
    #[serde(default)]
    pub order: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Section {
    /// Creates a new section in a project.
    pub fn new(
        title: impl Into<String>,
        project_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            project_id: project_id.into(),
            order: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Section);

/// A life area grouping projects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    /// Entity id.
    pub id: String,
    /// Area name.
    pub name: String,
    /// Display color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Display icon.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Sort position.
    #[serde(default)]
    pub order: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Area {
    /// Creates a new area.
    pub fn new(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            color: None,
            icon: None,
            order: 0,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Area);

/// A single user setting, keyed by the setting name.
///
/// Settings sync like any other entity so preference changes propagate
/// between devices with the same conflict rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    /// Setting key (doubles as the entity id).
    pub id: String,
    /// Setting value.
    pub value: serde_json::Value,
    /// Last-mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Setting {
    /// Creates a setting with the given key and value.
    pub fn new(key: impl Into<String>, value: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: key.into(),
            value,
            updated_at: now,
            deleted_at: None,
        }
    }
}

impl_syncable!(Setting);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn task_roundtrips_with_camel_case_names() {
        let mut task = Task::new("Buy milk", t0());
        task.project_id = Some("p1".into());

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["projectId"], "p1");
        assert_eq!(json["createdAt"], "2024-01-01T00:00:00Z");
        assert!(json.get("deletedAt").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn tombstone_bumps_updated_at() {
        let mut task = Task::new("Buy milk", t0());
        let later = t0() + chrono::Duration::hours(1);
        task.mark_deleted(later);

        assert!(task.is_deleted());
        assert_eq!(task.updated_at(), later);
        assert_eq!(task.deleted_at(), Some(later));
    }

    #[test]
    fn missing_optional_fields_default() {
        let json = serde_json::json!({
            "id": "t1",
            "title": "Sparse",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-01T00:00:00Z",
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task.status, TaskStatus::Inbox);
        assert!(task.tags.is_empty());
        assert!(task.attachments.is_empty());
    }

    #[test]
    fn attachment_kinds() {
        let file = Attachment::file("receipt.pdf", "Receipt", t0());
        let link = Attachment::link("https://example.com", "Docs", t0());
        assert_eq!(file.kind, AttachmentKind::File);
        assert_eq!(link.kind, AttachmentKind::Link);
        assert_ne!(file.id, link.id);
    }
}
