//! Entity and snapshot fixtures.
//!
//! Fixtures use fixed timestamps so tests stay deterministic; `timestamp(n)`
//! yields midnight UTC of the n-th of January 2024.

use chrono::{DateTime, TimeZone, Utc};
use mindwtr_core::{Area, Project, Section, Setting, Snapshot, Task};

/// Returns a fixed timestamp: 2024-01-`day` 00:00:00 UTC.
pub fn timestamp(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0)
        .single()
        .expect("fixture day out of range")
}

/// Builds a task with a chosen id and update time.
pub fn task(id: &str, title: &str, updated: DateTime<Utc>) -> Task {
    let mut task = Task::new(title, timestamp(1));
    task.id = id.to_string();
    task.updated_at = updated;
    task
}

/// Builds a tombstoned task.
pub fn deleted_task(id: &str, title: &str, deleted: DateTime<Utc>) -> Task {
    let mut task = task(id, title, deleted);
    task.deleted_at = Some(deleted);
    task
}

/// Builds a project with a chosen id and update time.
pub fn project(id: &str, title: &str, updated: DateTime<Utc>) -> Project {
    let mut project = Project::new(title, timestamp(1));
    project.id = id.to_string();
    project.updated_at = updated;
    project
}

/// Builds a section with a chosen id.
pub fn section(id: &str, title: &str, project_id: &str, updated: DateTime<Utc>) -> Section {
    let mut section = Section::new(title, project_id, timestamp(1));
    section.id = id.to_string();
    section.updated_at = updated;
    section
}

/// Builds an area with a chosen id.
pub fn area(id: &str, name: &str, updated: DateTime<Utc>) -> Area {
    let mut area = Area::new(name, timestamp(1));
    area.id = id.to_string();
    area.updated_at = updated;
    area
}

/// Builds a setting entry.
pub fn setting(key: &str, value: serde_json::Value, updated: DateTime<Utc>) -> Setting {
    Setting::new(key, value, updated)
}

/// Fluent snapshot construction for tests.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: Snapshot,
}

impl SnapshotBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task.
    pub fn task(mut self, task: Task) -> Self {
        self.snapshot.insert_task(task);
        self
    }

    /// Adds a project.
    pub fn project(mut self, project: Project) -> Self {
        self.snapshot.insert_project(project);
        self
    }

    /// Adds a section.
    pub fn section(mut self, section: Section) -> Self {
        self.snapshot
            .sections
            .insert(section.id.clone(), section);
        self
    }

    /// Adds an area.
    pub fn area(mut self, area: Area) -> Self {
        self.snapshot.areas.insert(area.id.clone(), area);
        self
    }

    /// Adds a setting.
    pub fn setting(mut self, setting: Setting) -> Self {
        self.snapshot
            .settings
            .insert(setting.id.clone(), setting);
        self
    }

    /// Returns the built snapshot.
    pub fn build(self) -> Snapshot {
        self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keys_by_id() {
        let snapshot = SnapshotBuilder::new()
            .task(task("t1", "one", timestamp(1)))
            .task(task("t2", "two", timestamp(2)))
            .project(project("p1", "proj", timestamp(1)))
            .build();

        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks["t2"].title, "two");
        assert_eq!(snapshot.projects["p1"].title, "proj");
    }

    #[test]
    fn deleted_task_is_tombstoned() {
        let task = deleted_task("t1", "gone", timestamp(3));
        assert_eq!(task.deleted_at, Some(timestamp(3)));
    }
}
