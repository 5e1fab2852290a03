//! Property-based test generators using proptest.
//!
//! Strategies generate entities whose timestamps stay inside a small
//! window so three-way merges exercise every branch (unchanged, one-side,
//! both-sides) rather than degenerating to all-conflicts.

use chrono::{DateTime, TimeZone, Utc};
use mindwtr_core::{Snapshot, Task, TaskStatus};
use proptest::prelude::*;

/// Strategy for entity ids: short, collision-prone on purpose.
pub fn entity_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-f0-9]{4}").expect("invalid regex")
}

/// Strategy for timestamps within January 2024.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..31 * 24 * 60 * 60).prop_map(|offset| {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .expect("valid base timestamp")
            + chrono::Duration::seconds(offset)
    })
}

/// Strategy for task statuses.
pub fn task_status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Inbox),
        Just(TaskStatus::Next),
        Just(TaskStatus::Waiting),
        Just(TaskStatus::Someday),
        Just(TaskStatus::Done),
    ]
}

/// Strategy for tasks, optionally tombstoned.
pub fn task_strategy() -> impl Strategy<Value = Task> {
    (
        entity_id_strategy(),
        "[a-zA-Z ]{1,20}",
        task_status_strategy(),
        timestamp_strategy(),
        prop::option::of(timestamp_strategy()),
    )
        .prop_map(|(id, title, status, updated_at, deleted_at)| {
            let mut task = Task::new(
                title,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                    .single()
                    .expect("valid base timestamp"),
            );
            task.id = id;
            task.status = status;
            task.updated_at = updated_at;
            task.deleted_at = deleted_at;
            task
        })
}

/// Strategy for snapshots containing up to `max_tasks` tasks.
pub fn snapshot_strategy(max_tasks: usize) -> impl Strategy<Value = Snapshot> {
    prop::collection::vec(task_strategy(), 0..=max_tasks).prop_map(|tasks| {
        let mut snapshot = Snapshot::new();
        for task in tasks {
            snapshot.insert_task(task);
        }
        snapshot
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_snapshots_roundtrip_canonical_json(snapshot in snapshot_strategy(8)) {
            let bytes = snapshot.to_canonical_json();
            let back = Snapshot::from_json(&bytes).expect("canonical json parses");
            prop_assert_eq!(back, snapshot);
        }

        #[test]
        fn generated_ids_key_the_map(task in task_strategy()) {
            let mut snapshot = Snapshot::new();
            let id = task.id.clone();
            snapshot.insert_task(task);
            prop_assert!(snapshot.tasks.contains_key(&id));
        }
    }
}
