//! Three-way snapshot merge.
//!
//! Pure and synchronous: no I/O, deterministic for fixed inputs. The
//! orchestrator feeds it the local snapshot, the fetched remote snapshot,
//! and the persisted baseline (the snapshot last confirmed identical on
//! both sides) and applies the result.

use mindwtr_core::{CollectionName, Snapshot, StatsMap, Syncable, SyncStats};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged snapshot.
    pub merged: Snapshot,
    /// Per-collection statistics.
    pub stats: StatsMap,
}

/// Merges `local` and `remote` against the shared `baseline` ancestor.
///
/// Applied independently per collection and per entity id present in the
/// union of the three inputs:
/// - an id absent from the baseline and present on one side is a pure
///   addition;
/// - with a baseline entry, a side counts as changed iff its `updatedAt`
///   is later than the baseline's; an unopposed change wins without
///   conflict;
/// - both sides changed: field-for-field identical copies merge silently,
///   anything else is a conflict resolved by recency and counted.
///
/// Tombstones (`deletedAt` set) participate as ordinary field changes, so
/// a delete against a concurrent edit is a recency conflict like any
/// other. Entities are never hard-removed here; pruning tombstones is the
/// application's policy, not the merge engine's.
///
/// Never errors on well-formed input: missing collections behave as
/// empty maps.
pub fn merge(local: &Snapshot, remote: &Snapshot, baseline: &Snapshot) -> MergeOutcome {
    let mut merged = Snapshot::new();
    let mut stats = StatsMap::new();

    let (tasks, s) = merge_collection(&local.tasks, &remote.tasks, &baseline.tasks);
    merged.tasks = tasks;
    stats.insert(CollectionName::Tasks, s);

    let (projects, s) = merge_collection(&local.projects, &remote.projects, &baseline.projects);
    merged.projects = projects;
    stats.insert(CollectionName::Projects, s);

    let (sections, s) = merge_collection(&local.sections, &remote.sections, &baseline.sections);
    merged.sections = sections;
    stats.insert(CollectionName::Sections, s);

    let (areas, s) = merge_collection(&local.areas, &remote.areas, &baseline.areas);
    merged.areas = areas;
    stats.insert(CollectionName::Areas, s);

    let (settings, s) = merge_collection(&local.settings, &remote.settings, &baseline.settings);
    merged.settings = settings;
    stats.insert(CollectionName::Settings, s);

    MergeOutcome { merged, stats }
}

fn merge_collection<E>(
    local: &BTreeMap<String, E>,
    remote: &BTreeMap<String, E>,
    baseline: &BTreeMap<String, E>,
) -> (BTreeMap<String, E>, SyncStats)
where
    E: Syncable + Clone + PartialEq + Serialize,
{
    let mut merged = BTreeMap::new();
    let mut conflicts = 0u64;

    let ids: BTreeSet<&String> = local
        .keys()
        .chain(remote.keys())
        .chain(baseline.keys())
        .collect();

    for id in ids {
        let resolution = resolve(local.get(id), remote.get(id), baseline.get(id));
        match resolution {
            Resolution::Keep(entity) => {
                merged.insert(id.clone(), entity.clone());
            }
            Resolution::Conflict(winner) => {
                conflicts += 1;
                merged.insert(id.clone(), winner.clone());
            }
            Resolution::Gone => {}
        }
    }

    let stats = SyncStats {
        merged_total: merged.len() as u64,
        conflicts,
    };
    (merged, stats)
}

enum Resolution<'a, E> {
    Keep(&'a E),
    Conflict(&'a E),
    Gone,
}

fn resolve<'a, E>(
    local: Option<&'a E>,
    remote: Option<&'a E>,
    baseline: Option<&'a E>,
) -> Resolution<'a, E>
where
    E: Syncable + PartialEq + Serialize,
{
    match (local, remote) {
        // Present on one side only: a pure addition when the baseline
        // never saw it, otherwise the other side pruned it externally and
        // the surviving copy is kept.
        (Some(l), None) => Resolution::Keep(l),
        (None, Some(r)) => Resolution::Keep(r),
        // Absent everywhere but the baseline: both replicas pruned it.
        (None, None) => Resolution::Gone,
        (Some(l), Some(r)) => {
            if l == r {
                // Field-for-field identical, independent of how either
                // client serialized it.
                return Resolution::Keep(l);
            }
            let (local_changed, remote_changed) = match baseline {
                Some(b) => (
                    l.updated_at() > b.updated_at(),
                    r.updated_at() > b.updated_at(),
                ),
                // Concurrent creation under the same id counts as changed
                // on both sides.
                None => (true, true),
            };
            match (local_changed, remote_changed) {
                (true, true) => Resolution::Conflict(later_copy(l, r)),
                (true, false) => Resolution::Keep(l),
                (false, true) => Resolution::Keep(r),
                // Neither side changed since the baseline: keep the
                // baseline's copy.
                (false, false) => match baseline {
                    Some(b) => Resolution::Keep(b),
                    None => Resolution::Conflict(later_copy(l, r)),
                },
            }
        }
    }
}

/// Picks the copy with the later `updatedAt`; equal timestamps are broken
/// by comparing canonical JSON encodings so every replica resolves the
/// same way regardless of which side it calls local.
fn later_copy<'a, E: Syncable + Serialize>(l: &'a E, r: &'a E) -> &'a E {
    match l.updated_at().cmp(&r.updated_at()) {
        std::cmp::Ordering::Greater => l,
        std::cmp::Ordering::Less => r,
        std::cmp::Ordering::Equal => {
            let lj = serde_json::to_string(l).unwrap_or_default();
            let rj = serde_json::to_string(r).unwrap_or_default();
            if lj >= rj {
                l
            } else {
                r
            }
        }
    }
}
