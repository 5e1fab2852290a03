//! Per-collection sync statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Names of the synchronized collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionName {
    /// The tasks collection.
    Tasks,
    /// The projects collection.
    Projects,
    /// The sections collection.
    Sections,
    /// The areas collection.
    Areas,
    /// The settings collection.
    Settings,
}

impl CollectionName {
    /// All collections, in canonical order.
    pub const ALL: [CollectionName; 5] = [
        CollectionName::Tasks,
        CollectionName::Projects,
        CollectionName::Sections,
        CollectionName::Areas,
        CollectionName::Settings,
    ];

    /// Returns the collection name as it appears in the snapshot document.
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::Tasks => "tasks",
            CollectionName::Projects => "projects",
            CollectionName::Sections => "sections",
            CollectionName::Areas => "areas",
            CollectionName::Settings => "settings",
        }
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a completed sync cycle, as surfaced to the user.
///
/// `Conflict` is not a failure: data was merged and pushed, but at least
/// one entity needed recency-based resolution. The absent value ("null")
/// is represented as `Option::<SyncOutcome>::None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Clean merge, nothing to flag.
    Success,
    /// Merge succeeded but resolved at least one conflict.
    Conflict,
    /// The cycle failed with a reportable error.
    Error,
}

/// Statistics for one collection after a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// Number of entities present in the merged collection.
    pub merged_total: u64,
    /// Number of entities resolved through the conflict branch.
    pub conflicts: u64,
}

/// Statistics for all collections, keyed by collection name.
pub type StatsMap = BTreeMap<CollectionName, SyncStats>;

/// Sums the conflict counters across all collections.
pub fn conflict_count(stats: &StatsMap) -> u64 {
    stats.values().map(|s| s.conflicts).sum()
}
