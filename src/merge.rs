//! Merge Engine
//!
//! Combines a source and a target [`EntryCollection`] under a
//! [`MergePolicy`]. Merging never blocks on input: conflicts are reported
//! and resolutions are applied in a separate step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entry::{Entry, EntryCollection};

/// How source entries are combined with the target's
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Target becomes an exact copy of the source
    Replace,
    /// Add source entries the target lacks; never overwrite
    Merge,
    /// Like `Merge`, but report same-named entries whose content differs
    #[default]
    Smart,
}

impl MergePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergePolicy::Replace => "replace",
            MergePolicy::Merge => "merge",
            MergePolicy::Smart => "smart",
        }
    }
}

impl fmt::Display for MergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "replace" => Ok(MergePolicy::Replace),
            "merge" => Ok(MergePolicy::Merge),
            "smart" => Ok(MergePolicy::Smart),
            other => Err(format!(
                "unknown merge policy '{other}' (expected replace, merge or smart)"
            )),
        }
    }
}

/// A name present on both sides with differing content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub name: String,
    pub source: Entry,
    pub target: Entry,
}

/// Which side of a conflict wins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Choice {
    Source,
    Target,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Choice::Source => "source",
            Choice::Target => "target",
        })
    }
}

/// Decision for one conflict
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub name: String,
    pub choice: Choice,
}

impl Resolution {
    pub fn new(name: impl Into<String>, choice: Choice) -> Self {
        Self {
            name: name.into(),
            choice,
        }
    }
}

/// Result of combining two collections
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Combined collection; conflicting names hold the target's value
    pub merged: EntryCollection,
    /// Content conflicts (smart policy only)
    pub conflicts: Vec<Conflict>,
    /// Source entries newly added to the target
    pub added: Vec<String>,
    /// Differing collisions silently kept from the target (merge policy)
    pub kept_target: Vec<String>,
}

impl MergeOutcome {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn conflict_names(&self) -> Vec<String> {
        self.conflicts.iter().map(|c| c.name.clone()).collect()
    }

    /// Apply resolutions and return the final collection
    pub fn resolve(mut self, resolutions: &[Resolution]) -> EntryCollection {
        let sources: EntryCollection = self
            .conflicts
            .iter()
            .map(|c| (c.name.clone(), c.source.clone()))
            .collect();
        apply_resolutions(&mut self.merged, &sources, resolutions);
        self.merged
    }
}

/// Combine `source` into `target` under `policy`
pub fn merge(source: &EntryCollection, target: &EntryCollection, policy: MergePolicy) -> MergeOutcome {
    if policy == MergePolicy::Replace {
        return MergeOutcome {
            merged: source.clone(),
            added: source
                .names()
                .filter(|name| !target.contains(name))
                .cloned()
                .collect(),
            ..Default::default()
        };
    }

    let mut outcome = MergeOutcome {
        merged: target.clone(),
        ..Default::default()
    };

    for (name, source_entry) in source {
        match target.get(name) {
            None => {
                outcome.merged.insert(name.clone(), source_entry.clone());
                outcome.added.push(name.clone());
            }
            Some(target_entry) if target_entry == source_entry => {}
            Some(target_entry) => match policy {
                MergePolicy::Smart => outcome.conflicts.push(Conflict {
                    name: name.clone(),
                    source: source_entry.clone(),
                    target: target_entry.clone(),
                }),
                _ => {
                    tracing::warn!(
                        entry = %name,
                        "Entry differs between source and target, keeping target"
                    );
                    outcome.kept_target.push(name.clone());
                }
            },
        }
    }

    outcome
}

/// Overwrite `merged` with source values where a resolution chose the source.
///
/// Names without a resolution, or resolved to the target, are left as they
/// are. Returns how many entries were taken from the source.
pub fn apply_resolutions(
    merged: &mut EntryCollection,
    source: &EntryCollection,
    resolutions: &[Resolution],
) -> usize {
    let mut applied = 0;
    for resolution in resolutions {
        if resolution.choice != Choice::Source {
            continue;
        }
        match source.get(&resolution.name) {
            Some(entry) => {
                merged.insert(resolution.name.clone(), entry.clone());
                applied += 1;
            }
            None => tracing::warn!(
                entry = %resolution.name,
                "Resolution names an entry the source does not have"
            ),
        }
    }
    applied
}
