//! Desired-vs-actual reconciliation.

use std::collections::BTreeSet;

/// Difference between the member addresses and the existing rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncDiff {
    /// Addresses of active members.
    pub desired: BTreeSet<String>,
    /// Addresses currently forwarded to.
    pub actual: BTreeSet<String>,
    /// Desired but without a rule.
    pub to_add: BTreeSet<String>,
    /// Forwarded to but no longer desired.
    pub to_remove: BTreeSet<String>,
    /// Present on both sides.
    pub unchanged: BTreeSet<String>,
}

impl SyncDiff {
    pub fn has_changes(&self) -> bool {
        !self.to_add.is_empty() || !self.to_remove.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} to add, {} to remove, {} unchanged ({} members, {} rules)",
            self.to_add.len(),
            self.to_remove.len(),
            self.unchanged.len(),
            self.desired.len(),
            self.actual.len()
        )
    }
}

/// Compute what to add and remove so that `actual` becomes `desired`.
pub fn diff(desired: BTreeSet<String>, actual: BTreeSet<String>) -> SyncDiff {
    let to_add = desired.difference(&actual).cloned().collect();
    let to_remove = actual.difference(&desired).cloned().collect();
    let unchanged = desired.intersection(&actual).cloned().collect();
    SyncDiff {
        desired,
        actual,
        to_add,
        to_remove,
        unchanged,
    }
}
