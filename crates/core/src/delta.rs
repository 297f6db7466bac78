//! Set/map differences between reconciliation snapshots. Both operations are
//! pure and order-independent; a corrupt or missing previous snapshot is the
//! caller's empty value, which makes everything look new — the safe default.

use std::collections::{BTreeMap, HashSet};

/// Elements of `current` not present in `previous`. Used on the raw
/// user-input list to detect that anything new was said at all.
pub fn list_additions(previous: &[String], current: &[String]) -> Vec<String> {
    let seen: HashSet<&str> = previous.iter().map(String::as_str).collect();
    let mut additions = Vec::new();
    let mut emitted: HashSet<&str> = HashSet::new();
    for item in current {
        if !seen.contains(item.as_str()) && emitted.insert(item.as_str()) {
            additions.push(item.clone());
        }
    }
    additions
}

/// Entries of `current` whose value differs from `previous`, or whose key is
/// absent there. Used on the CRM field map to detect a material change.
pub fn changed_entries(
    previous: &BTreeMap<String, String>,
    current: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    current
        .iter()
        .filter(|(key, value)| previous.get(*key) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
