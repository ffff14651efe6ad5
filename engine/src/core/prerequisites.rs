//! Session-scoped prerequisite failure tracking.
//!
//! When a prerequisite task fails, every task it lists in `pre_task_for` is
//! blocked for the rest of the session. The map only grows.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Split a comma-separated dependents list, trimming and dropping empties.
pub fn parse_pre_task_for(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

/// Failed prerequisite task id → dependents it invalidates.
///
/// Insertion order is kept so the first failing prerequisite is reported
/// when several block the same dependent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrerequisiteFailureMap {
    failures: IndexMap<String, Vec<String>>,
}

impl PrerequisiteFailureMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `dependents` as blocked by `prerequisite`.
    ///
    /// Re-registering a known pair is a no-op. Returns the dependents that
    /// were newly added.
    pub fn register_failure(&mut self, prerequisite: &str, dependents: &[String]) -> Vec<String> {
        if dependents.is_empty() {
            return Vec::new();
        }
        let entry = self.failures.entry(prerequisite.to_string()).or_default();
        let mut added = Vec::new();
        for dependent in dependents {
            if !entry.contains(dependent) {
                entry.push(dependent.clone());
                added.push(dependent.clone());
            }
        }
        added
    }

    /// The first failed prerequisite that blocks `task_id`, if any.
    pub fn blocking_prerequisite(&self, task_id: &str) -> Option<&str> {
        self.failures
            .iter()
            .find(|(_, dependents)| dependents.iter().any(|id| id == task_id))
            .map(|(prerequisite, _)| prerequisite.as_str())
    }

    pub fn dependents_of(&self, prerequisite: &str) -> Option<&[String]> {
        self.failures.get(prerequisite).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.failures
            .iter()
            .map(|(prerequisite, dependents)| (prerequisite.as_str(), dependents.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_messy_dependents_list() {
        assert_eq!(
            parse_pre_task_for("task1, , task2,  task3 ,,"),
            ids(&["task1", "task2", "task3"])
        );
        assert!(parse_pre_task_for("").is_empty());
        assert!(parse_pre_task_for(" , ,").is_empty());
    }

    #[test]
    fn blocks_registered_dependents_only() {
        let mut map = PrerequisiteFailureMap::new();
        map.register_failure("P", &ids(&["D1", "D2"]));
        assert_eq!(map.blocking_prerequisite("D1"), Some("P"));
        assert_eq!(map.blocking_prerequisite("D2"), Some("P"));
        assert_eq!(map.blocking_prerequisite("D3"), None);
        assert_eq!(map.blocking_prerequisite("P"), None);
    }

    /// Registering the same pair twice leaves the map unchanged.
    #[test]
    fn registration_is_idempotent() {
        let mut map = PrerequisiteFailureMap::new();
        assert_eq!(map.register_failure("P", &ids(&["D1", "D2"])), ids(&["D1", "D2"]));
        let snapshot = map.clone();
        assert!(map.register_failure("P", &ids(&["D2", "D1"])).is_empty());
        assert_eq!(map, snapshot);
        assert_eq!(map.dependents_of("P"), Some(ids(&["D1", "D2"]).as_slice()));
    }

    #[test]
    fn empty_dependents_do_not_create_entries() {
        let mut map = PrerequisiteFailureMap::new();
        map.register_failure("P", &[]);
        assert!(map.is_empty());
    }

    #[test]
    fn first_registered_prerequisite_is_reported() {
        let mut map = PrerequisiteFailureMap::new();
        map.register_failure("P1", &ids(&["D"]));
        map.register_failure("P2", &ids(&["D"]));
        assert_eq!(map.blocking_prerequisite("D"), Some("P1"));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn serializes_as_plain_object() {
        let mut map = PrerequisiteFailureMap::new();
        map.register_failure("P", &ids(&["D1"]));
        let json = serde_json::to_string(&map).expect("serialize");
        assert_eq!(json, r#"{"P":["D1"]}"#);
        let back: PrerequisiteFailureMap = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, map);
    }
}
