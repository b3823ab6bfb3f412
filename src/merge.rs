// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Folds every source's contribution to a binding into one ordered env list
//! and a change fingerprint.

use k8s_openapi::api::core::v1::EnvVar;
use std::collections::BTreeMap;

use crate::types::KconfigEnvs;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedEnv {
    pub envs: Vec<EnvVar>,
    /// Concatenated envRefsVersion of every contributing source, in merge
    /// order. A change here forces a pod-template update even when the env
    /// list itself is byte-identical, which is what propagates content-only
    /// changes behind existing references.
    pub fingerprint: String,
}

/// Merge all contributions, ordered ascending by level. The sort is stable
/// and the map iterates in source-identity order, so equal levels resolve
/// deterministically. Duplicate variable names are not deduplicated; the
/// highest-level occurrence is appended last.
pub fn merge_env_sets(map: &BTreeMap<String, KconfigEnvs>) -> MergedEnv {
    let mut sets: Vec<&KconfigEnvs> = map.values().collect();
    sets.sort_by_key(|set| set.level);

    let mut merged = MergedEnv::default();
    for set in sets {
        merged
            .fingerprint
            .push_str(&set.env_refs_version.to_string());
        merged.envs.extend(set.envs.iter().cloned());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_env(name: &str, value: &str) -> EnvVar {
        EnvVar {
            name: name.to_string(),
            value: Some(value.to_string()),
            value_from: None,
        }
    }

    fn make_set(level: i32, version: i64, envs: Vec<EnvVar>) -> KconfigEnvs {
        KconfigEnvs {
            level,
            env_refs_version: version,
            envs,
            selector: None,
            container_selector: None,
        }
    }

    #[test]
    fn test_merge_orders_by_level() {
        let map = BTreeMap::from([
            ("team-a/third".to_string(), make_set(2, 0, vec![make_env("C", "3")])),
            ("team-a/first".to_string(), make_set(0, 0, vec![make_env("A", "1")])),
            ("team-a/second".to_string(), make_set(1, 0, vec![make_env("B", "2")])),
        ]);
        let merged = merge_env_sets(&map);
        let names: Vec<&str> = merged.envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_merge_is_deterministic_across_equal_levels() {
        let map = BTreeMap::from([
            ("team-a/beta".to_string(), make_set(1, 0, vec![make_env("B", "2")])),
            ("team-a/alpha".to_string(), make_set(1, 0, vec![make_env("A", "1")])),
        ]);
        let first = merge_env_sets(&map);
        let second = merge_env_sets(&map);
        assert_eq!(first, second);
        // Ties break on source identity because the map iterates sorted
        let names: Vec<&str> = first.envs.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_fingerprint_concatenates_versions_in_merge_order() {
        let map = BTreeMap::from([
            ("team-a/high".to_string(), make_set(10, 7, vec![])),
            ("team-a/low".to_string(), make_set(0, 42, vec![])),
        ]);
        let merged = merge_env_sets(&map);
        assert_eq!(merged.fingerprint, "427");
    }

    #[test]
    fn test_fingerprint_changes_without_env_changes() {
        let mut map = BTreeMap::from([(
            "team-a/db".to_string(),
            make_set(0, 1, vec![make_env("A", "1")]),
        )]);
        let before = merge_env_sets(&map);

        // A content-only change behind a reference bumps only the version
        map.get_mut("team-a/db").unwrap().env_refs_version = 2;
        let after = merge_env_sets(&map);

        assert_eq!(before.envs, after.envs);
        assert_ne!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_duplicate_names_are_not_deduplicated() {
        let map = BTreeMap::from([
            ("team-a/base".to_string(), make_set(0, 0, vec![make_env("HOST", "base")])),
            ("team-a/override".to_string(), make_set(5, 0, vec![make_env("HOST", "override")])),
        ]);
        let merged = merge_env_sets(&map);
        assert_eq!(merged.envs.len(), 2);
        // The higher-level occurrence is last, which is what consumers observe
        assert_eq!(merged.envs[1].value.as_deref(), Some("override"));
    }

    #[test]
    fn test_empty_map_merges_to_empty() {
        let merged = merge_env_sets(&BTreeMap::new());
        assert!(merged.envs.is_empty());
        assert!(merged.fingerprint.is_empty());
    }
}
