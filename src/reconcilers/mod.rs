// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Sync handlers driven by the reconciliation runtime.

pub mod binding;
pub mod kconfig;
pub mod secret_gc;
pub mod workload;

pub use binding::BindingSync;
pub use kconfig::KconfigSync;
pub use secret_gc::SecretGcSync;
pub use workload::WorkloadSync;

use std::collections::BTreeMap;

/// Check a "true"-valued marker annotation
pub(crate) fn annotation_true(
    annotations: Option<&BTreeMap<String, String>>,
    key: &str,
) -> bool {
    annotations
        .and_then(|a| a.get(key))
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_true() {
        let annotations = BTreeMap::from([
            ("on".to_string(), "true".to_string()),
            ("mixed".to_string(), "True".to_string()),
            ("off".to_string(), "false".to_string()),
        ]);
        assert!(annotation_true(Some(&annotations), "on"));
        assert!(annotation_true(Some(&annotations), "mixed"));
        assert!(!annotation_true(Some(&annotations), "off"));
        assert!(!annotation_true(Some(&annotations), "absent"));
        assert!(!annotation_true(None, "on"));
    }
}
