// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Label selector evaluation shared by the controllers and the admission injector.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use std::collections::BTreeMap;

use crate::error::{KconfigError, Result};

/// Evaluate a label selector against a label map.
///
/// An empty selector matches everything, mirroring the apimachinery
/// `LabelSelectorAsSelector` convention. A malformed requirement (unknown
/// operator, `In`/`NotIn` without values) is an error so the caller can
/// abort its pass before mutating anything.
pub fn matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> Result<bool> {
    if let Some(match_labels) = &selector.match_labels {
        for (key, value) in match_labels {
            if labels.get(key) != Some(value) {
                return Ok(false);
            }
        }
    }
    if let Some(expressions) = &selector.match_expressions {
        for requirement in expressions {
            if !matches_requirement(requirement, labels)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn matches_requirement(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> Result<bool> {
    let value = labels.get(&requirement.key);
    match requirement.operator.as_str() {
        "In" => {
            let values = requirement.values.as_ref().filter(|v| !v.is_empty()).ok_or_else(|| {
                KconfigError::SelectorError(format!(
                    "In requirement on {} must have values",
                    requirement.key
                ))
            })?;
            Ok(value.is_some_and(|v| values.contains(v)))
        }
        "NotIn" => {
            let values = requirement.values.as_ref().filter(|v| !v.is_empty()).ok_or_else(|| {
                KconfigError::SelectorError(format!(
                    "NotIn requirement on {} must have values",
                    requirement.key
                ))
            })?;
            Ok(!value.is_some_and(|v| values.contains(v)))
        }
        "Exists" => Ok(value.is_some()),
        "DoesNotExist" => Ok(value.is_none()),
        other => Err(KconfigError::SelectorError(format!(
            "unknown selector operator: {}",
            other
        ))),
    }
}

/// Check a selector for malformed requirements without evaluating it.
/// Reconcilers call this before mutating anything so a bad selector aborts
/// the whole pass.
pub fn validate(selector: &LabelSelector) -> Result<()> {
    if let Some(expressions) = &selector.match_expressions {
        let empty = BTreeMap::new();
        for requirement in expressions {
            matches_requirement(requirement, &empty)?;
        }
    }
    Ok(())
}

/// Evaluate a container selector against a container name.
///
/// Containers are matched on the synthetic label set `{name: <container>}`.
/// `None` matches every container.
pub fn container_matches(selector: Option<&LabelSelector>, container_name: &str) -> Result<bool> {
    let Some(selector) = selector else {
        return Ok(true);
    };
    let labels = BTreeMap::from([("name".to_string(), container_name.to_string())]);
    matches(selector, &labels)
}

/// Parse a `key=value,key2=value2` string into an equality-based selector
pub fn parse_selector_string(raw: &str) -> Result<LabelSelector> {
    let mut match_labels = BTreeMap::new();
    for pair in raw.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return Err(KconfigError::SelectorError(format!(
                "expected key=value, got '{}'",
                pair
            )));
        };
        match_labels.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(LabelSelector {
        match_labels: Some(match_labels),
        match_expressions: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn make_selector(pairs: &[(&str, &str)]) -> LabelSelector {
        LabelSelector {
            match_labels: Some(make_labels(pairs)),
            match_expressions: None,
        }
    }

    fn make_requirement(key: &str, operator: &str, values: Option<Vec<&str>>) -> LabelSelector {
        LabelSelector {
            match_labels: None,
            match_expressions: Some(vec![LabelSelectorRequirement {
                key: key.to_string(),
                operator: operator.to_string(),
                values: values.map(|v| v.iter().map(|s| s.to_string()).collect()),
            }]),
        }
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = LabelSelector::default();
        assert!(matches(&selector, &make_labels(&[("app", "web")])).unwrap());
        assert!(matches(&selector, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_match_labels_equality() {
        let selector = make_selector(&[("app", "web")]);
        assert!(matches(&selector, &make_labels(&[("app", "web"), ("tier", "front")])).unwrap());
        assert!(!matches(&selector, &make_labels(&[("app", "api")])).unwrap());
        assert!(!matches(&selector, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_match_expressions_in() {
        let selector = make_requirement("tier", "In", Some(vec!["front", "edge"]));
        assert!(matches(&selector, &make_labels(&[("tier", "front")])).unwrap());
        assert!(!matches(&selector, &make_labels(&[("tier", "back")])).unwrap());
        assert!(!matches(&selector, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_match_expressions_not_in() {
        let selector = make_requirement("tier", "NotIn", Some(vec!["back"]));
        assert!(matches(&selector, &make_labels(&[("tier", "front")])).unwrap());
        assert!(matches(&selector, &BTreeMap::new()).unwrap());
        assert!(!matches(&selector, &make_labels(&[("tier", "back")])).unwrap());
    }

    #[test]
    fn test_match_expressions_exists() {
        let selector = make_requirement("tier", "Exists", None);
        assert!(matches(&selector, &make_labels(&[("tier", "anything")])).unwrap());
        assert!(!matches(&selector, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_match_expressions_does_not_exist() {
        let selector = make_requirement("tier", "DoesNotExist", None);
        assert!(!matches(&selector, &make_labels(&[("tier", "anything")])).unwrap());
        assert!(matches(&selector, &BTreeMap::new()).unwrap());
    }

    #[test]
    fn test_unknown_operator_is_an_error() {
        let selector = make_requirement("tier", "Near", None);
        assert!(matches(&selector, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_in_without_values_is_an_error() {
        let selector = make_requirement("tier", "In", None);
        assert!(matches(&selector, &BTreeMap::new()).is_err());
    }

    #[test]
    fn test_validate_accepts_well_formed_selectors() {
        assert!(validate(&LabelSelector::default()).is_ok());
        assert!(validate(&make_selector(&[("app", "web")])).is_ok());
        assert!(validate(&make_requirement("tier", "In", Some(vec!["front"]))).is_ok());
    }

    #[test]
    fn test_validate_rejects_malformed_selectors() {
        assert!(validate(&make_requirement("tier", "Near", None)).is_err());
        assert!(validate(&make_requirement("tier", "In", None)).is_err());
    }

    #[test]
    fn test_container_matches_without_selector() {
        assert!(container_matches(None, "app").unwrap());
    }

    #[test]
    fn test_container_matches_by_name_label() {
        let selector = make_selector(&[("name", "app")]);
        assert!(container_matches(Some(&selector), "app").unwrap());
        assert!(!container_matches(Some(&selector), "sidecar").unwrap());
    }

    #[test]
    fn test_parse_selector_string() {
        let selector = parse_selector_string("name=app, tier=front").unwrap();
        let labels = selector.match_labels.unwrap();
        assert_eq!(labels.get("name").unwrap(), "app");
        assert_eq!(labels.get("tier").unwrap(), "front");
    }

    #[test]
    fn test_parse_selector_string_rejects_garbage() {
        assert!(parse_selector_string("no-equals-sign").is_err());
    }
}
