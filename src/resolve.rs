// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-source resolution of declared configuration entries into concrete
//! environment variables, normalized entries, and pending external writes.

use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, EnvVar, EnvVarSource, SecretKeySelector,
};

use crate::external::{ExternalKind, ExternalWrite};
use crate::types::{EnvConfig, EnvEntry};

/// Resolution result for one source's entries. `env_configs` is the
/// normalized list written back to the Kconfig, `env_vars` the concrete
/// variables fanned out to bindings, `writes` the external material still to
/// be persisted, and `warnings` the entries dropped by validation.
#[derive(Debug, Default, Clone)]
pub struct ResolveOutcome {
    pub env_configs: Vec<EnvConfig>,
    pub env_vars: Vec<EnvVar>,
    pub writes: Vec<ExternalWrite>,
    pub warnings: Vec<String>,
}

pub struct ResolveContext<'a> {
    pub source_name: &'a str,
    pub configmap_prefix: &'a str,
    pub secret_prefix: &'a str,
}

impl ResolveContext<'_> {
    fn configmap_name(&self, override_name: Option<String>) -> String {
        override_name.unwrap_or_else(|| format!("{}{}", self.configmap_prefix, self.source_name))
    }

    fn secret_name(&self, override_name: Option<String>) -> String {
        override_name.unwrap_or_else(|| format!("{}{}", self.secret_prefix, self.source_name))
    }
}

/// Normalize an env key into the key used inside the backing resource:
/// lowercase, alphanumeric only
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

/// Resolve a source's entries. Invalid entries are dropped with a warning;
/// they never fail the pass.
pub fn resolve_env_configs(env_configs: &[EnvConfig], ctx: &ResolveContext<'_>) -> ResolveOutcome {
    let mut outcome = ResolveOutcome::default();
    for config in env_configs {
        let entry = match EnvEntry::try_from(config) {
            Ok(entry) => entry,
            Err(err) => {
                outcome.warnings.push(format!(
                    "dropping envConfig '{}': {}",
                    config.key, err
                ));
                continue;
            }
        };
        match entry {
            EnvEntry::Value { key, value } => {
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: Some(value.clone()),
                    value_from: None,
                });
                outcome.env_configs.push(EnvConfig::value(&key, &value));
            }
            EnvEntry::ConfigMapRef { key, reference } => {
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        config_map_key_ref: Some(reference.clone()),
                        ..Default::default()
                    }),
                });
                outcome
                    .env_configs
                    .push(EnvConfig::config_map_ref(&key, reference));
            }
            EnvEntry::ConfigMapLiteral {
                key,
                value,
                ref_name,
            } => {
                let target = ctx.configmap_name(ref_name);
                let ref_key = normalize_key(&key);
                if ref_key.is_empty() {
                    outcome.warnings.push(format!(
                        "dropping envConfig '{}': key normalizes to an empty reference",
                        key
                    ));
                    continue;
                }
                outcome.writes.push(ExternalWrite {
                    kind: ExternalKind::ConfigMap,
                    name: target.clone(),
                    key: ref_key.clone(),
                    value,
                });
                let reference = ConfigMapKeySelector {
                    name: target,
                    key: ref_key,
                    // Tolerate the reference landing before the write does
                    optional: Some(true),
                };
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        config_map_key_ref: Some(reference.clone()),
                        ..Default::default()
                    }),
                });
                outcome
                    .env_configs
                    .push(EnvConfig::config_map_ref(&key, reference));
            }
            EnvEntry::SecretRef { key, reference } => {
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(reference.clone()),
                        ..Default::default()
                    }),
                });
                outcome
                    .env_configs
                    .push(EnvConfig::secret_ref(&key, reference));
            }
            EnvEntry::SecretLiteral {
                key,
                value,
                ref_name,
            } => {
                let target = ctx.secret_name(ref_name);
                let ref_key = normalize_key(&key);
                if ref_key.is_empty() {
                    outcome.warnings.push(format!(
                        "dropping envConfig '{}': key normalizes to an empty reference",
                        key
                    ));
                    continue;
                }
                outcome.writes.push(ExternalWrite {
                    kind: ExternalKind::Secret,
                    name: target.clone(),
                    key: ref_key.clone(),
                    value,
                });
                let reference = SecretKeySelector {
                    name: target,
                    key: ref_key,
                    optional: Some(true),
                };
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(reference.clone()),
                        ..Default::default()
                    }),
                });
                outcome
                    .env_configs
                    .push(EnvConfig::secret_ref(&key, reference));
            }
            EnvEntry::FieldRef { key, selector } => {
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        field_ref: Some(selector.clone()),
                        ..Default::default()
                    }),
                });
                outcome.env_configs.push(EnvConfig::field_ref(&key, selector));
            }
            EnvEntry::ResourceFieldRef { key, selector } => {
                outcome.env_vars.push(EnvVar {
                    name: key.clone(),
                    value: None,
                    value_from: Some(EnvVarSource {
                        resource_field_ref: Some(selector.clone()),
                        ..Default::default()
                    }),
                });
                outcome
                    .env_configs
                    .push(EnvConfig::resource_field_ref(&key, selector));
            }
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::SecretKeySelector;

    fn make_ctx() -> ResolveContext<'static> {
        ResolveContext {
            source_name: "db-config",
            configmap_prefix: "kc-",
            secret_prefix: "ks-",
        }
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("DB_HOST"), "dbhost");
        assert_eq!(normalize_key("db.host-1"), "dbhost1");
        assert_eq!(normalize_key("___"), "");
    }

    #[test]
    fn test_value_passes_through() {
        let outcome = resolve_env_configs(&[EnvConfig::value("DB_HOST", "db.internal")], &make_ctx());
        assert!(outcome.writes.is_empty());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.env_vars.len(), 1);
        assert_eq!(outcome.env_vars[0].name, "DB_HOST");
        assert_eq!(outcome.env_vars[0].value.as_deref(), Some("db.internal"));
        assert_eq!(outcome.env_configs, vec![EnvConfig::value("DB_HOST", "db.internal")]);
    }

    #[test]
    fn test_configmap_literal_materializes() {
        let config = EnvConfig {
            r#type: "ConfigMap".to_string(),
            key: "DB_HOST".to_string(),
            value: Some("db.internal".to_string()),
            ..Default::default()
        };
        let outcome = resolve_env_configs(&[config], &make_ctx());

        assert_eq!(outcome.writes.len(), 1);
        assert_eq!(outcome.writes[0].kind, ExternalKind::ConfigMap);
        assert_eq!(outcome.writes[0].name, "kc-db-config");
        assert_eq!(outcome.writes[0].key, "dbhost");
        assert_eq!(outcome.writes[0].value, "db.internal");

        // The normalized entry carries the reference and no literal
        let normalized = &outcome.env_configs[0];
        assert!(normalized.value.is_none());
        let reference = normalized.config_map_key_ref.as_ref().unwrap();
        assert_eq!(reference.name, "kc-db-config");
        assert_eq!(reference.key, "dbhost");
        assert_eq!(reference.optional, Some(true));

        // The env var points at the allocated key
        let source = outcome.env_vars[0].value_from.as_ref().unwrap();
        assert_eq!(
            source.config_map_key_ref.as_ref().unwrap().key,
            "dbhost"
        );
    }

    #[test]
    fn test_secret_literal_honors_ref_name_override() {
        let config = EnvConfig {
            r#type: "Secret".to_string(),
            key: "DB_PASSWORD".to_string(),
            value: Some("hunter2".to_string()),
            ref_name: Some("shared-secrets".to_string()),
            ..Default::default()
        };
        let outcome = resolve_env_configs(&[config], &make_ctx());
        assert_eq!(outcome.writes[0].name, "shared-secrets");
        assert_eq!(
            outcome.env_configs[0]
                .secret_key_ref
                .as_ref()
                .unwrap()
                .name,
            "shared-secrets"
        );
    }

    #[test]
    fn test_resolved_reference_is_a_noop_pass_through() {
        let reference = SecretKeySelector {
            name: "ks-db-config".to_string(),
            key: "dbpassword".to_string(),
            optional: Some(true),
        };
        let config = EnvConfig::secret_ref("DB_PASSWORD", reference);
        let outcome = resolve_env_configs(&[config.clone()], &make_ctx());
        assert!(outcome.writes.is_empty());
        assert_eq!(outcome.env_configs, vec![config]);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        // Resolving the already-normalized output again yields the same
        // entries and no further writes
        let config = EnvConfig {
            r#type: "Secret".to_string(),
            key: "DB_PASSWORD".to_string(),
            value: Some("hunter2".to_string()),
            ..Default::default()
        };
        let first = resolve_env_configs(&[config], &make_ctx());
        assert_eq!(first.writes.len(), 1);

        let second = resolve_env_configs(&first.env_configs, &make_ctx());
        assert!(second.writes.is_empty());
        assert_eq!(second.env_configs, first.env_configs);
        assert_eq!(second.env_vars, first.env_vars);
    }

    #[test]
    fn test_invalid_entry_is_dropped_with_warning_rest_resolve() {
        let invalid = EnvConfig {
            r#type: "Value".to_string(),
            key: "DB_PASSWORD".to_string(),
            value: Some("hunter2".to_string()),
            secret_key_ref: Some(SecretKeySelector {
                name: "ks-db-config".to_string(),
                key: "dbpassword".to_string(),
                optional: None,
            }),
            ..Default::default()
        };
        let valid = EnvConfig::value("DB_HOST", "db.internal");
        let outcome = resolve_env_configs(&[invalid, valid], &make_ctx());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.env_vars.len(), 1);
        assert_eq!(outcome.env_vars[0].name, "DB_HOST");
    }

    #[test]
    fn test_field_ref_value_synthesizes_reference() {
        let config = EnvConfig {
            r#type: "FieldRef".to_string(),
            key: "POD_IP".to_string(),
            value: Some("status.podIP".to_string()),
            ..Default::default()
        };
        let outcome = resolve_env_configs(&[config], &make_ctx());
        assert!(outcome.writes.is_empty());
        let normalized = &outcome.env_configs[0];
        assert!(normalized.value.is_none());
        assert_eq!(
            normalized.field_ref.as_ref().unwrap().field_path,
            "status.podIP"
        );
    }

    #[test]
    fn test_unnormalizable_key_is_dropped() {
        let config = EnvConfig {
            r#type: "ConfigMap".to_string(),
            key: "___".to_string(),
            value: Some("x".to_string()),
            ..Default::default()
        };
        let outcome = resolve_env_configs(&[config], &make_ctx());
        assert!(outcome.env_configs.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
    }
}
