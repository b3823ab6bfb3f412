// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The Kconfig resource: a prioritized set of environment configuration
//! entries targeting workload bindings by label selector.

use k8s_openapi::api::core::v1::{
    ConfigMapKeySelector, ObjectFieldSelector, ResourceFieldSelector, SecretKeySelector,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::{CustomResource, ResourceExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "kconfig.dev", version = "v1beta1", kind = "Kconfig")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
#[serde(rename_all = "camelCase")]
pub struct KconfigSpec {
    /// Priority of this source; lower levels sort first in merges
    #[serde(default)]
    pub level: i32,
    /// Selects the bindings this source contributes to, by label
    #[serde(default)]
    pub selector: LabelSelector,
    /// Selects the containers injected at admission time; None means every container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_selector: Option<LabelSelector>,
    #[serde(default)]
    pub env_configs: Vec<EnvConfig>,
    /// Bumped whenever a literal value is materialized into an external reference
    #[serde(default)]
    pub env_refs_version: i64,
}

impl Kconfig {
    /// The key under which this source's contribution is stored in binding maps
    pub fn env_key(&self) -> String {
        format!("{}/{}", self.namespace().unwrap_or_default(), self.name_any())
    }
}

/// A single environment variable configuration as persisted on the Kconfig.
///
/// This is the wire form: `type` discriminates, and only the fields relevant
/// to the type may be populated. Controllers never dispatch on it directly;
/// they classify it into an [`EnvEntry`] first.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvConfig {
    /// One of Value (default when empty), ConfigMap, Secret, FieldRef,
    /// ResourceFieldRef; matched case-insensitively
    #[serde(default)]
    pub r#type: String,
    /// The environment variable name
    #[serde(default)]
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Overrides the generated name of the backing ConfigMap/Secret for new literals
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_key_ref: Option<ConfigMapKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_ref: Option<ObjectFieldSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_field_ref: Option<ResourceFieldSelector>,
}

impl EnvConfig {
    pub fn value(key: &str, value: &str) -> Self {
        EnvConfig {
            r#type: "Value".to_string(),
            key: key.to_string(),
            value: Some(value.to_string()),
            ..Default::default()
        }
    }

    pub fn config_map_ref(key: &str, reference: ConfigMapKeySelector) -> Self {
        EnvConfig {
            r#type: "ConfigMap".to_string(),
            key: key.to_string(),
            config_map_key_ref: Some(reference),
            ..Default::default()
        }
    }

    pub fn secret_ref(key: &str, reference: SecretKeySelector) -> Self {
        EnvConfig {
            r#type: "Secret".to_string(),
            key: key.to_string(),
            secret_key_ref: Some(reference),
            ..Default::default()
        }
    }

    pub fn field_ref(key: &str, selector: ObjectFieldSelector) -> Self {
        EnvConfig {
            r#type: "FieldRef".to_string(),
            key: key.to_string(),
            field_ref: Some(selector),
            ..Default::default()
        }
    }

    pub fn resource_field_ref(key: &str, selector: ResourceFieldSelector) -> Self {
        EnvConfig {
            r#type: "ResourceFieldRef".to_string(),
            key: key.to_string(),
            resource_field_ref: Some(selector),
            ..Default::default()
        }
    }
}

/// Validation failure for a single [`EnvConfig`] entry. The entry is dropped
/// with a warning; the rest of the source still resolves.
#[derive(Error, Debug, PartialEq)]
pub enum EntryError {
    #[error("envConfig must have a key")]
    MissingKey,

    #[error("invalid envConfig type: {0}")]
    UnknownType(String),

    #[error("{0} type envConfig should not have {1}")]
    ConflictingField(&'static str, &'static str),

    #[error("Value type envConfig must have a value")]
    MissingValue,

    #[error("{0} type envConfig needs a value or a resolved reference")]
    MissingSource(&'static str),

    #[error("{0} reference is missing {1}")]
    IncompleteRef(&'static str, &'static str),
}

/// A classified environment configuration entry, one variant per type and
/// resolution state. Field combinations that are illegal on the wire form
/// cannot be represented here, so the resolver dispatches without further
/// validation.
#[derive(Clone, Debug, PartialEq)]
pub enum EnvEntry {
    Value {
        key: String,
        value: String,
    },
    /// ConfigMap entry already materialized into a reference
    ConfigMapRef {
        key: String,
        reference: ConfigMapKeySelector,
    },
    /// ConfigMap entry still carrying a raw literal to materialize
    ConfigMapLiteral {
        key: String,
        value: String,
        ref_name: Option<String>,
    },
    /// Secret entry already materialized into a reference
    SecretRef {
        key: String,
        reference: SecretKeySelector,
    },
    /// Secret entry still carrying a raw literal to materialize
    SecretLiteral {
        key: String,
        value: String,
        ref_name: Option<String>,
    },
    FieldRef {
        key: String,
        selector: ObjectFieldSelector,
    },
    ResourceFieldRef {
        key: String,
        selector: ResourceFieldSelector,
    },
}

impl TryFrom<&EnvConfig> for EnvEntry {
    type Error = EntryError;

    fn try_from(config: &EnvConfig) -> Result<Self, Self::Error> {
        if config.key.is_empty() {
            return Err(EntryError::MissingKey);
        }
        match config.r#type.to_lowercase().as_str() {
            // Value is the default type
            "" | "value" => classify_value(config),
            "configmap" => classify_config_map(config),
            "secret" => classify_secret(config),
            "fieldref" => classify_field_ref(config),
            "resourcefieldref" => classify_resource_field_ref(config),
            other => Err(EntryError::UnknownType(other.to_string())),
        }
    }
}

fn reject_field(
    config: &EnvConfig,
    type_name: &'static str,
    allow_config_map: bool,
    allow_secret: bool,
    allow_field: bool,
    allow_resource_field: bool,
) -> Result<(), EntryError> {
    if config.config_map_key_ref.is_some() && !allow_config_map {
        return Err(EntryError::ConflictingField(type_name, "configMapKeyRef"));
    }
    if config.secret_key_ref.is_some() && !allow_secret {
        return Err(EntryError::ConflictingField(type_name, "secretKeyRef"));
    }
    if config.field_ref.is_some() && !allow_field {
        return Err(EntryError::ConflictingField(type_name, "fieldRef"));
    }
    if config.resource_field_ref.is_some() && !allow_resource_field {
        return Err(EntryError::ConflictingField(type_name, "resourceFieldRef"));
    }
    Ok(())
}

fn classify_value(config: &EnvConfig) -> Result<EnvEntry, EntryError> {
    reject_field(config, "Value", false, false, false, false)?;
    if config.ref_name.is_some() {
        return Err(EntryError::ConflictingField("Value", "refName"));
    }
    let value = config.value.clone().ok_or(EntryError::MissingValue)?;
    Ok(EnvEntry::Value {
        key: config.key.clone(),
        value,
    })
}

fn classify_config_map(config: &EnvConfig) -> Result<EnvEntry, EntryError> {
    reject_field(config, "ConfigMap", true, false, false, false)?;
    if let Some(reference) = &config.config_map_key_ref {
        // Already resolved; a lingering literal or override is a conflict
        if config.value.is_some() {
            return Err(EntryError::ConflictingField("ConfigMap", "value"));
        }
        if config.ref_name.is_some() {
            return Err(EntryError::ConflictingField("ConfigMap", "refName"));
        }
        if reference.key.is_empty() {
            return Err(EntryError::IncompleteRef("configMapKeyRef", "key"));
        }
        return Ok(EnvEntry::ConfigMapRef {
            key: config.key.clone(),
            reference: reference.clone(),
        });
    }
    let value = config
        .value
        .clone()
        .ok_or(EntryError::MissingSource("ConfigMap"))?;
    Ok(EnvEntry::ConfigMapLiteral {
        key: config.key.clone(),
        value,
        ref_name: config.ref_name.clone(),
    })
}

fn classify_secret(config: &EnvConfig) -> Result<EnvEntry, EntryError> {
    reject_field(config, "Secret", false, true, false, false)?;
    if let Some(reference) = &config.secret_key_ref {
        if config.value.is_some() {
            return Err(EntryError::ConflictingField("Secret", "value"));
        }
        if config.ref_name.is_some() {
            return Err(EntryError::ConflictingField("Secret", "refName"));
        }
        if reference.key.is_empty() {
            return Err(EntryError::IncompleteRef("secretKeyRef", "key"));
        }
        return Ok(EnvEntry::SecretRef {
            key: config.key.clone(),
            reference: reference.clone(),
        });
    }
    let value = config
        .value
        .clone()
        .ok_or(EntryError::MissingSource("Secret"))?;
    Ok(EnvEntry::SecretLiteral {
        key: config.key.clone(),
        value,
        ref_name: config.ref_name.clone(),
    })
}

fn classify_field_ref(config: &EnvConfig) -> Result<EnvEntry, EntryError> {
    reject_field(config, "FieldRef", false, false, true, false)?;
    if config.ref_name.is_some() {
        return Err(EntryError::ConflictingField("FieldRef", "refName"));
    }
    // A raw value is shorthand for the field path
    if let Some(path) = &config.value {
        return Ok(EnvEntry::FieldRef {
            key: config.key.clone(),
            selector: ObjectFieldSelector {
                api_version: None,
                field_path: path.clone(),
            },
        });
    }
    let selector = config
        .field_ref
        .clone()
        .ok_or(EntryError::MissingSource("FieldRef"))?;
    if selector.field_path.is_empty() {
        return Err(EntryError::IncompleteRef("fieldRef", "fieldPath"));
    }
    Ok(EnvEntry::FieldRef {
        key: config.key.clone(),
        selector,
    })
}

fn classify_resource_field_ref(config: &EnvConfig) -> Result<EnvEntry, EntryError> {
    reject_field(config, "ResourceFieldRef", false, false, false, true)?;
    if config.ref_name.is_some() {
        return Err(EntryError::ConflictingField("ResourceFieldRef", "refName"));
    }
    // A raw value is shorthand for the resource name
    if let Some(resource) = &config.value {
        return Ok(EnvEntry::ResourceFieldRef {
            key: config.key.clone(),
            selector: ResourceFieldSelector {
                container_name: None,
                divisor: None,
                resource: resource.clone(),
            },
        });
    }
    let selector = config
        .resource_field_ref
        .clone()
        .ok_or(EntryError::MissingSource("ResourceFieldRef"))?;
    if selector.resource.is_empty() {
        return Err(EntryError::IncompleteRef("resourceFieldRef", "resource"));
    }
    Ok(EnvEntry::ResourceFieldRef {
        key: config.key.clone(),
        selector,
    })
}
