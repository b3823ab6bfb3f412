// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Idempotent writer for the ConfigMaps/Secrets that back materialized
//! literal values. Writes are grouped per target so a source with many
//! entries touching the same resource costs one read-modify-write.

use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExternalKind {
    ConfigMap,
    Secret,
}

impl std::fmt::Display for ExternalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalKind::ConfigMap => write!(f, "ConfigMap"),
            ExternalKind::Secret => write!(f, "Secret"),
        }
    }
}

/// A pending addition to an external key/value store. Produced by the
/// resolver and consumed within the same reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalWrite {
    pub kind: ExternalKind,
    pub name: String,
    pub key: String,
    pub value: String,
}

/// Bucket writes by target so each resource is persisted at most once
pub fn group_writes(
    writes: Vec<ExternalWrite>,
) -> BTreeMap<(ExternalKind, String), Vec<ExternalWrite>> {
    let mut groups: BTreeMap<(ExternalKind, String), Vec<ExternalWrite>> = BTreeMap::new();
    for write in writes {
        groups
            .entry((write.kind, write.name.clone()))
            .or_default()
            .push(write);
    }
    groups
}

/// Apply all pending writes for one namespace
pub async fn apply_writes(
    client: &Client,
    namespace: &str,
    writes: Vec<ExternalWrite>,
) -> Result<()> {
    for ((kind, name), group) in group_writes(writes) {
        match kind {
            ExternalKind::ConfigMap => {
                apply_configmap_writes(client, namespace, &name, &group).await?;
            }
            ExternalKind::Secret => {
                apply_secret_writes(client, namespace, &name, &group).await?;
            }
        }
    }
    Ok(())
}

/// Merge writes into the named ConfigMap, persisting only when the merged
/// result differs from the live state
pub async fn apply_configmap_writes(
    client: &Client,
    namespace: &str,
    name: &str,
    writes: &[ExternalWrite],
) -> Result<()> {
    let api: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let existing = api.get_opt(name).await?;
    let mut desired = existing.clone().unwrap_or_else(|| ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    });
    let data = desired.data.get_or_insert_with(BTreeMap::new);
    for write in writes {
        data.insert(write.key.clone(), write.value.clone());
    }
    match existing {
        Some(ref current) if *current == desired => {
            debug!(configmap = %format!("{}/{}", namespace, name), "ConfigMap already up to date");
        }
        Some(_) => {
            api.replace(name, &PostParams::default(), &desired).await?;
            info!(configmap = %format!("{}/{}", namespace, name), "Updated ConfigMap");
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
            info!(configmap = %format!("{}/{}", namespace, name), "Created ConfigMap");
        }
    }
    Ok(())
}

/// Merge writes into the named Secret, persisting only when the merged
/// result differs from the live state
pub async fn apply_secret_writes(
    client: &Client,
    namespace: &str,
    name: &str,
    writes: &[ExternalWrite],
) -> Result<()> {
    let api: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let existing = api.get_opt(name).await?;
    let mut desired = existing.clone().unwrap_or_else(|| Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    });
    let data = desired.data.get_or_insert_with(BTreeMap::new);
    for write in writes {
        data.insert(
            write.key.clone(),
            ByteString(write.value.clone().into_bytes()),
        );
    }
    match existing {
        Some(ref current) if *current == desired => {
            debug!(secret = %format!("{}/{}", namespace, name), "Secret already up to date");
        }
        Some(_) => {
            api.replace(name, &PostParams::default(), &desired).await?;
            info!(secret = %format!("{}/{}", namespace, name), "Updated Secret");
        }
        None => {
            api.create(&PostParams::default(), &desired).await?;
            info!(secret = %format!("{}/{}", namespace, name), "Created Secret");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{configmap_json, not_found_json, MockService};

    fn make_write(kind: ExternalKind, name: &str, key: &str, value: &str) -> ExternalWrite {
        ExternalWrite {
            kind,
            name: name.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_group_writes_by_kind_and_name() {
        let writes = vec![
            make_write(ExternalKind::ConfigMap, "kc-db", "dburl", "db.internal"),
            make_write(ExternalKind::Secret, "ks-db", "dbpassword", "hunter2"),
            make_write(ExternalKind::ConfigMap, "kc-db", "dbport", "5432"),
        ];
        let groups = group_writes(writes);
        assert_eq!(groups.len(), 2);
        assert_eq!(
            groups[&(ExternalKind::ConfigMap, "kc-db".to_string())].len(),
            2
        );
        assert_eq!(groups[&(ExternalKind::Secret, "ks-db".to_string())].len(), 1);
    }

    #[test]
    fn test_group_writes_empty() {
        assert!(group_writes(vec![]).is_empty());
    }

    #[tokio::test]
    async fn test_apply_configmap_is_noop_when_value_unchanged() {
        // The mock answers the GET but would 404 any write, so a write
        // attempt fails the call
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/team-a/configmaps/kc-db",
                200,
                &configmap_json("kc-db", "team-a", &[("dburl", "db.internal")]),
            )
            .into_client();

        let writes = vec![make_write(
            ExternalKind::ConfigMap,
            "kc-db",
            "dburl",
            "db.internal",
        )];
        apply_configmap_writes(&client, "team-a", "kc-db", &writes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_configmap_updates_on_changed_value() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/team-a/configmaps/kc-db",
                200,
                &configmap_json("kc-db", "team-a", &[("dburl", "old.internal")]),
            )
            .on_put(
                "/api/v1/namespaces/team-a/configmaps/kc-db",
                200,
                &configmap_json("kc-db", "team-a", &[("dburl", "db.internal")]),
            )
            .into_client();

        let writes = vec![make_write(
            ExternalKind::ConfigMap,
            "kc-db",
            "dburl",
            "db.internal",
        )];
        apply_configmap_writes(&client, "team-a", "kc-db", &writes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_apply_configmap_creates_when_absent() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/team-a/configmaps/kc-db",
                404,
                &not_found_json("configmaps", "kc-db"),
            )
            .on_post(
                "/api/v1/namespaces/team-a/configmaps",
                201,
                &configmap_json("kc-db", "team-a", &[("dburl", "db.internal")]),
            )
            .into_client();

        let writes = vec![make_write(
            ExternalKind::ConfigMap,
            "kc-db",
            "dburl",
            "db.internal",
        )];
        apply_configmap_writes(&client, "team-a", "kc-db", &writes)
            .await
            .unwrap();
    }
}
