// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Binding controller: applies a binding's merged environment onto the
//! workload of the same name, once the workload has opted in.

use async_trait::async_trait;
use kube::api::PostParams;
use kube::{Api, Client};
use std::marker::PhantomData;
use tracing::{debug, info, warn};

use crate::constants::annotations;
use crate::error::Result;
use crate::merge::merge_env_sets;
use crate::reconcilers::annotation_true;
use crate::runtime::{ObjectKey, SyncHandler};
use crate::types::{BindingResource, WorkloadTarget};

pub struct BindingSync<W: WorkloadTarget> {
    client: Client,
    _workload: PhantomData<W>,
}

impl<W: WorkloadTarget> BindingSync<W> {
    pub fn new(client: Client) -> Self {
        BindingSync {
            client,
            _workload: PhantomData,
        }
    }
}

#[async_trait]
impl<W: WorkloadTarget> SyncHandler for BindingSync<W> {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let bindings: Api<W::Binding> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(binding) = bindings.get_opt(&key.name).await? else {
            return Ok(());
        };

        let workloads: Api<W> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(workload) = workloads.get_opt(&key.name).await? else {
            debug!(binding = %key, kind = W::KIND, "No workload for binding yet");
            return Ok(());
        };

        let merged = merge_env_sets(binding.envs_map());

        if !annotation_true(workload.workload_annotations(), annotations::ENABLED) {
            debug!(
                workload = %key,
                kind = W::KIND,
                fingerprint = %merged.fingerprint,
                "Workload has not opted in, skipping env apply"
            );
            return Ok(());
        }

        let mut updated = workload.clone();

        // The opt-out marker suppresses the rollout-forcing fingerprint, not
        // the env update itself
        let refresh_template =
            !annotation_true(workload.workload_annotations(), annotations::DISABLE_TEMPLATE_REFRESH);
        if refresh_template {
            match updated.template_annotations_mut() {
                Some(template_annotations) => {
                    template_annotations.insert(
                        annotations::ENV_REF_VERSIONS.to_string(),
                        merged.fingerprint.clone(),
                    );
                }
                None => {
                    warn!(workload = %key, kind = W::KIND, "Workload has no pod template");
                    return Ok(());
                }
            }
        }

        match updated.containers_mut().and_then(|c| c.first_mut()) {
            Some(first) => {
                first.env = Some(merged.envs);
            }
            None => {
                warn!(workload = %key, kind = W::KIND, "Workload has no containers");
                return Ok(());
            }
        }

        if updated != workload {
            workloads
                .replace(&key.name, &PostParams::default(), &updated)
                .await?;
            info!(
                workload = %key,
                kind = W::KIND,
                fingerprint = %merged.fingerprint,
                "Applied merged environment to workload"
            );
        } else {
            debug!(workload = %key, kind = W::KIND, "Workload already up to date");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KconfigEnvs;
    use k8s_openapi::api::core::v1::EnvVar;
    use std::collections::BTreeMap;

    // The merge/apply split keeps most behavior in pure functions; here we
    // only pin the annotation gates the controller consults.

    #[test]
    fn test_opt_in_gate() {
        let on = BTreeMap::from([(annotations::ENABLED.to_string(), "true".to_string())]);
        assert!(annotation_true(Some(&on), annotations::ENABLED));
        assert!(!annotation_true(None, annotations::ENABLED));
    }

    #[test]
    fn test_merged_fingerprint_reflects_map_contents() {
        let map = BTreeMap::from([(
            "team-a/db".to_string(),
            KconfigEnvs {
                level: 0,
                env_refs_version: 3,
                envs: vec![EnvVar {
                    name: "A".to_string(),
                    value: Some("1".to_string()),
                    value_from: None,
                }],
                selector: None,
                container_selector: None,
            },
        )]);
        let merged = merge_env_sets(&map);
        assert_eq!(merged.fingerprint, "3");
        assert_eq!(merged.envs.len(), 1);
    }
}
