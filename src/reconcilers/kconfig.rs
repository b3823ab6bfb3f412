// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kconfig controller: resolves a source's entries, persists the backing
//! external material, normalizes the source in place, and fans the resolved
//! env set out to every binding its selector matches.

use async_trait::async_trait;
use kube::api::{ListParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Client, Resource, ResourceExt};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{annotations, events, OPERATOR_NAME};
use crate::error::Result;
use crate::external;
use crate::resolve::{resolve_env_configs, ResolveContext};
use crate::runtime::{ObjectKey, SyncHandler};
use crate::selector;
use crate::types::{
    BindingResource, DeploymentBinding, Kconfig, KconfigEnvs, KnativeServiceBinding,
    StatefulSetBinding,
};

pub struct KconfigSync {
    client: Client,
    config: Config,
    recorder: Recorder,
}

impl KconfigSync {
    pub fn new(client: Client, config: Config) -> Self {
        let reporter = Reporter {
            controller: OPERATOR_NAME.to_string(),
            instance: None,
        };
        let recorder = Recorder::new(client.clone(), reporter);
        KconfigSync {
            client,
            config,
            recorder,
        }
    }

    async fn process(&self, api: &Api<Kconfig>, kconfig: Kconfig) -> Result<()> {
        let name = kconfig.name_any();
        let namespace = kconfig.namespace().unwrap_or_default();

        // A malformed selector aborts the pass before anything is mutated
        selector::validate(&kconfig.spec.selector)?;

        let ctx = ResolveContext {
            source_name: &name,
            configmap_prefix: &self.config.configmap_prefix,
            secret_prefix: &self.config.secret_prefix,
        };
        let outcome = resolve_env_configs(&kconfig.spec.env_configs, &ctx);

        for warning in &outcome.warnings {
            warn!(kconfig = %format!("{}/{}", namespace, name), "{}", warning);
            let event = Event {
                type_: EventType::Warning,
                reason: events::INVALID_ENV_CONFIG.to_string(),
                note: Some(warning.clone()),
                action: "Resolve".to_string(),
                secondary: None,
            };
            if let Err(err) = self.recorder.publish(&event, &kconfig.object_ref(&())).await {
                warn!(error = %err, "Failed to publish warning event");
            }
        }

        external::apply_writes(&self.client, &namespace, outcome.writes.clone()).await?;

        // Materializing a literal is the one case that bumps envRefsVersion
        let materialized = !outcome.writes.is_empty();
        let mut current = kconfig;
        if materialized || outcome.env_configs != current.spec.env_configs {
            let mut normalized = current.clone();
            normalized.spec.env_configs = outcome.env_configs.clone();
            if materialized {
                normalized.spec.env_refs_version += 1;
            }
            current = api.replace(&name, &PostParams::default(), &normalized).await?;
            info!(
                kconfig = %format!("{}/{}", namespace, name),
                env_refs_version = current.spec.env_refs_version,
                "Normalized kconfig"
            );
        }

        let env_set = KconfigEnvs {
            level: current.spec.level,
            env_refs_version: current.spec.env_refs_version,
            envs: outcome.env_vars,
            selector: Some(current.spec.selector.clone()),
            container_selector: current.spec.container_selector.clone(),
        };
        let env_key = current.env_key();
        let generation = current.metadata.generation;

        self.update_bindings::<DeploymentBinding>(&namespace, &name, &env_key, &current, &env_set, generation)
            .await?;
        self.update_bindings::<StatefulSetBinding>(&namespace, &name, &env_key, &current, &env_set, generation)
            .await?;
        if self.config.knative_enabled {
            self.update_bindings::<KnativeServiceBinding>(
                &namespace, &name, &env_key, &current, &env_set, generation,
            )
            .await?;
        }
        Ok(())
    }

    /// Upsert this source's contribution on every selected binding of one
    /// kind, and drop it from bindings the selector no longer matches
    async fn update_bindings<B: BindingResource>(
        &self,
        namespace: &str,
        source_name: &str,
        env_key: &str,
        kconfig: &Kconfig,
        env_set: &KconfigEnvs,
        generation: Option<i64>,
    ) -> Result<()> {
        let api: Api<B> = Api::namespaced(self.client.clone(), namespace);
        let generation_key = format!("{}{}", annotations::GENERATION_PREFIX, source_name);

        for binding in api.list(&ListParams::default()).await?.items {
            let binding_name = binding.name_any();
            let labels = binding.meta().labels.clone().unwrap_or_default();
            let selected = selector::matches(&kconfig.spec.selector, &labels)?;

            if selected {
                if binding.envs_map().get(env_key) == Some(env_set) {
                    continue;
                }
                let mut updated = binding.clone();
                updated
                    .envs_map_mut()
                    .insert(env_key.to_string(), env_set.clone());
                if let Some(generation) = generation {
                    updated
                        .meta_mut()
                        .annotations
                        .get_or_insert_with(BTreeMap::new)
                        .insert(generation_key.clone(), generation.to_string());
                }
                api.replace(&binding_name, &PostParams::default(), &updated)
                    .await?;
                info!(
                    binding = %format!("{}/{}", namespace, binding_name),
                    kind = B::KIND,
                    source = env_key,
                    "Applied kconfig contribution to binding"
                );
            } else if binding.envs_map().contains_key(env_key) {
                let mut updated = binding.clone();
                updated.envs_map_mut().remove(env_key);
                if let Some(binding_annotations) = updated.meta_mut().annotations.as_mut() {
                    binding_annotations.remove(&generation_key);
                }
                api.replace(&binding_name, &PostParams::default(), &updated)
                    .await?;
                info!(
                    binding = %format!("{}/{}", namespace, binding_name),
                    kind = B::KIND,
                    source = env_key,
                    "Removed kconfig contribution from unselected binding"
                );
            }
        }
        Ok(())
    }

    /// Drop the deleted source's contribution from every binding that holds it
    async fn remove_contribution<B: BindingResource>(&self, key: &ObjectKey) -> Result<()> {
        let api: Api<B> = Api::namespaced(self.client.clone(), &key.namespace);
        let env_key = key.to_string();
        let generation_key = format!("{}{}", annotations::GENERATION_PREFIX, key.name);

        for binding in api.list(&ListParams::default()).await?.items {
            if !binding.envs_map().contains_key(&env_key) {
                continue;
            }
            let binding_name = binding.name_any();
            let mut updated = binding.clone();
            updated.envs_map_mut().remove(&env_key);
            if let Some(binding_annotations) = updated.meta_mut().annotations.as_mut() {
                binding_annotations.remove(&generation_key);
            }
            api.replace(&binding_name, &PostParams::default(), &updated)
                .await?;
            info!(
                binding = %format!("{}/{}", key.namespace, binding_name),
                kind = B::KIND,
                source = %env_key,
                "Removed deleted kconfig's contribution"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl SyncHandler for KconfigSync {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let api: Api<Kconfig> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(kconfig) = api.get_opt(&key.name).await? else {
            debug!(kconfig = %key, "Kconfig gone, removing its contributions");
            self.remove_contribution::<DeploymentBinding>(key).await?;
            self.remove_contribution::<StatefulSetBinding>(key).await?;
            if self.config.knative_enabled {
                self.remove_contribution::<KnativeServiceBinding>(key).await?;
            }
            return Ok(());
        };
        self.process(&api, kconfig).await
    }
}
