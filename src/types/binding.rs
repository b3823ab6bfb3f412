// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Binding resources: one per target workload, holding the resolved
//! contribution of every Kconfig whose selector matches it.

use k8s_openapi::api::core::v1::EnvVar;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::NamespaceResourceScope;
use kube::{CustomResource, Resource};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The resolved environment contribution of a single Kconfig.
///
/// The selector copies let the admission injector re-evaluate matching
/// against pod labels without fetching the source.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KconfigEnvs {
    #[serde(default)]
    pub level: i32,
    #[serde(default)]
    pub env_refs_version: i64,
    #[serde(default)]
    pub envs: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_selector: Option<LabelSelector>,
}

/// Common surface of the per-workload binding kinds, so the controllers can
/// stay generic over the workload type.
pub trait BindingResource:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + std::fmt::Debug
    + PartialEq
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: &'static str;

    /// Map from source identity (`namespace/name`) to its resolved env set
    fn envs_map(&self) -> &BTreeMap<String, KconfigEnvs>;
    fn envs_map_mut(&mut self) -> &mut BTreeMap<String, KconfigEnvs>;

    /// A fresh binding for the given workload, with no contributions yet
    fn new_binding(namespace: &str, name: &str, labels: Option<BTreeMap<String, String>>) -> Self;
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "kconfig.dev", version = "v1beta1", kind = "DeploymentBinding")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
pub struct DeploymentBindingSpec {
    #[serde(default, rename = "kconfigEnvs")]
    pub kconfig_envs_map: BTreeMap<String, KconfigEnvs>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "kconfig.dev", version = "v1beta1", kind = "StatefulSetBinding")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
pub struct StatefulSetBindingSpec {
    #[serde(default, rename = "kconfigEnvs")]
    pub kconfig_envs_map: BTreeMap<String, KconfigEnvs>,
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "kconfig.dev", version = "v1beta1", kind = "KnativeServiceBinding")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[kube(derive = "Default")]
pub struct KnativeServiceBindingSpec {
    #[serde(default, rename = "kconfigEnvs")]
    pub kconfig_envs_map: BTreeMap<String, KconfigEnvs>,
}

macro_rules! impl_binding_resource {
    ($kind:ty, $spec:ty, $name:literal) => {
        impl BindingResource for $kind {
            const KIND: &'static str = $name;

            fn envs_map(&self) -> &BTreeMap<String, KconfigEnvs> {
                &self.spec.kconfig_envs_map
            }

            fn envs_map_mut(&mut self) -> &mut BTreeMap<String, KconfigEnvs> {
                &mut self.spec.kconfig_envs_map
            }

            fn new_binding(
                namespace: &str,
                name: &str,
                labels: Option<BTreeMap<String, String>>,
            ) -> Self {
                let mut binding = <$kind>::new(name, <$spec>::default());
                binding.metadata.namespace = Some(namespace.to_string());
                binding.metadata.labels = labels;
                binding
            }
        }
    };
}

impl_binding_resource!(DeploymentBinding, DeploymentBindingSpec, "DeploymentBinding");
impl_binding_resource!(StatefulSetBinding, StatefulSetBindingSpec, "StatefulSetBinding");
impl_binding_resource!(
    KnativeServiceBinding,
    KnativeServiceBindingSpec,
    "KnativeServiceBinding"
);
