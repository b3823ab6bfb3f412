// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Abstraction over the workload kinds a binding can target. Each target
//! exposes its opt-in annotations, its labels, and mutable access to the pod
//! template the merger writes into.

use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::binding::{
    BindingResource, DeploymentBinding, KnativeServiceBinding, StatefulSetBinding,
};
use crate::types::knative;

pub trait WorkloadTarget:
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
    type Binding: BindingResource;

    const KIND: &'static str;

    fn workload_annotations(&self) -> Option<&BTreeMap<String, String>>;
    fn workload_labels(&self) -> Option<&BTreeMap<String, String>>;

    /// Mutable pod-template annotations, created on demand. None when the
    /// workload has no template to annotate.
    fn template_annotations_mut(&mut self) -> Option<&mut BTreeMap<String, String>>;

    /// Mutable pod-template containers. None when the workload carries no pod spec.
    fn containers_mut(&mut self) -> Option<&mut Vec<Container>>;
}

impl WorkloadTarget for Deployment {
    type Binding = DeploymentBinding;

    const KIND: &'static str = "Deployment";

    fn workload_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn workload_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn template_annotations_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        let template = &mut self.spec.as_mut()?.template;
        Some(
            template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default),
        )
    }

    fn containers_mut(&mut self) -> Option<&mut Vec<Container>> {
        Some(&mut self.spec.as_mut()?.template.spec.as_mut()?.containers)
    }
}

impl WorkloadTarget for StatefulSet {
    type Binding = StatefulSetBinding;

    const KIND: &'static str = "StatefulSet";

    fn workload_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn workload_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn template_annotations_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        let template = &mut self.spec.as_mut()?.template;
        Some(
            template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default),
        )
    }

    fn containers_mut(&mut self) -> Option<&mut Vec<Container>> {
        Some(&mut self.spec.as_mut()?.template.spec.as_mut()?.containers)
    }
}

impl WorkloadTarget for knative::Service {
    type Binding = KnativeServiceBinding;

    const KIND: &'static str = "KnativeService";

    fn workload_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    fn workload_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    fn template_annotations_mut(&mut self) -> Option<&mut BTreeMap<String, String>> {
        Some(
            self.spec
                .template
                .metadata
                .get_or_insert_with(Default::default)
                .annotations
                .get_or_insert_with(Default::default),
        )
    }

    fn containers_mut(&mut self) -> Option<&mut Vec<Container>> {
        Some(
            &mut self
                .spec
                .template
                .spec
                .get_or_insert_with(Default::default)
                .containers,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
    use kube::api::ObjectMeta;

    fn make_deployment(containers: Vec<Container>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("web".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(PodSpec {
                        containers,
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn test_template_annotations_created_on_demand() {
        let mut deployment = make_deployment(vec![]);
        let annotations = deployment.template_annotations_mut().unwrap();
        annotations.insert("k".to_string(), "v".to_string());
        let template = &deployment.spec.unwrap().template;
        assert_eq!(
            template
                .metadata
                .as_ref()
                .unwrap()
                .annotations
                .as_ref()
                .unwrap()
                .get("k")
                .unwrap(),
            "v"
        );
    }

    #[test]
    fn test_containers_mut_reaches_pod_spec() {
        let mut deployment = make_deployment(vec![Container {
            name: "app".to_string(),
            ..Default::default()
        }]);
        let containers = deployment.containers_mut().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "app");
    }

    #[test]
    fn test_containers_mut_without_spec() {
        let mut deployment = Deployment::default();
        assert!(deployment.containers_mut().is_none());
    }

    #[test]
    fn test_knative_containers_created_on_demand() {
        let mut service = knative::Service::default();
        let containers = service.containers_mut().unwrap();
        assert!(containers.is_empty());
    }
}
