// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission-time env injection: applies the selector-match and merge logic
//! directly to pods at creation, bypassing the asynchronous path.

use axum::{extract::State, Json};
use json_patch::{PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::api::ListParams;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::DynamicObject;
use kube::{Api, Client};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::constants::annotations;
use crate::error::Result;
use crate::reconcilers::annotation_true;
use crate::selector;
use crate::types::{
    BindingResource, DeploymentBinding, KconfigEnvs, KnativeServiceBinding, StatefulSetBinding,
};

pub struct WebhookState {
    pub client: Client,
    pub config: Config,
}

/// Handle a mutating admission review for pod creation
pub async fn mutate_handler(
    State(state): State<Arc<WebhookState>>,
    Json(body): Json<AdmissionReview<Pod>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<Pod> = match body.try_into() {
        Ok(request) => request,
        Err(err) => {
            error!(error = %err, "Failed to parse admission request");
            return Json(AdmissionResponse::invalid(err.to_string()).into_review());
        }
    };
    let response = mutate_pod(&state, &request).await;
    Json(response.into_review())
}

async fn mutate_pod(state: &WebhookState, request: &AdmissionRequest<Pod>) -> AdmissionResponse {
    let Some(pod) = &request.object else {
        return AdmissionResponse::from(request);
    };

    if !annotation_true(pod.metadata.annotations.as_ref(), annotations::INJECT) {
        debug!(pod = ?pod.metadata.name, "Pod not annotated for injection, allowing unchanged");
        return AdmissionResponse::from(request);
    }

    let namespace = request.namespace.clone().unwrap_or_default();
    let mut sets = BTreeMap::new();
    if let Err(err) = collect_env_sets(state, &namespace, &mut sets).await {
        error!(error = %err, namespace, "Failed to list bindings for injection");
        return AdmissionResponse::from(request).deny(format!("could not list bindings: {}", err));
    }

    let pod_labels = pod.metadata.labels.clone().unwrap_or_default();
    let selected = select_env_sets(&sets, &pod_labels);
    if selected.is_empty() {
        return AdmissionResponse::from(request);
    }

    let Some(pod_spec) = &pod.spec else {
        return AdmissionResponse::from(request);
    };
    let mut containers = pod_spec.containers.clone();
    let exclusive = annotation_true(pod.metadata.annotations.as_ref(), annotations::EXCLUSIVE_ENV);
    let injected = inject_env_sets(
        &mut containers,
        &selected,
        state.config.default_container_selector.as_ref(),
        exclusive,
    );
    if !injected {
        return AdmissionResponse::from(request);
    }

    let value = match serde_json::to_value(&containers) {
        Ok(value) => value,
        Err(err) => {
            error!(error = %err, "Failed to serialize mutated containers");
            return AdmissionResponse::from(request).deny(err.to_string());
        }
    };
    let patch = json_patch::Patch(vec![PatchOperation::Replace(ReplaceOperation {
        path: PointerBuf::from_tokens(["spec", "containers"]),
        value,
    })]);

    info!(
        pod = ?pod.metadata.name,
        namespace,
        sources = selected.len(),
        "Injecting environment at admission"
    );
    match AdmissionResponse::from(request).with_patch(patch) {
        Ok(response) => response,
        Err(err) => {
            error!(error = %err, "Failed to serialize patch");
            AdmissionResponse::from(request).deny(format!("patch serialization error: {}", err))
        }
    }
}

/// Gather every source's env set from all binding kinds in the namespace,
/// deduplicated by source identity
async fn collect_env_sets(
    state: &WebhookState,
    namespace: &str,
    sets: &mut BTreeMap<String, KconfigEnvs>,
) -> Result<()> {
    collect_bindings::<DeploymentBinding>(&state.client, namespace, sets).await?;
    collect_bindings::<StatefulSetBinding>(&state.client, namespace, sets).await?;
    if state.config.knative_enabled {
        collect_bindings::<KnativeServiceBinding>(&state.client, namespace, sets).await?;
    }
    Ok(())
}

async fn collect_bindings<B: BindingResource>(
    client: &Client,
    namespace: &str,
    sets: &mut BTreeMap<String, KconfigEnvs>,
) -> Result<()> {
    let api: Api<B> = Api::namespaced(client.clone(), namespace);
    for binding in api.list(&ListParams::default()).await?.items {
        for (source, set) in binding.envs_map() {
            sets.entry(source.clone()).or_insert_with(|| set.clone());
        }
    }
    Ok(())
}

/// The env sets whose stored selector matches the pod's labels, ordered by
/// level. Entries with malformed selectors are skipped.
pub fn select_env_sets<'a>(
    sets: &'a BTreeMap<String, KconfigEnvs>,
    pod_labels: &BTreeMap<String, String>,
) -> Vec<&'a KconfigEnvs> {
    let mut selected = Vec::new();
    for (source, set) in sets {
        let Some(source_selector) = &set.selector else {
            continue;
        };
        match selector::matches(source_selector, pod_labels) {
            Ok(true) => selected.push(set),
            Ok(false) => {}
            Err(err) => {
                warn!(source, error = %err, "Skipping env set with malformed selector");
            }
        }
    }
    selected.sort_by_key(|set| set.level);
    selected
}

/// Append each selected set's envs to every container its container
/// selector (or the operator-wide default) matches. Returns whether any
/// container changed.
pub fn inject_env_sets(
    containers: &mut [Container],
    sets: &[&KconfigEnvs],
    default_selector: Option<&LabelSelector>,
    exclusive: bool,
) -> bool {
    let mut cleared: HashSet<usize> = HashSet::new();
    let mut injected = false;
    for set in sets {
        let container_selector = set.container_selector.as_ref().or(default_selector);
        for (index, container) in containers.iter_mut().enumerate() {
            match selector::container_matches(container_selector, &container.name) {
                Ok(true) => {
                    if exclusive && cleared.insert(index) {
                        container.env = Some(Vec::new());
                    }
                    container
                        .env
                        .get_or_insert_with(Vec::new)
                        .extend(set.envs.iter().cloned());
                    injected = true;
                }
                Ok(false) => {}
                Err(err) => {
                    warn!(container = %container.name, error = %err, "Skipping container with malformed selector");
                }
            }
        }
    }
    injected
}
