// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Workload lifecycle controller: keeps a binding alive for every opted-in
//! workload and removes it when the workload disappears.

use async_trait::async_trait;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, Resource};
use std::marker::PhantomData;
use tracing::{debug, info};

use crate::constants::annotations;
use crate::error::Result;
use crate::reconcilers::annotation_true;
use crate::runtime::{ObjectKey, SyncHandler};
use crate::types::{BindingResource, WorkloadTarget};

pub struct WorkloadSync<W: WorkloadTarget> {
    client: Client,
    _workload: PhantomData<W>,
}

impl<W: WorkloadTarget> WorkloadSync<W> {
    pub fn new(client: Client) -> Self {
        WorkloadSync {
            client,
            _workload: PhantomData,
        }
    }
}

#[async_trait]
impl<W: WorkloadTarget> SyncHandler for WorkloadSync<W> {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let workloads: Api<W> = Api::namespaced(self.client.clone(), &key.namespace);
        let bindings: Api<W::Binding> = Api::namespaced(self.client.clone(), &key.namespace);

        let Some(workload) = workloads.get_opt(&key.name).await? else {
            // Level-triggered cleanup: the binding follows its workload out
            if bindings.get_opt(&key.name).await?.is_some() {
                bindings.delete(&key.name, &DeleteParams::default()).await?;
                info!(binding = %key, kind = W::KIND, "Deleted binding for removed workload");
            }
            return Ok(());
        };

        if !annotation_true(workload.workload_annotations(), annotations::ENABLED) {
            debug!(workload = %key, kind = W::KIND, "Workload has not opted in, ignoring");
            return Ok(());
        }

        match bindings.get_opt(&key.name).await? {
            None => {
                let binding = W::Binding::new_binding(
                    &key.namespace,
                    &key.name,
                    workload.workload_labels().cloned(),
                );
                bindings.create(&PostParams::default(), &binding).await?;
                info!(binding = %key, kind = W::KIND, "Created binding for workload");
            }
            Some(binding) => {
                // Bindings are selected by label, so keep them in step with
                // the workload's labels
                if binding.meta().labels.as_ref() != workload.workload_labels() {
                    let mut updated = binding.clone();
                    updated.meta_mut().labels = workload.workload_labels().cloned();
                    bindings
                        .replace(&key.name, &PostParams::default(), &updated)
                        .await?;
                    info!(binding = %key, kind = W::KIND, "Refreshed binding labels");
                }
            }
        }
        Ok(())
    }
}
