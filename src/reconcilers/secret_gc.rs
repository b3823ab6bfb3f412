// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Garbage collector for a source's managed Secret, run as a parallel
//! reconciliation over Kconfigs with a short resync so retention windows
//! expire without watch traffic.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use k8s_openapi::api::core::v1::Secret;
use kube::api::PostParams;
use kube::{Api, Client};
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::Result;
use crate::gc;
use crate::runtime::{ObjectKey, SyncHandler};
use crate::types::{EnvEntry, Kconfig};

pub struct SecretGcSync {
    client: Client,
    config: Config,
}

impl SecretGcSync {
    pub fn new(client: Client, config: Config) -> Self {
        SecretGcSync { client, config }
    }
}

/// The keys of the managed Secret this source still references
fn referenced_keys(kconfig: &Kconfig, secret_name: &str) -> BTreeSet<String> {
    kconfig
        .spec
        .env_configs
        .iter()
        .filter_map(|config| match EnvEntry::try_from(config) {
            Ok(EnvEntry::SecretRef { reference, .. })
                if reference.name == secret_name =>
            {
                Some(reference.key)
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl SyncHandler for SecretGcSync {
    async fn sync(&self, key: &ObjectKey) -> Result<()> {
        let kconfigs: Api<Kconfig> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(kconfig) = kconfigs.get_opt(&key.name).await? else {
            return Ok(());
        };

        let secret_name = format!("{}{}", self.config.secret_prefix, key.name);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &key.namespace);
        let Some(secret) = secrets.get_opt(&secret_name).await? else {
            debug!(kconfig = %key, "No managed secret to collect");
            return Ok(());
        };

        let referenced = referenced_keys(&kconfig, &secret_name);
        let retention = Duration::seconds(self.config.key_removal_period_secs);

        if let Some(updated) = gc::collect(&secret, &referenced, Utc::now().naive_utc(), retention)
        {
            secrets
                .replace(&secret_name, &PostParams::default(), &updated)
                .await?;
            info!(
                secret = %format!("{}/{}", key.namespace, secret_name),
                referenced = referenced.len(),
                "Persisted garbage collection pass"
            );
        }
        Ok(())
    }
}
