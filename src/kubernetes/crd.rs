// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::API_GROUP;
use crate::error::Result;
use kube::{discovery::Discovery, Client};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

/// The kinds the operator cannot start without
const REQUIRED_KINDS: [&str; 3] = ["Kconfig", "DeploymentBinding", "StatefulSetBinding"];

/// Wait for the operator's CRDs to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_kconfig_crds(client: &Client) -> Result<()> {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match check_kconfig_crds_exist(client).await {
            Ok(true) => {
                info!("Kconfig CRDs ({}/v1beta1) are available", API_GROUP);
                return Ok(());
            }
            Ok(false) => {
                info!(
                    "Kconfig CRDs ({}/v1beta1) not yet available, waiting {} seconds...",
                    API_GROUP, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for Kconfig CRDs: {}, retrying in {} seconds...",
                    e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

/// Check if all required CRDs exist by attempting to discover them.
async fn check_kconfig_crds_exist(client: &Client) -> Result<bool> {
    let discovery = Discovery::new(client.clone())
        .filter(&[API_GROUP])
        .run()
        .await?;

    for group in discovery.groups() {
        if group.name() == API_GROUP {
            let found = REQUIRED_KINDS.iter().all(|kind| {
                group
                    .recommended_resources()
                    .iter()
                    .any(|(ar, _)| ar.kind == *kind && ar.version == "v1beta1")
            });
            if found {
                return Ok(true);
            }
        }
    }

    Ok(false)
}
