// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use kube::{Api, Client};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use kconfig_operator::config::Config;
use kconfig_operator::constants::resync;
use kconfig_operator::kubernetes::wait_for_kconfig_crds;
use kconfig_operator::reconcilers::{BindingSync, KconfigSync, SecretGcSync, WorkloadSync};
use kconfig_operator::runtime::ReconcileRuntime;
use kconfig_operator::server::start_server;
use kconfig_operator::types::{
    DeploymentBinding, Kconfig, KnativeService, KnativeServiceBinding, StatefulSetBinding,
};
use kconfig_operator::webhook::WebhookState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting kconfig operator");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        "Configuration loaded: configmap_prefix={} secret_prefix={} key_removal_period={}s",
        config.configmap_prefix, config.secret_prefix, config.key_removal_period_secs
    );

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Wait for the operator's CRDs before starting controllers
    info!("Waiting for Kconfig CRDs to become available...");
    wait_for_kconfig_crds(&client).await?;

    // A single stop signal fans out to every controller and the server
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", err);
            return;
        }
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    info!("Starting controllers...");
    let mut tasks: Vec<JoinHandle<Result<()>>> = Vec::new();

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "kconfig",
            Api::<Kconfig>::all(client.clone()),
            Arc::new(KconfigSync::new(client.clone(), config.clone())),
            config.workers,
            Some(resync::DEFAULT),
        )
        .run(shutdown_rx.clone()),
    ));

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "secret-gc",
            Api::<Kconfig>::all(client.clone()),
            Arc::new(SecretGcSync::new(client.clone(), config.clone())),
            config.workers,
            Some(resync::SECRET_GC),
        )
        .run(shutdown_rx.clone()),
    ));

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "deployment-binding",
            Api::<DeploymentBinding>::all(client.clone()),
            Arc::new(BindingSync::<Deployment>::new(client.clone())),
            config.workers,
            Some(resync::DEFAULT),
        )
        .run(shutdown_rx.clone()),
    ));

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "deployment",
            Api::<Deployment>::all(client.clone()),
            Arc::new(WorkloadSync::<Deployment>::new(client.clone())),
            config.workers,
            Some(resync::DEFAULT),
        )
        .run(shutdown_rx.clone()),
    ));

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "statefulset-binding",
            Api::<StatefulSetBinding>::all(client.clone()),
            Arc::new(BindingSync::<StatefulSet>::new(client.clone())),
            config.workers,
            Some(resync::DEFAULT),
        )
        .run(shutdown_rx.clone()),
    ));

    tasks.push(tokio::spawn(
        ReconcileRuntime::new(
            "statefulset",
            Api::<StatefulSet>::all(client.clone()),
            Arc::new(WorkloadSync::<StatefulSet>::new(client.clone())),
            config.workers,
            Some(resync::DEFAULT),
        )
        .run(shutdown_rx.clone()),
    ));

    if config.knative_enabled {
        tasks.push(tokio::spawn(
            ReconcileRuntime::new(
                "knativeservice-binding",
                Api::<KnativeServiceBinding>::all(client.clone()),
                Arc::new(BindingSync::<KnativeService>::new(client.clone())),
                config.workers,
                Some(resync::DEFAULT),
            )
            .run(shutdown_rx.clone()),
        ));

        tasks.push(tokio::spawn(
            ReconcileRuntime::new(
                "knativeservice",
                Api::<KnativeService>::all(client.clone()),
                Arc::new(WorkloadSync::<KnativeService>::new(client.clone())),
                config.workers,
                Some(resync::DEFAULT),
            )
            .run(shutdown_rx.clone()),
        ));
    }

    let state = Arc::new(WebhookState {
        client: client.clone(),
        config: config.clone(),
    });
    tasks.push(tokio::spawn(start_server(
        config.server_port,
        state,
        shutdown_rx,
    )));

    for result in futures::future::try_join_all(tasks).await? {
        result?;
    }

    warn!("All controllers stopped");
    Ok(())
}
