// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::env;

use crate::selector;

/// Operator configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Name prefix for ConfigMaps that back materialized literal values
    pub configmap_prefix: String,
    /// Name prefix for Secrets that back materialized literal values
    pub secret_prefix: String,
    /// Container selector applied when a source declares none (admission path)
    pub default_container_selector: Option<LabelSelector>,
    /// Retention window for orphaned secret keys, in seconds
    pub key_removal_period_secs: i64,
    /// Worker loops per controller
    pub workers: usize,
    /// Port for the health and admission HTTP server
    pub server_port: u16,
    /// Whether the Knative Service controllers are started
    pub knative_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let configmap_prefix =
            env::var("KCONFIG_CONFIGMAP_PREFIX").unwrap_or_else(|_| "kc-".to_string());
        let secret_prefix =
            env::var("KCONFIG_SECRET_PREFIX").unwrap_or_else(|_| "ks-".to_string());

        let default_container_selector = match env::var("KCONFIG_DEFAULT_CONTAINER_SELECTOR") {
            Ok(raw) if !raw.is_empty() => Some(
                selector::parse_selector_string(&raw)
                    .context("KCONFIG_DEFAULT_CONTAINER_SELECTOR is not a valid selector")?,
            ),
            _ => None,
        };

        let key_removal_period_secs = env::var("KCONFIG_KEY_REMOVAL_PERIOD_SECS")
            .unwrap_or_else(|_| "3600".to_string())
            .parse()
            .context("KCONFIG_KEY_REMOVAL_PERIOD_SECS must be an integer")?;

        let workers = env::var("KCONFIG_WORKERS")
            .unwrap_or_else(|_| "2".to_string())
            .parse()
            .context("KCONFIG_WORKERS must be an integer")?;

        let server_port = env::var("KCONFIG_SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("KCONFIG_SERVER_PORT must be a port number")?;

        let knative_enabled: bool = env::var("KCONFIG_ENABLE_KNATIVE")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .unwrap_or(false);

        Ok(Config {
            configmap_prefix,
            secret_prefix,
            default_container_selector,
            key_removal_period_secs,
            workers,
            server_port,
            knative_enabled,
        })
    }
}
