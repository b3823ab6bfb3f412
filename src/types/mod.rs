// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types and the workload abstraction over binding targets.

pub mod binding;
pub mod kconfig;
pub mod knative;
pub mod workload;

pub use binding::{
    BindingResource, DeploymentBinding, KconfigEnvs, KnativeServiceBinding, StatefulSetBinding,
};
pub use kconfig::{EnvConfig, EnvEntry, Kconfig, KconfigSpec};
pub use knative::Service as KnativeService;
pub use workload::WorkloadTarget;
