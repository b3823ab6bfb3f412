// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes annotation keys used by the operator
pub mod annotations {
    /// When set to "true" on a workload, enables env injection via its binding
    pub const ENABLED: &str = "kconfig.dev/enabled";
    /// Pod-template annotation holding the concatenated envRefsVersion fingerprint
    pub const ENV_REF_VERSIONS: &str = "kconfig.dev/env-ref-versions";
    /// When set to "true" on a workload, suppresses fingerprint-driven template refresh
    pub const DISABLE_TEMPLATE_REFRESH: &str = "kconfig.dev/disable-template-refresh";
    /// When set to "true" on a pod, enables admission-time env injection
    pub const INJECT: &str = "kconfig.dev/inject";
    /// When set to "true" on a pod, pre-existing container env is dropped before injection
    pub const EXCLUSIVE_ENV: &str = "kconfig.dev/exclusive-env";
    /// Prefix for per-source generation tracking annotations on bindings
    pub const GENERATION_PREFIX: &str = "kconfig.dev/generation.";
    /// Prefix for pending-removal marks on managed Secrets (suffix is the data key)
    pub const PENDING_REMOVAL_PREFIX: &str = "kconfig.dev/pending-removal.";
}

/// The operator name used for event reporting and server-side apply
pub const OPERATOR_NAME: &str = "kconfig-operator";

/// The API group of the operator's custom resources
pub const API_GROUP: &str = "kconfig.dev";

/// Event reasons published on Kconfig resources
pub mod events {
    /// Reason attached to warning events for dropped EnvConfig entries
    pub const INVALID_ENV_CONFIG: &str = "InvalidEnvConfig";
}

/// Wall-clock format of pending-removal expiry stamps
pub const PENDING_REMOVAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRDs
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Work queue retry tuning
pub mod queue {
    use std::time::Duration;

    /// First retry delay after a failed sync
    pub const BASE_DELAY: Duration = Duration::from_millis(500);
    /// Retry delay ceiling
    pub const MAX_DELAY: Duration = Duration::from_secs(60);
    /// Retries before an item is dropped until the next watch event or resync
    pub const MAX_RETRIES: u32 = 10;
}

/// Periodic resync intervals per controller
pub mod resync {
    use std::time::Duration;

    /// Kconfig / binding / workload controllers
    pub const DEFAULT: Duration = Duration::from_secs(300);
    /// Secret garbage collector, short so expiry sweeps run without watch traffic
    pub const SECRET_GC: Duration = Duration::from_secs(30);
}
