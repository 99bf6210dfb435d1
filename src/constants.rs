// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Kubernetes label keys and values stamped on every applied object
pub mod labels {
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Controller bundle ("cilium" or "hubble") the object was rendered from
    pub const MANIFEST: &str = "cilium-reconciler.io/manifest";
    /// Marks a ConfigMap holding deployment options for controller mode
    pub const DEPLOYMENT: &str = "cilium-reconciler.io/deployment";
}

/// Kubernetes annotation keys understood by the applier
pub mod annotations {
    /// When set to "true", the object survives upgrades and is never overwritten
    pub const DO_NOT_PRUNE: &str = "cilium-reconciler.io/do-not-prune";
    /// Bumping this value on a do-not-prune object forces it to be re-applied
    pub const ROTATION: &str = "cilium-reconciler.io/rotation";
}

/// The field manager name used for server-side apply
pub const FIELD_MANAGER: &str = "cilium-reconciler";

/// Namespace for namespaced documents that don't set one
pub const DEFAULT_NAMESPACE: &str = "kube-system";

/// Name of the agent ConfigMap mutated by deployment options
pub const CILIUM_CONFIG_MAP: &str = "cilium-config";

/// Prefix of the ConfigMap that persists applied state for a scope
pub const STATE_CONFIG_MAP_PREFIX: &str = "cilium-reconciler-state-";

/// Data key holding the serialized applied state
pub const STATE_DATA_KEY: &str = "applied-state.json";

/// Retry configuration for cluster API calls
pub mod retry {
    /// Attempts for transient errors (timeouts, missing namespace)
    pub const MAX_TRANSIENT_ATTEMPTS: u32 = 4;
    /// Extra attempts after a conflict
    pub const MAX_CONFLICT_RETRIES: u32 = 1;
    /// Initial backoff in milliseconds
    pub const BASE_BACKOFF_MS: u64 = 250;
    /// Maximum backoff in milliseconds (exponential backoff cap)
    pub const MAX_BACKOFF_MS: u64 = 4_000;
}

/// Seconds to wait before a failed controller-mode reconcile is retried
pub const ERROR_REQUEUE_SECS: u64 = 60;
