// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifest documents and object identities.

use crate::constants::{annotations, DEFAULT_NAMESPACE};
use crate::error::{ReconcilerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Upstream component a manifest bundle belongs to
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Controller {
    Cilium,
    Hubble,
}

impl Controller {
    pub const ALL: [Controller; 2] = [Controller::Cilium, Controller::Hubble];

    pub fn as_str(&self) -> &'static str {
        match self {
            Controller::Cilium => "cilium",
            Controller::Hubble => "hubble",
        }
    }
}

impl fmt::Display for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Controller {
    type Err = ReconcilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cilium" => Ok(Controller::Cilium),
            "hubble" => Ok(Controller::Hubble),
            other => Err(ReconcilerError::Validation(format!(
                "unknown controller '{}', expected 'cilium' or 'hubble'",
                other
            ))),
        }
    }
}

/// Kubernetes kinds shipped in the bundles, with an opaque fallback for the rest
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Namespace,
    CustomResourceDefinition,
    ServiceAccount,
    ConfigMap,
    Secret,
    ClusterRole,
    ClusterRoleBinding,
    Role,
    RoleBinding,
    Service,
    PodDisruptionBudget,
    DaemonSet,
    Deployment,
    Job,
    CronJob,
    Other(String),
}

impl ResourceKind {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceKind::Namespace => "Namespace",
            ResourceKind::CustomResourceDefinition => "CustomResourceDefinition",
            ResourceKind::ServiceAccount => "ServiceAccount",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Secret => "Secret",
            ResourceKind::ClusterRole => "ClusterRole",
            ResourceKind::ClusterRoleBinding => "ClusterRoleBinding",
            ResourceKind::Role => "Role",
            ResourceKind::RoleBinding => "RoleBinding",
            ResourceKind::Service => "Service",
            ResourceKind::PodDisruptionBudget => "PodDisruptionBudget",
            ResourceKind::DaemonSet => "DaemonSet",
            ResourceKind::Deployment => "Deployment",
            ResourceKind::Job => "Job",
            ResourceKind::CronJob => "CronJob",
            ResourceKind::Other(kind) => kind,
        }
    }

    /// Lowercase plural resource name, `None` for kinds that need discovery
    pub fn plural(&self) -> Option<&'static str> {
        Some(match self {
            ResourceKind::Namespace => "namespaces",
            ResourceKind::CustomResourceDefinition => "customresourcedefinitions",
            ResourceKind::ServiceAccount => "serviceaccounts",
            ResourceKind::ConfigMap => "configmaps",
            ResourceKind::Secret => "secrets",
            ResourceKind::ClusterRole => "clusterroles",
            ResourceKind::ClusterRoleBinding => "clusterrolebindings",
            ResourceKind::Role => "roles",
            ResourceKind::RoleBinding => "rolebindings",
            ResourceKind::Service => "services",
            ResourceKind::PodDisruptionBudget => "poddisruptionbudgets",
            ResourceKind::DaemonSet => "daemonsets",
            ResourceKind::Deployment => "deployments",
            ResourceKind::Job => "jobs",
            ResourceKind::CronJob => "cronjobs",
            ResourceKind::Other(_) => return None,
        })
    }

    /// Whether the kind lives outside namespaces. Unknown kinds are treated as namespaced.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(
            self,
            ResourceKind::Namespace
                | ResourceKind::CustomResourceDefinition
                | ResourceKind::ClusterRole
                | ResourceKind::ClusterRoleBinding
        )
    }

    /// Dependency phase: objects in a lower phase are applied first and pruned last.
    pub fn apply_phase(&self) -> u8 {
        match self {
            ResourceKind::Namespace | ResourceKind::CustomResourceDefinition => 0,
            ResourceKind::ServiceAccount
            | ResourceKind::ConfigMap
            | ResourceKind::Secret
            | ResourceKind::ClusterRole
            | ResourceKind::Role => 1,
            ResourceKind::ClusterRoleBinding
            | ResourceKind::RoleBinding
            | ResourceKind::Service
            | ResourceKind::PodDisruptionBudget => 2,
            ResourceKind::DaemonSet
            | ResourceKind::Deployment
            | ResourceKind::Job
            | ResourceKind::CronJob => 3,
            // Custom resources need their CRDs
            ResourceKind::Other(_) => 4,
        }
    }
}

impl From<&str> for ResourceKind {
    fn from(kind: &str) -> Self {
        match kind {
            "Namespace" => ResourceKind::Namespace,
            "CustomResourceDefinition" => ResourceKind::CustomResourceDefinition,
            "ServiceAccount" => ResourceKind::ServiceAccount,
            "ConfigMap" => ResourceKind::ConfigMap,
            "Secret" => ResourceKind::Secret,
            "ClusterRole" => ResourceKind::ClusterRole,
            "ClusterRoleBinding" => ResourceKind::ClusterRoleBinding,
            "Role" => ResourceKind::Role,
            "RoleBinding" => ResourceKind::RoleBinding,
            "Service" => ResourceKind::Service,
            "PodDisruptionBudget" => ResourceKind::PodDisruptionBudget,
            "DaemonSet" => ResourceKind::DaemonSet,
            "Deployment" => ResourceKind::Deployment,
            "Job" => ResourceKind::Job,
            "CronJob" => ResourceKind::CronJob,
            other => ResourceKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ResourceKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ResourceKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let kind = String::deserialize(deserializer)?;
        Ok(ResourceKind::from(kind.as_str()))
    }
}

/// Identity of a cluster object: kind, namespace and name.
///
/// The apiVersion is carried along to address the object but is not part of
/// the identity, so a group/version bump between releases updates in place.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: ResourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectRef {
    pub fn new(api_version: &str, kind: ResourceKind, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind,
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    fn key(&self) -> (&ResourceKind, Option<&str>, &str) {
        (&self.kind, self.namespace.as_deref(), &self.name)
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ObjectRef {}

impl Hash for ObjectRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for ObjectRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// A single Kubernetes object from a release bundle
#[derive(Clone, Debug, PartialEq)]
pub struct ManifestDocument {
    pub controller: Controller,
    pub kind: ResourceKind,
    pub api_version: String,
    pub namespace: Option<String>,
    pub name: String,
    /// Full object tree as sent to the API server
    pub content: Value,
}

impl ManifestDocument {
    /// Build a document from a parsed object tree, defaulting the namespace
    /// of namespaced kinds.
    pub fn from_value(controller: Controller, mut content: Value) -> Result<Self> {
        let Some(obj) = content.as_object() else {
            return Err(ReconcilerError::Validation(
                "manifest document is not a mapping".to_string(),
            ));
        };

        let kind = required_str(obj.get("kind"), "kind")?;
        let api_version = required_str(obj.get("apiVersion"), "apiVersion")?;
        let metadata = obj.get("metadata");
        let name = required_str(metadata.and_then(|m| m.get("name")), "metadata.name")?;
        let declared_ns = metadata
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let kind = ResourceKind::from(kind.as_str());
        let namespace = if kind.is_cluster_scoped() {
            None
        } else {
            Some(declared_ns.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
        };

        if let Some(ns) = &namespace {
            content["metadata"]["namespace"] = Value::String(ns.clone());
        } else if let Some(meta) = content["metadata"].as_object_mut() {
            meta.remove("namespace");
        }

        Ok(Self {
            controller,
            kind,
            api_version,
            namespace,
            name,
            content,
        })
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace.clone(),
            name: self.name.clone(),
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        annotation(&self.content, key)
    }

    /// Objects holding generated material that must survive upgrades
    pub fn is_do_not_prune(&self) -> bool {
        self.annotation(annotations::DO_NOT_PRUNE) == Some("true")
    }
}

/// Read an annotation from any object tree
pub fn annotation<'a>(content: &'a Value, key: &str) -> Option<&'a str> {
    content
        .get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(key))
        .and_then(Value::as_str)
}

/// Read a label from any object tree
pub fn label<'a>(content: &'a Value, key: &str) -> Option<&'a str> {
    content
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(|l| l.get(key))
        .and_then(Value::as_str)
}

fn required_str(value: Option<&Value>, field: &str) -> Result<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ReconcilerError::Validation(format!("manifest document has no {}", field)))
}
