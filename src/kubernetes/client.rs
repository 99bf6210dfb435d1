// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Untyped cluster access for manifest documents

use crate::constants::FIELD_MANAGER;
use crate::error::{ReconcilerError, Result};
use crate::types::manifest::{ManifestDocument, ObjectRef};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
    core::GroupVersionKind,
    discovery::{self, ApiResource, Scope},
    Client,
};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, instrument};

/// The calls the applier needs from a cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Live object tree, `None` when absent
    async fn get(&self, target: &ObjectRef) -> Result<Option<Value>>;
    async fn create(&self, doc: &ManifestDocument) -> Result<()>;
    /// Server-side apply of the full document
    async fn patch(&self, doc: &ManifestDocument) -> Result<()>;
    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(&self, target: &ObjectRef) -> Result<()>;
}

/// [`ClusterClient`] backed by the Kubernetes API server
pub struct KubeClusterClient {
    client: Client,
    timeout: Duration,
    /// Discovery results for kinds without a static mapping, keyed by apiVersion and kind
    discovered: Mutex<HashMap<(String, String), (ApiResource, bool)>>,
}

impl KubeClusterClient {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            discovered: Mutex::new(HashMap::new()),
        }
    }

    async fn api_for(&self, target: &ObjectRef) -> Result<Api<DynamicObject>> {
        let (resource, cluster_scoped) = self.resolve(target).await?;
        Ok(match (&target.namespace, cluster_scoped) {
            (Some(ns), false) => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        })
    }

    async fn resolve(&self, target: &ObjectRef) -> Result<(ApiResource, bool)> {
        let (group, version) = split_api_version(&target.api_version);
        let gvk = GroupVersionKind::gvk(group, version, target.kind.as_str());

        if let Some(plural) = target.kind.plural() {
            return Ok((
                ApiResource::from_gvk_with_plural(&gvk, plural),
                target.kind.is_cluster_scoped(),
            ));
        }

        let key = (target.api_version.clone(), target.kind.as_str().to_string());
        if let Some(hit) = self.discovered.lock().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Ok(hit.clone());
        }

        debug!("Discovering API resource for {} {}", target.api_version, target.kind);
        let (resource, caps) = self
            .bounded(discovery::pinned_kind(&self.client, &gvk))
            .await?;
        let resolved = (resource, caps.scope == Scope::Cluster);
        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Run an API call under the per-call timeout, classifying its error
    async fn bounded<T>(&self, call: impl Future<Output = kube::Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(classify),
            Err(_) => Err(ReconcilerError::TransientCluster(format!(
                "API call timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(object = %target))]
    async fn get(&self, target: &ObjectRef) -> Result<Option<Value>> {
        let api = self.api_for(target).await?;
        let live = self.bounded(api.get_opt(&target.name)).await?;
        live.map(serde_json::to_value).transpose().map_err(Into::into)
    }

    #[instrument(skip(self, doc), fields(object = %doc.object_ref()))]
    async fn create(&self, doc: &ManifestDocument) -> Result<()> {
        let api = self.api_for(&doc.object_ref()).await?;
        let object: DynamicObject = serde_json::from_value(doc.content.clone())?;
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.bounded(api.create(&pp, &object)).await?;
        Ok(())
    }

    #[instrument(skip(self, doc), fields(object = %doc.object_ref()))]
    async fn patch(&self, doc: &ManifestDocument) -> Result<()> {
        let api = self.api_for(&doc.object_ref()).await?;
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        self.bounded(api.patch(&doc.name, &pp, &Patch::Apply(&doc.content)))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(object = %target))]
    async fn delete(&self, target: &ObjectRef) -> Result<()> {
        let api = self.api_for(target).await?;
        match tokio::time::timeout(self.timeout, api.delete(&target.name, &DeleteParams::background())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(kube::Error::Api(err))) if err.code == 404 => {
                debug!("{} already gone", target);
                Ok(())
            }
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(ReconcilerError::TransientCluster(format!(
                "delete of {} timed out",
                target
            ))),
        }
    }
}

/// Split `group/version` into its parts; the core group is empty
pub fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Map a kube error onto the reconciler taxonomy
pub fn classify(error: kube::Error) -> ReconcilerError {
    match error {
        kube::Error::Api(response) => {
            let message = format!("{} ({})", response.message, response.reason);
            match response.code {
                401 | 403 => ReconcilerError::Permission(message),
                // On writes a 404 means the target namespace does not exist yet
                404 | 408 | 429 | 500..=599 => ReconcilerError::TransientCluster(message),
                409 => ReconcilerError::Conflict(message),
                400 | 422 => ReconcilerError::Validation(message),
                _ => ReconcilerError::KubeError(kube::Error::Api(response)),
            }
        }
        kube::Error::HyperError(e) => ReconcilerError::TransientCluster(e.to_string()),
        kube::Error::Service(e) => ReconcilerError::TransientCluster(e.to_string()),
        other => ReconcilerError::KubeError(other),
    }
}
