// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Persistence of applied state between reconciliations

use crate::constants::{labels, FIELD_MANAGER, STATE_CONFIG_MAP_PREFIX, STATE_DATA_KEY};
use crate::error::{ReconcilerError, Result};
use crate::types::state::AppliedState;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{ObjectMeta, Patch, PatchParams},
    Api, Client,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Last committed state of `scope`; an empty state when nothing was stored
    async fn load(&self, scope: &str) -> Result<AppliedState>;
    async fn save(&self, state: &AppliedState) -> Result<()>;
}

/// Stores each scope's state as JSON in its own ConfigMap
pub struct ConfigMapStateStore {
    client: Client,
    namespace: String,
    timeout: Duration,
}

impl ConfigMapStateStore {
    pub fn new(client: Client, namespace: &str, timeout: Duration) -> Self {
        Self {
            client,
            namespace: namespace.to_string(),
            timeout,
        }
    }

    fn api(&self) -> Api<ConfigMap> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    /// Run an API call on the state ConfigMap `name` under the per-call timeout
    async fn bounded<T>(&self, action: &str, name: &str, call: impl Future<Output = kube::Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| {
                ReconcilerError::StateStore(format!("Failed to {} {}/{}: {}", action, self.namespace, name, e))
            }),
            Err(_) => Err(ReconcilerError::StateStore(format!(
                "Timed out after {}s trying to {} {}/{}",
                self.timeout.as_secs_f32(),
                action,
                self.namespace,
                name
            ))),
        }
    }
}

pub fn state_config_map_name(scope: &str) -> String {
    format!("{}{}", STATE_CONFIG_MAP_PREFIX, scope)
}

#[async_trait]
impl StateStore for ConfigMapStateStore {
    #[instrument(skip(self))]
    async fn load(&self, scope: &str) -> Result<AppliedState> {
        let name = state_config_map_name(scope);
        let api = self.api();
        let config_map = self.bounded("read", &name, api.get_opt(&name)).await?;

        let Some(raw) = config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(STATE_DATA_KEY))
        else {
            debug!("No applied state stored for scope {}", scope);
            return Ok(AppliedState::empty(scope));
        };

        let state: AppliedState = serde_json::from_str(&raw).map_err(|e| {
            ReconcilerError::StateStore(format!("Corrupt applied state in {}/{}: {}", self.namespace, name, e))
        })?;
        if state.scope != scope {
            return Err(ReconcilerError::StateStore(format!(
                "{}/{} holds state for scope '{}'",
                self.namespace, name, state.scope
            )));
        }
        Ok(state)
    }

    #[instrument(skip(self, state), fields(scope = %state.scope))]
    async fn save(&self, state: &AppliedState) -> Result<()> {
        let name = state_config_map_name(&state.scope);
        let config_map = ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    labels::MANAGED_BY.to_string(),
                    FIELD_MANAGER.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([(
                STATE_DATA_KEY.to_string(),
                serde_json::to_string(state)?,
            )])),
            ..Default::default()
        };

        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let api = self.api();
        self.bounded("write", &name, api.patch(&name, &pp, &Patch::Apply(&config_map)))
            .await?;

        info!(
            "Stored applied state for scope {}: release {}, {} objects",
            state.scope,
            state.release.map(|v| v.to_string()).unwrap_or_else(|| "none".to_string()),
            state.objects.len()
        );
        Ok(())
    }
}
