// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deployment reconciler - watches deployment ConfigMaps and reconciles their scope.

use crate::config::{Config, DeploymentConfig};
use crate::constants::{labels, ERROR_REQUEUE_SECS};
use crate::error::{ReconcilerError, Result};
use crate::kubernetes::{ConfigMapStateStore, KubeClusterClient};
use crate::sync::{CancelFlag, UpgradeReconciler};
use crate::types::state::validate_scope;
use futures::StreamExt;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    runtime::{controller::Action, Controller},
    Api, Client, ResourceExt,
};
use kube_runtime::watcher::Config as WatcherConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub type KubeUpgradeReconciler = UpgradeReconciler<KubeClusterClient, ConfigMapStateStore>;

pub struct DeploymentReconciler {
    client: Client,
    config: Config,
    upgrader: Arc<KubeUpgradeReconciler>,
    shutdown: CancelFlag,
}

impl DeploymentReconciler {
    pub fn new(
        client: Client,
        config: Config,
        upgrader: Arc<KubeUpgradeReconciler>,
        shutdown: CancelFlag,
    ) -> Self {
        Self {
            client,
            config,
            upgrader,
            shutdown,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let config_maps: Api<ConfigMap> =
            Api::namespaced(self.client.clone(), &self.config.config_namespace);
        let selector = format!("{}=true", labels::DEPLOYMENT);
        info!(
            "Watching ConfigMaps labelled {} in namespace {}",
            selector, self.config.config_namespace
        );
        let context = Arc::new(self);

        Controller::new(config_maps, WatcherConfig::default().labels(&selector))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled deployment: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// Scope name and deployment options carried by a deployment ConfigMap
pub fn deployment_options(config_map: &ConfigMap) -> Result<(String, DeploymentConfig)> {
    let scope = config_map.name_any();
    let options = match &config_map.data {
        Some(data) => DeploymentConfig::from_data(data)?,
        None => DeploymentConfig::default(),
    };
    Ok((scope, options))
}

async fn reconcile(config_map: Arc<ConfigMap>, ctx: Arc<DeploymentReconciler>) -> Result<Action> {
    let (scope, options) = deployment_options(&config_map)?;
    // Not every ConfigMap name is a valid scope; wait for a change instead of requeueing
    if let Err(e) = validate_scope(&scope) {
        warn!("Ignoring deployment ConfigMap {}: {}", scope, e);
        return Ok(Action::await_change());
    }
    debug!("Reconciling deployment scope: {}", scope);

    let report = ctx.upgrader.reconcile(&scope, &options, &ctx.shutdown).await?;
    info!(
        "Scope {} is at {}: {} changed, {} pruned",
        scope,
        report.to,
        report.apply.mutations(),
        report.removed
    );

    Ok(Action::await_change())
}

fn error_policy(
    config_map: Arc<ConfigMap>,
    error: &ReconcilerError,
    _ctx: Arc<DeploymentReconciler>,
) -> Action {
    error!("Reconciliation of {} failed: {}", config_map.name_any(), error);
    Action::requeue(Duration::from_secs(ERROR_REQUEUE_SECS))
}
