// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Moves a deployment scope from its applied release to the requested one.

use crate::catalog::{select, ReleaseCatalog};
use crate::config::DeploymentConfig;
use crate::error::Result;
use crate::kubernetes::{ClusterClient, StateStore};
use crate::manifests::render;
use crate::sync::applier::{ApplyReport, ClusterApplier, PruneReport};
use crate::sync::control::{CancelFlag, ScopeLocks};
use crate::types::manifest::{ManifestDocument, ObjectRef};
use crate::types::release::Version;
use crate::types::state::{validate_scope, AppliedState};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};

/// Where a scope's reconciliation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Selecting,
    Diffing,
    Applying,
    Pruning,
    Failed,
}

impl Phase {
    pub fn can_transition_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Idle | Failed, Selecting)
                | (Selecting, Diffing)
                | (Diffing, Applying)
                | (Applying, Pruning)
                | (Pruning, Idle)
                | (Selecting | Diffing | Applying, Failed)
        )
    }
}

/// Result of a committed reconciliation
#[derive(Debug)]
pub struct ReconcileReport {
    pub scope: String,
    pub from: Option<Version>,
    pub to: Version,
    /// Identities not in the previous state
    pub added: usize,
    /// Identities of the previous state no longer desired
    pub removed: usize,
    pub apply: ApplyReport,
    pub prune: PruneReport,
}

pub struct UpgradeReconciler<C, S> {
    catalog: Arc<ReleaseCatalog>,
    applier: ClusterApplier<C>,
    store: Arc<S>,
    locks: ScopeLocks,
    /// Scopes not `Idle`; a scope that settles is removed
    phases: Mutex<HashMap<String, Phase>>,
}

impl<C: ClusterClient, S: StateStore> UpgradeReconciler<C, S> {
    pub fn new(catalog: Arc<ReleaseCatalog>, applier: ClusterApplier<C>, store: Arc<S>) -> Self {
        Self {
            catalog,
            applier,
            store,
            locks: ScopeLocks::default(),
            phases: Mutex::new(HashMap::new()),
        }
    }

    pub fn phase(&self, scope: &str) -> Phase {
        self.phases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(scope)
            .copied()
            .unwrap_or(Phase::Idle)
    }

    /// Bring `scope` to the release and options in `config`.
    ///
    /// Applied state is committed only when apply and prune both complete; any
    /// other outcome leaves the previous state in place for the next attempt.
    /// Failures while pruning or committing return the scope to `Idle`, since
    /// everything desired is already live.
    #[instrument(skip(self, config, cancel))]
    pub async fn reconcile(
        &self,
        scope: &str,
        config: &DeploymentConfig,
        cancel: &CancelFlag,
    ) -> Result<ReconcileReport> {
        validate_scope(scope)?;
        let _guard = self.locks.acquire(scope).await;

        let result = self.run(scope, config, cancel).await;
        if let Err(e) = &result {
            let phase = self.phase(scope);
            error!("Reconciliation of scope {} failed while {:?}: {}", scope, phase, e);
            self.enter(scope, if phase == Phase::Pruning { Phase::Idle } else { Phase::Failed });
        }
        result
    }

    async fn run(
        &self,
        scope: &str,
        config: &DeploymentConfig,
        cancel: &CancelFlag,
    ) -> Result<ReconcileReport> {
        self.enter(scope, Phase::Selecting);
        let release = self.catalog.resolve(config.release.as_deref())?;
        let documents = render(select(release, "", "")?, config)?;
        let desired: BTreeSet<ObjectRef> = documents.iter().map(ManifestDocument::object_ref).collect();

        self.enter(scope, Phase::Diffing);
        let previous = self.store.load(scope).await?;
        let added = desired.difference(&previous.objects).count();
        let removed = previous.objects.difference(&desired).count();
        info!(
            "Scope {}: {} -> {}, {} objects to add, {} to remove",
            scope,
            previous.release.map(|v| v.to_string()).unwrap_or_else(|| "nothing".to_string()),
            release.version(),
            added,
            removed
        );

        self.enter(scope, Phase::Applying);
        let apply = self.applier.apply(&documents, cancel).await.into_result()?;

        self.enter(scope, Phase::Pruning);
        let prune = self
            .applier
            .prune(&previous.objects, &desired, cancel)
            .await
            .into_result()?;

        let state = AppliedState {
            scope: scope.to_string(),
            release: Some(release.version()),
            objects: desired,
        };
        self.store.save(&state).await?;
        self.enter(scope, Phase::Idle);

        Ok(ReconcileReport {
            scope: scope.to_string(),
            from: previous.release,
            to: release.version(),
            added,
            removed,
            apply,
            prune,
        })
    }

    fn enter(&self, scope: &str, next: Phase) {
        let mut phases = self.phases.lock().unwrap_or_else(|e| e.into_inner());
        let current = phases.get(scope).copied().unwrap_or(Phase::Idle);
        if !current.can_transition_to(next) {
            warn!("Unexpected phase change for scope {}: {:?} -> {:?}", scope, current, next);
        }
        if next == Phase::Idle {
            phases.remove(scope);
        } else {
            phases.insert(scope.to_string(), next);
        }
    }
}
