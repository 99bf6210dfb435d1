// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applies and prunes manifest documents against a cluster.

use crate::constants::{annotations, labels, retry, FIELD_MANAGER};
use crate::error::{ObjectFailure, ReconcilerError, Result};
use crate::kubernetes::ClusterClient;
use crate::sync::control::CancelFlag;
use crate::sync::diff::diff_paths;
use crate::types::manifest::{annotation, label, ManifestDocument, ObjectRef};
use futures::future::BoxFuture;
use futures::{stream, FutureExt, StreamExt};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Retry behaviour for a single object
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_transient_attempts: u32,
    pub max_conflict_retries: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_attempts: retry::MAX_TRANSIENT_ATTEMPTS,
            max_conflict_retries: retry::MAX_CONFLICT_RETRIES,
            base_backoff: Duration::from_millis(retry::BASE_BACKOFF_MS),
            max_backoff: Duration::from_millis(retry::MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based), doubling up to the cap
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Created,
    Updated { fields: Vec<String> },
    Unchanged,
    /// Live do-not-prune object left as is
    Preserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneOutcome {
    Deleted,
    /// Already gone
    Absent,
    /// Carries the do-not-prune annotation
    Retained,
    /// Not labelled as managed by us
    Unmanaged,
}

/// Per-object results of one batch
#[derive(Debug)]
pub struct BatchReport<O> {
    pub outcomes: Vec<(ObjectRef, O)>,
    pub failures: Vec<ObjectFailure>,
    /// Objects never started because of a fatal error or cancellation
    pub skipped: Vec<ObjectRef>,
    pub cancelled: bool,
}

pub type ApplyReport = BatchReport<ApplyOutcome>;
pub type PruneReport = BatchReport<PruneOutcome>;

impl<O> Default for BatchReport<O> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
            failures: Vec::new(),
            skipped: Vec::new(),
            cancelled: false,
        }
    }
}

impl<O> BatchReport<O> {
    /// Every object finished without error
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty() && !self.cancelled
    }

    pub fn count(&self, matches: impl Fn(&O) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| matches(o)).count()
    }

    /// Fail with the collected errors unless the batch completed
    pub fn into_result(self) -> Result<Self> {
        if !self.failures.is_empty() {
            Err(ReconcilerError::Batch(self.failures))
        } else if self.cancelled || !self.skipped.is_empty() {
            Err(ReconcilerError::Cancelled)
        } else {
            Ok(self)
        }
    }

    fn record(&mut self, target: ObjectRef, result: Option<Result<O>>) {
        match result {
            Some(Ok(outcome)) => self.outcomes.push((target, outcome)),
            Some(Err(error)) => self.failures.push(ObjectFailure { target, error }),
            None => self.skipped.push(target),
        }
    }
}

impl ApplyReport {
    /// Creates and patches issued
    pub fn mutations(&self) -> usize {
        self.count(|o| matches!(o, ApplyOutcome::Created | ApplyOutcome::Updated { .. }))
    }
}

/// Drives documents into the cluster phase by phase
pub struct ClusterApplier<C> {
    client: Arc<C>,
    concurrency: usize,
    retry: RetryPolicy,
}

impl<C: ClusterClient> ClusterApplier<C> {
    pub fn new(client: Arc<C>, concurrency: usize) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Create, update or leave each document as is.
    ///
    /// Phases run in order with up to `concurrency` objects in flight within a
    /// phase. A permission error stops any object not yet started; other
    /// failures are collected and the batch carries on.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn apply(&self, documents: &[ManifestDocument], cancel: &CancelFlag) -> ApplyReport {
        let mut phases: BTreeMap<u8, Vec<&ManifestDocument>> = BTreeMap::new();
        for doc in documents {
            phases.entry(doc.kind.apply_phase()).or_default().push(doc);
        }

        let halted = AtomicBool::new(false);
        let mut report = ApplyReport::default();

        for (phase, docs) in phases {
            debug!("Applying phase {} ({} objects)", phase, docs.len());
            let work: Vec<BoxFuture<'_, (ObjectRef, Option<Result<ApplyOutcome>>)>> = docs
                .into_iter()
                .map(|doc| guarded(doc.object_ref(), self.apply_one(doc), &halted, cancel).boxed())
                .collect();
            let results: Vec<_> = stream::iter(work)
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (target, result) in results {
                report.record(target, result);
            }
        }

        report.cancelled = cancel.is_cancelled();
        info!(
            "Applied {} objects: {} created, {} updated, {} failed, {} skipped",
            report.outcomes.len(),
            report.count(|o| *o == ApplyOutcome::Created),
            report.count(|o| matches!(o, ApplyOutcome::Updated { .. })),
            report.failures.len(),
            report.skipped.len()
        );
        report
    }

    /// Delete every identity in `previous` that is not in `desired`, last phase first
    #[instrument(skip_all, fields(previous = previous.len(), desired = desired.len()))]
    pub async fn prune(
        &self,
        previous: &BTreeSet<ObjectRef>,
        desired: &BTreeSet<ObjectRef>,
        cancel: &CancelFlag,
    ) -> PruneReport {
        let mut phases: BTreeMap<u8, Vec<&ObjectRef>> = BTreeMap::new();
        for target in previous.difference(desired) {
            phases.entry(target.kind.apply_phase()).or_default().push(target);
        }

        let halted = AtomicBool::new(false);
        let mut report = PruneReport::default();

        for (phase, targets) in phases.into_iter().rev() {
            debug!("Pruning phase {} ({} objects)", phase, targets.len());
            let work: Vec<BoxFuture<'_, (ObjectRef, Option<Result<PruneOutcome>>)>> = targets
                .into_iter()
                .map(|target| guarded(target.clone(), self.prune_one(target), &halted, cancel).boxed())
                .collect();
            let results: Vec<_> = stream::iter(work)
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            for (target, result) in results {
                report.record(target, result);
            }
        }

        report.cancelled = cancel.is_cancelled();
        info!(
            "Pruned {} objects, {} retained, {} failed",
            report.count(|o| *o == PruneOutcome::Deleted),
            report.count(|o| *o == PruneOutcome::Retained),
            report.failures.len()
        );
        report
    }

    async fn apply_one(&self, doc: &ManifestDocument) -> Result<ApplyOutcome> {
        let target = doc.object_ref();
        let mut conflicts = 0;
        loop {
            match self.converge(doc, &target).await {
                Err(ReconcilerError::Conflict(message)) if conflicts < self.retry.max_conflict_retries => {
                    conflicts += 1;
                    warn!("Conflict on {}, re-reading: {}", target, message);
                }
                result => return result,
            }
        }
    }

    async fn converge(&self, doc: &ManifestDocument, target: &ObjectRef) -> Result<ApplyOutcome> {
        let Some(live) = self.retrying(target, || self.client.get(target)).await? else {
            self.retrying(target, || self.client.create(doc)).await?;
            info!("Created {}", target);
            return Ok(ApplyOutcome::Created);
        };

        if doc.is_do_not_prune()
            && doc.annotation(annotations::ROTATION) == annotation(&live, annotations::ROTATION)
        {
            debug!("Keeping live {}", target);
            return Ok(ApplyOutcome::Preserved);
        }

        let fields = diff_paths(&doc.content, &live);
        if fields.is_empty() {
            debug!("{} is up to date", target);
            return Ok(ApplyOutcome::Unchanged);
        }

        self.retrying(target, || self.client.patch(doc)).await?;
        info!("Updated {} ({})", target, fields.join(", "));
        Ok(ApplyOutcome::Updated { fields })
    }

    async fn prune_one(&self, target: &ObjectRef) -> Result<PruneOutcome> {
        let Some(live) = self.retrying(target, || self.client.get(target)).await? else {
            return Ok(PruneOutcome::Absent);
        };

        if annotation(&live, annotations::DO_NOT_PRUNE) == Some("true") {
            info!("Retaining {}", target);
            return Ok(PruneOutcome::Retained);
        }
        if label(&live, labels::MANAGED_BY) != Some(FIELD_MANAGER) {
            warn!("Not pruning {}: not managed by {}", target, FIELD_MANAGER);
            return Ok(PruneOutcome::Unmanaged);
        }

        self.retrying(target, || self.client.delete(target)).await?;
        info!("Deleted {}", target);
        Ok(PruneOutcome::Deleted)
    }

    async fn retrying<T, F, Fut>(&self, target: &ObjectRef, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_transient() && attempt + 1 < self.retry.max_transient_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!("Transient error on {}, retrying in {:?}: {}", target, delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

/// Run `work` unless the batch was halted or cancelled; a fatal error halts the batch
async fn guarded<T>(
    target: ObjectRef,
    work: impl Future<Output = Result<T>>,
    halted: &AtomicBool,
    cancel: &CancelFlag,
) -> (ObjectRef, Option<Result<T>>) {
    if cancel.is_cancelled() || halted.load(Ordering::SeqCst) {
        return (target, None);
    }
    let result = work.await;
    if let Err(e) = &result {
        if e.is_fatal() {
            error!("Stopping batch after {}: {}", target, e);
            halted.store(true, Ordering::SeqCst);
        }
    }
    (target, Some(result))
}
