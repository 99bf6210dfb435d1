// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applying releases to a cluster and tracking what was applied.

pub mod applier;
pub mod control;
pub mod diff;
pub mod upgrade;

pub use applier::{ApplyOutcome, ApplyReport, ClusterApplier, PruneOutcome, PruneReport, RetryPolicy};
pub use control::{CancelFlag, ScopeLocks};
pub use upgrade::{Phase, ReconcileReport, UpgradeReconciler};
