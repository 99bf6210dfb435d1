// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::manifest::ObjectRef;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcilerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transient cluster error: {0}")]
    TransientCluster(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("State store error: {0}")]
    StateStore(String),

    #[error("Reconciliation cancelled")]
    Cancelled,

    #[error("{} object(s) failed: {}", .0.len(), summarize(.0))]
    Batch(Vec<ObjectFailure>),

    #[error("Checksum verification failed for {asset}: {reason}")]
    Checksum { asset: String, reason: String },

    #[error("Download failed: {0}")]
    Fetch(String),
}

impl ReconcilerError {
    /// Errors worth retrying with backoff inside a single reconciliation
    pub fn is_transient(&self) -> bool {
        matches!(self, ReconcilerError::TransientCluster(_))
    }

    /// Errors that stop a batch immediately
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReconcilerError::Permission(_))
    }
}

/// A single object that could not be applied or pruned
#[derive(Debug)]
pub struct ObjectFailure {
    pub target: ObjectRef,
    pub error: ReconcilerError,
}

impl std::fmt::Display for ObjectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.target, self.error)
    }
}

fn summarize(failures: &[ObjectFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<serde_json::Error> for ReconcilerError {
    fn from(e: serde_json::Error) -> Self {
        ReconcilerError::Validation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcilerError>;
