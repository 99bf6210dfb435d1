// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::error::{ReconcilerError, Result};
use crate::types::manifest::ObjectRef;
use crate::types::release::Version;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What is live in one deployment scope, as of the last successful reconciliation
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppliedState {
    pub scope: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<Version>,
    #[serde(default)]
    pub objects: BTreeSet<ObjectRef>,
}

impl AppliedState {
    /// State of a scope nothing has been applied to yet
    pub fn empty(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            ..Default::default()
        }
    }
}

/// Scopes name a ConfigMap, so they follow DNS label rules
pub fn validate_scope(scope: &str) -> Result<()> {
    let valid = !scope.is_empty()
        && scope.len() <= 63
        && scope.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        && !scope.starts_with('-')
        && !scope.ends_with('-');
    if valid {
        Ok(())
    } else {
        Err(ReconcilerError::Validation(format!(
            "scope '{}' must be a lowercase DNS label",
            scope
        )))
    }
}
