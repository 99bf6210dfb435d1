// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Controller and resource-kind filtering over a release

use crate::error::{ReconcilerError, Result};
use crate::types::manifest::{Controller, ManifestDocument};
use crate::types::release::Release;
use std::collections::BTreeSet;

/// Filters documents by controller tag and kind. Empty filters match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceSelector {
    controller: Option<Controller>,
    /// Lowercased kind names
    kinds: BTreeSet<String>,
}

impl ResourceSelector {
    /// Build a selector from a controller name and a space-separated list of kinds
    pub fn new(controller_filter: &str, resource_kind_filter: &str) -> Result<Self> {
        let controller_filter = controller_filter.trim();
        let controller = if controller_filter.is_empty() {
            None
        } else {
            Some(controller_filter.parse()?)
        };

        let kinds = resource_kind_filter
            .split_whitespace()
            .map(|kind| {
                if is_kind_name(kind) {
                    Ok(kind.to_ascii_lowercase())
                } else {
                    Err(ReconcilerError::Validation(format!(
                        "'{}' is not a Kubernetes resource kind",
                        kind
                    )))
                }
            })
            .collect::<Result<BTreeSet<_>>>()?;

        Ok(Self { controller, kinds })
    }

    pub fn matches(&self, doc: &ManifestDocument) -> bool {
        let controller_ok = self.controller.map_or(true, |c| c == doc.controller);
        let kind_ok = self.kinds.is_empty()
            || self.kinds.contains(&doc.kind.as_str().to_ascii_lowercase());
        controller_ok && kind_ok
    }

    /// Matching documents in release order
    pub fn select(&self, release: &Release) -> Vec<ManifestDocument> {
        release
            .documents()
            .filter(|doc| self.matches(doc))
            .cloned()
            .collect()
    }
}

/// Documents of `release` matching both filters
pub fn select(
    release: &Release,
    controller_filter: &str,
    resource_kind_filter: &str,
) -> Result<Vec<ManifestDocument>> {
    Ok(ResourceSelector::new(controller_filter, resource_kind_filter)?.select(release))
}

fn is_kind_name(token: &str) -> bool {
    let mut chars = token.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic()) && chars.all(|c| c.is_ascii_alphanumeric())
}
