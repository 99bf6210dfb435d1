// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Known upstream releases and document selection.

mod embedded;
pub mod selector;

pub use selector::{select, ResourceSelector};

use crate::error::{ReconcilerError, Result};
use crate::manifests::parse_bundle;
use crate::types::release::{BinaryResource, Release, Version};
use std::collections::BTreeMap;
use tracing::debug;

/// Read-only set of releases, newest first
#[derive(Debug, Clone)]
pub struct ReleaseCatalog {
    releases: Vec<Release>,
}

impl ReleaseCatalog {
    pub fn new(mut releases: Vec<Release>) -> Result<Self> {
        releases.sort_by(|a, b| b.version().cmp(&a.version()));
        if let Some(pair) = releases.windows(2).find(|w| w[0].version() == w[1].version()) {
            return Err(ReconcilerError::Validation(format!(
                "release {} is listed more than once",
                pair[0].version()
            )));
        }
        Ok(Self { releases })
    }

    /// Catalog of the bundles compiled into this binary
    pub fn embedded() -> Result<Self> {
        let mut releases = Vec::with_capacity(embedded::RELEASES.len());

        for entry in embedded::RELEASES {
            let mut documents = BTreeMap::new();
            for (controller, source) in entry.bundles {
                documents.insert(*controller, parse_bundle(*controller, source)?);
            }
            let binaries = entry
                .binaries
                .iter()
                .map(|b| BinaryResource {
                    name: b.name.to_string(),
                    repository: b.repository.to_string(),
                    version: b.version,
                    asset_prefix: b.asset_prefix.to_string(),
                })
                .collect();

            let release = Release::new(entry.version, documents, binaries)?;
            debug!(
                "Loaded release {} with {} documents",
                release.version(),
                release.documents().count()
            );
            releases.push(release);
        }

        Self::new(releases)
    }

    /// Releases ordered newest first
    pub fn list_releases(&self) -> impl Iterator<Item = &Release> {
        self.releases.iter()
    }

    pub fn get_release(&self, version: &str) -> Result<&Release> {
        let wanted: Version = version.parse()?;
        self.releases
            .iter()
            .find(|r| r.version() == wanted)
            .ok_or_else(|| ReconcilerError::NotFound(format!("release {} is not in the catalog", wanted)))
    }

    pub fn latest(&self) -> Result<&Release> {
        self.releases
            .first()
            .ok_or_else(|| ReconcilerError::NotFound("the release catalog is empty".to_string()))
    }

    /// The requested release, or the newest one when nothing was requested
    pub fn resolve(&self, requested: Option<&str>) -> Result<&Release> {
        match requested {
            Some(version) => self.get_release(version),
            None => self.latest(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::manifest::{Controller, ResourceKind};

    #[test]
    fn test_embedded_catalog_lists_newest_first() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        let versions: Vec<String> = catalog.list_releases().map(|r| r.version().to_string()).collect();
        assert_eq!(versions, vec!["1.16.10", "1.14.11"]);

        // Restartable
        assert_eq!(catalog.list_releases().count(), 2);
    }

    #[test]
    fn test_get_release_accepts_v_prefix() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        assert_eq!(catalog.get_release("v1.14.11").unwrap().version(), Version::new(1, 14, 11));
    }

    #[test]
    fn test_get_release_unknown_version() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        assert!(matches!(catalog.get_release("1.15.0"), Err(ReconcilerError::NotFound(_))));
        assert!(matches!(catalog.get_release("one"), Err(ReconcilerError::Validation(_))));
    }

    #[test]
    fn test_resolve_defaults_to_latest() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        assert_eq!(catalog.resolve(None).unwrap().version(), Version::new(1, 16, 10));
    }

    #[test]
    fn test_empty_catalog_has_no_latest() {
        let catalog = ReleaseCatalog::new(vec![]).unwrap();
        assert!(matches!(catalog.latest(), Err(ReconcilerError::NotFound(_))));
    }

    #[test]
    fn test_new_rejects_duplicate_versions() {
        let release = Release::new(Version::new(1, 0, 0), BTreeMap::new(), vec![]).unwrap();
        assert!(ReleaseCatalog::new(vec![release.clone(), release]).is_err());
    }

    #[test]
    fn test_embedded_releases_carry_both_bundles_and_clis() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        for release in catalog.list_releases() {
            assert!(!release.documents_for(Controller::Cilium).is_empty());
            assert!(!release.documents_for(Controller::Hubble).is_empty());

            let names: Vec<&str> = release.binaries().iter().map(|b| b.name.as_str()).collect();
            assert_eq!(names, vec!["cilium", "hubble"]);
        }
    }

    #[test]
    fn test_embedded_agent_daemonset_matches_release() {
        let catalog = ReleaseCatalog::embedded().unwrap();
        let release = catalog.get_release("1.16.10").unwrap();
        let agent = release
            .documents_for(Controller::Cilium)
            .iter()
            .find(|d| d.kind == ResourceKind::DaemonSet && d.name == "cilium")
            .unwrap();

        assert_eq!(
            agent.content["spec"]["template"]["spec"]["containers"][0]["image"],
            "quay.io/cilium/cilium:v1.16.10"
        );
    }
}
