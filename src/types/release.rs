// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Upstream releases: versions, manifest bundles and CLI resources.

use crate::error::{ReconcilerError, Result};
use crate::types::manifest::{Controller, ManifestDocument, ObjectRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A `MAJOR.MINOR.PATCH` release identifier, accepted with or without a leading `v`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }
}

impl FromStr for Version {
    type Err = ReconcilerError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts: Vec<&str> = raw.split('.').collect();
        let invalid = || ReconcilerError::Validation(format!("invalid release version '{}'", s));

        let [major, minor, patch] = parts.as_slice() else {
            return Err(invalid());
        };

        Ok(Version {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
            patch: patch.parse().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = ReconcilerError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A CLI binary published on GitHub alongside a release
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryResource {
    /// Resource name, also the installed binary name
    pub name: String,
    /// GitHub `owner/repo` the CLI is released from
    pub repository: String,
    /// CLI version, which does not follow the Cilium release number
    pub version: Version,
    /// Asset file name prefix, e.g. `cilium` for `cilium-linux-amd64.tar.gz`
    pub asset_prefix: String,
}

/// An immutable upstream release with its manifests and CLI resources
#[derive(Clone, Debug)]
pub struct Release {
    version: Version,
    documents: BTreeMap<Controller, Vec<ManifestDocument>>,
    binaries: Vec<BinaryResource>,
}

impl Release {
    /// Build a release, rejecting bundles that declare the same object twice
    pub fn new(
        version: Version,
        documents: BTreeMap<Controller, Vec<ManifestDocument>>,
        binaries: Vec<BinaryResource>,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for (controller, docs) in &documents {
            for doc in docs {
                if doc.controller != *controller {
                    return Err(ReconcilerError::Validation(format!(
                        "{} is tagged {} but bundled with {}",
                        doc.object_ref(),
                        doc.controller,
                        controller
                    )));
                }
                if !seen.insert(doc.object_ref()) {
                    return Err(ReconcilerError::Validation(format!(
                        "release {} declares {} more than once",
                        version,
                        doc.object_ref()
                    )));
                }
            }
        }

        Ok(Self {
            version,
            documents,
            binaries,
        })
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn binaries(&self) -> &[BinaryResource] {
        &self.binaries
    }

    /// Documents of one controller bundle
    pub fn documents_for(&self, controller: Controller) -> &[ManifestDocument] {
        self.documents
            .get(&controller)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// All documents, grouped by controller in bundle order
    pub fn documents(&self) -> impl Iterator<Item = &ManifestDocument> {
        self.documents.values().flatten()
    }

    pub fn identities(&self) -> impl Iterator<Item = ObjectRef> + '_ {
        self.documents().map(ManifestDocument::object_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(controller: Controller, name: &str) -> ManifestDocument {
        ManifestDocument::from_value(
            controller,
            json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": name}}),
        )
        .unwrap()
    }

    #[test]
    fn test_version_parse_with_and_without_prefix() {
        assert_eq!("1.16.10".parse::<Version>().unwrap(), Version::new(1, 16, 10));
        assert_eq!("v1.14.11".parse::<Version>().unwrap(), Version::new(1, 14, 11));
    }

    #[test]
    fn test_version_parse_rejects_garbage() {
        for bad in ["", "1.16", "1.16.x", "1.16.10.1", "latest"] {
            assert!(bad.parse::<Version>().is_err(), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_version_orders_numerically() {
        let older: Version = "1.9.18".parse().unwrap();
        let newer: Version = "1.14.11".parse().unwrap();
        assert!(older < newer);
    }

    #[test]
    fn test_version_serializes_as_string() {
        let v = Version::new(1, 16, 10);
        assert_eq!(serde_json::to_value(v).unwrap(), json!("1.16.10"));
        let back: Version = serde_json::from_value(json!("v1.16.10")).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn test_release_rejects_duplicate_identities() {
        let documents = BTreeMap::from([
            (Controller::Cilium, vec![config_map(Controller::Cilium, "shared")]),
            (Controller::Hubble, vec![config_map(Controller::Hubble, "shared")]),
        ]);

        let err = Release::new(Version::new(1, 0, 0), documents, vec![]).unwrap_err();
        assert!(matches!(err, ReconcilerError::Validation(m) if m.contains("more than once")));
    }

    #[test]
    fn test_release_rejects_mistagged_documents() {
        let documents = BTreeMap::from([(
            Controller::Cilium,
            vec![config_map(Controller::Hubble, "relay")],
        )]);

        assert!(Release::new(Version::new(1, 0, 0), documents, vec![]).is_err());
    }

    #[test]
    fn test_documents_for_missing_controller_is_empty() {
        let documents = BTreeMap::from([(
            Controller::Cilium,
            vec![config_map(Controller::Cilium, "cilium-config")],
        )]);
        let release = Release::new(Version::new(1, 0, 0), documents, vec![]).unwrap();

        assert!(release.documents_for(Controller::Hubble).is_empty());
        assert_eq!(release.documents().count(), 1);
    }
}
