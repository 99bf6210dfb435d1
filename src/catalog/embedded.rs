// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Release bundles vendored under `upstream/` and compiled into the binary

use crate::types::manifest::Controller;
use crate::types::release::Version;

pub(crate) struct EmbeddedBinary {
    pub name: &'static str,
    pub repository: &'static str,
    pub version: Version,
    pub asset_prefix: &'static str,
}

pub(crate) struct EmbeddedRelease {
    pub version: Version,
    pub bundles: &'static [(Controller, &'static str)],
    pub binaries: &'static [EmbeddedBinary],
}

pub(crate) const RELEASES: &[EmbeddedRelease] = &[
    EmbeddedRelease {
        version: Version::new(1, 14, 11),
        bundles: &[
            (
                Controller::Cilium,
                include_str!("../../upstream/cilium/manifests/v1.14.11/cilium.yaml"),
            ),
            (
                Controller::Hubble,
                include_str!("../../upstream/hubble/manifests/v1.14.11/hubble.yaml"),
            ),
        ],
        binaries: &[
            EmbeddedBinary {
                name: "cilium",
                repository: "cilium/cilium-cli",
                version: Version::new(0, 15, 22),
                asset_prefix: "cilium",
            },
            EmbeddedBinary {
                name: "hubble",
                repository: "cilium/hubble",
                version: Version::new(0, 13, 6),
                asset_prefix: "hubble",
            },
        ],
    },
    EmbeddedRelease {
        version: Version::new(1, 16, 10),
        bundles: &[
            (
                Controller::Cilium,
                include_str!("../../upstream/cilium/manifests/v1.16.10/cilium.yaml"),
            ),
            (
                Controller::Hubble,
                include_str!("../../upstream/hubble/manifests/v1.16.10/hubble.yaml"),
            ),
        ],
        binaries: &[
            EmbeddedBinary {
                name: "cilium",
                repository: "cilium/cilium-cli",
                version: Version::new(0, 16, 24),
                asset_prefix: "cilium",
            },
            EmbeddedBinary {
                name: "hubble",
                repository: "cilium/hubble",
                version: Version::new(1, 16, 6),
                asset_prefix: "hubble",
            },
        ],
    },
];
