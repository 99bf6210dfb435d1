// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Core data model: releases, manifest documents and applied state.

pub mod manifest;
pub mod release;
pub mod state;

pub use manifest::{Controller, ManifestDocument, ObjectRef, ResourceKind};
pub use release::{BinaryResource, Release, Version};
pub use state::AppliedState;
