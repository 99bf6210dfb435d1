// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CLI binary resources published alongside each release.

pub mod fetch;

pub use fetch::{Arch, ResourceFetcher};
