// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Manifest bundle parsing and deployment-option patches.

pub mod parser;
pub mod patches;

pub use parser::parse_bundle;
pub use patches::render;
