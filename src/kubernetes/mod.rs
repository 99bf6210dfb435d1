// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes access: the untyped object client and the applied-state store.

pub mod client;
pub mod state_store;

pub use client::{classify, ClusterClient, KubeClusterClient};
pub use state_store::{ConfigMapStateStore, StateStore};
