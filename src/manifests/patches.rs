// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deployment-option mutations applied to release documents before apply

use crate::config::DeploymentConfig;
use crate::constants::{labels, CILIUM_CONFIG_MAP, FIELD_MANAGER};
use crate::error::Result;
use crate::types::manifest::{Controller, ManifestDocument, ResourceKind};
use serde_json::{Map, Value};
use tracing::debug;

/// Turn the full document set of a release into what should be live for `config`
pub fn render(documents: Vec<ManifestDocument>, config: &DeploymentConfig) -> Result<Vec<ManifestDocument>> {
    config.validate()?;

    let rendered: Vec<ManifestDocument> = documents
        .into_iter()
        .filter(|doc| config.enable_hubble || doc.controller != Controller::Hubble)
        .map(|mut doc| {
            label_managed(&mut doc);
            if let Some(registry) = &config.image_registry {
                rewrite_images(&mut doc.content, registry);
            }
            configure_cilium(&mut doc, config);
            doc
        })
        .collect();

    debug!("Rendered {} documents", rendered.len());
    Ok(rendered)
}

/// Stamp ownership labels so pruning can tell our objects apart
fn label_managed(doc: &mut ManifestDocument) {
    let controller = doc.controller.as_str();
    let Some(object_labels) = doc
        .content
        .get_mut("metadata")
        .and_then(|metadata| ensure_object(metadata, "labels"))
    else {
        debug!("{} has no metadata to label", doc.name);
        return;
    };
    object_labels.insert(labels::MANAGED_BY.to_string(), Value::from(FIELD_MANAGER));
    object_labels.insert(labels::MANIFEST.to_string(), Value::from(controller));
}

/// Point every container image in the tree at `registry`
fn rewrite_images(value: &mut Value, registry: &str) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                let is_container_list = matches!(
                    key.as_str(),
                    "containers" | "initContainers" | "ephemeralContainers"
                );
                match child.as_array_mut() {
                    Some(containers) if is_container_list => {
                        for container in containers {
                            if let Some(Value::String(image)) = container.get_mut("image") {
                                *image = rewrite_image(image, registry);
                            }
                        }
                    }
                    _ => rewrite_images(child, registry),
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| rewrite_images(item, registry)),
        _ => {}
    }
}

/// Replace the registry host of an image reference, keeping repository, tag and digest
pub fn rewrite_image(image: &str, registry: &str) -> String {
    let repository = match image.split_once('/') {
        Some((host, rest)) if is_registry_host(host) => rest,
        _ => image,
    };
    format!("{}/{}", registry, repository)
}

fn is_registry_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

/// Write the deployment toggles into the agent ConfigMap
fn configure_cilium(doc: &mut ManifestDocument, config: &DeploymentConfig) {
    if doc.kind != ResourceKind::ConfigMap || doc.name != CILIUM_CONFIG_MAP {
        return;
    }

    let Some(data) = ensure_object(&mut doc.content, "data") else {
        return;
    };
    // Releases before 1.15 name the key `tunnel`
    let tunnel_key = if data.contains_key("tunnel") { "tunnel" } else { "tunnel-protocol" };
    let mut set = |key: &str, value: String| {
        data.insert(key.to_string(), Value::String(value));
    };

    set(tunnel_key, config.tunnel_protocol.to_string());
    // 0 lets the agent pick the protocol's default port
    set("tunnel-port", config.tunnel_port.unwrap_or(0).to_string());

    set("enable-hubble", config.enable_hubble.to_string());
    if config.hubble_metrics.is_empty() {
        set("hubble-metrics", String::new());
        set("hubble-metrics-server", String::new());
    } else {
        set("hubble-metrics", config.hubble_metrics.join(" "));
        set("hubble-metrics-server", ":9965".to_string());
    }

    set("enable-metrics", config.enable_metrics.to_string());
    let (agent_addr, operator_addr) = if config.enable_metrics {
        (":9962", ":9963")
    } else {
        ("", "")
    };
    set("prometheus-serve-addr", agent_addr.to_string());
    set("operator-prometheus-serve-addr", operator_addr.to_string());

    set("enable-session-affinity", config.enable_session_affinity.to_string());
    set("cluster-pool-ipv4-cidr", config.cluster_pool_ipv4_cidr.clone());
    set(
        "cluster-pool-ipv4-mask-size",
        config.cluster_pool_ipv4_mask_size.to_string(),
    );
}

/// The map under `key`, replacing any other value there; `None` when `parent` is not a map
fn ensure_object<'a>(parent: &'a mut Value, key: &str) -> Option<&'a mut Map<String, Value>> {
    let slot = parent
        .as_object_mut()?
        .entry(key)
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    slot.as_object_mut()
}
