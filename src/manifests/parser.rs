// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Multi-document YAML bundle parsing

use crate::error::{ReconcilerError, Result};
use crate::types::manifest::{Controller, ManifestDocument};
use serde::Deserialize;
use serde_json::Value;

/// Parse a bundle of concatenated YAML documents into manifest documents.
/// Empty documents are skipped; `List` objects are flattened into their items.
pub fn parse_bundle(controller: Controller, source: &str) -> Result<Vec<ManifestDocument>> {
    let mut documents = Vec::new();

    for (index, de) in serde_yaml::Deserializer::from_str(source).enumerate() {
        let value = Value::deserialize(de).map_err(|e| {
            ReconcilerError::Validation(format!(
                "{} bundle document {}: {}",
                controller, index, e
            ))
        })?;

        match value {
            Value::Null => continue,
            Value::Object(ref obj) if obj.get("kind").and_then(Value::as_str) == Some("List") => {
                let items = obj.get("items").and_then(Value::as_array).cloned().unwrap_or_default();
                for item in items {
                    documents.push(ManifestDocument::from_value(controller, item)?);
                }
            }
            other => documents.push(ManifestDocument::from_value(controller, other)?),
        }
    }

    Ok(documents)
}
