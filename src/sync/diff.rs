// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Field-level comparison of desired documents against live objects

use serde_json::Value;

/// Paths of fields set in `desired` whose live value differs.
///
/// Only fields present in `desired` are compared, so server-populated fields
/// (`uid`, `resourceVersion`, `status`, defaulted specs) never show up. Lists
/// compare element by element and differ when their lengths do. Explicit
/// nulls and empty collections match an absent live field.
pub fn diff_paths(desired: &Value, live: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    walk(desired, Some(live), "", &mut paths);
    paths
}

fn walk(desired: &Value, live: Option<&Value>, path: &str, out: &mut Vec<String>) {
    match (desired, live) {
        (Value::Object(want), Some(Value::Object(have))) => {
            for (key, value) in want {
                walk(value, have.get(key), &join(path, key), out);
            }
        }
        (Value::Array(want), Some(Value::Array(have))) if want.len() == have.len() => {
            for (i, (w, h)) in want.iter().zip(have).enumerate() {
                walk(w, Some(h), &format!("{}[{}]", path, i), out);
            }
        }
        (want, None | Some(Value::Null)) if is_empty(want) => {}
        (want, Some(have)) if want == have => {}
        _ => out.push(if path.is_empty() { ".".to_string() } else { path.to_string() }),
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
