//! Outbound gain normalization and override
//!
//! Every JSON body sent to the DSP device passes through
//! [`normalize_gains`] first. The walk is an unconditional depth-first
//! recursion over the whole value tree, not just top-level keys:
//!
//! - any object with a `"gains"` list gets overridden (when a pair is
//!   given) and its null/non-numeric entries coerced to 0.0;
//! - any object with `gain1`/`gain2` scalars gets the same treatment;
//! - list length is always preserved: a non-2-element list under override
//!   is filled with the pair's first value, never resized.
//!
//! Coercion of null/non-numeric values happens regardless of override
//! mode, so the function is idempotent either way.

use serde_json::{Map, Value};

/// Normalize (and optionally override) all gain values in `value`.
///
/// Returns true if anything changed, so the caller can log before/after
/// payloads only when they differ.
pub fn normalize_gains(value: &mut Value, override_pair: Option<(f64, f64)>) -> bool {
    match value {
        Value::Object(map) => normalize_object(map, override_pair),
        Value::Array(items) => {
            let mut changed = false;
            for item in items {
                if matches!(item, Value::Object(_) | Value::Array(_)) {
                    changed |= normalize_gains(item, override_pair);
                }
            }
            changed
        }
        _ => false,
    }
}

fn normalize_object(map: &mut Map<String, Value>, override_pair: Option<(f64, f64)>) -> bool {
    let mut changed = false;

    // List-style gains: "gains": [x, y, ...]
    if let Some(Value::Array(gains)) = map.get_mut("gains") {
        if let Some((g0, g1)) = override_pair {
            let replacement: Vec<Value> = if gains.len() == 2 {
                vec![number(g0), number(g1)]
            } else {
                // Preserve length; fill with the first override value
                gains.iter().map(|_| number(g0)).collect()
            };
            if *gains != replacement {
                *gains = replacement;
                changed = true;
            }
        }

        // Coerce any remaining null/non-numeric entries to 0.0
        for entry in gains.iter_mut() {
            if !entry.is_number() {
                *entry = number(0.0);
                changed = true;
            }
        }
    }

    // Scalar-style gains: {"gain1": x, "gain2": y}
    if let Some((g0, g1)) = override_pair {
        changed |= force_scalar(map, "gain1", g0);
        changed |= force_scalar(map, "gain2", g1);
    }
    changed |= coerce_null_scalar(map, "gain1");
    changed |= coerce_null_scalar(map, "gain2");

    // Recurse into every nested container
    for value in map.values_mut() {
        if matches!(value, Value::Object(_) | Value::Array(_)) {
            changed |= normalize_gains(value, override_pair);
        }
    }

    changed
}

fn force_scalar(map: &mut Map<String, Value>, key: &str, target: f64) -> bool {
    match map.get(key) {
        Some(current) if current.as_f64() == Some(target) => false,
        Some(_) => {
            map.insert(key.to_string(), number(target));
            true
        }
        None => false,
    }
}

fn coerce_null_scalar(map: &mut Map<String, Value>, key: &str) -> bool {
    match map.get(key) {
        Some(Value::Null) => {
            map.insert(key.to_string(), number(0.0));
            true
        }
        _ => false,
    }
}

fn number(v: f64) -> Value {
    serde_json::Number::from_f64(v)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
