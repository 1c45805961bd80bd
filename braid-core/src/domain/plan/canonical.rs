// braid-core/src/domain/plan/canonical.rs

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::error::DomainError;
use crate::domain::plan::Plan;

/// Renders any serializable value as canonical JSON:
/// object keys sorted lexicographically at every depth, arrays in authored
/// order, two-space indentation, trailing newline.
///
/// The output is byte-identical across runs and independent of map
/// insertion order, which makes it safe to hash and to diff.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, DomainError> {
    let raw = serde_json::to_value(value)
        .map_err(|e| DomainError::InvalidJson(e.to_string()))?;
    let mut out = String::new();
    write_value(&mut out, &raw, 0);
    out.push('\n');
    Ok(out)
}

/// SHA-256 over the canonical serialization of a plan, hex-encoded.
pub fn plan_hash(plan: &Plan) -> Result<String, DomainError> {
    let canonical = canonical_json(plan)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push_str("{\n");
            for (i, key) in keys.iter().enumerate() {
                indent(out, depth + 1);
                // Display for Value::String produces a quoted, escaped JSON string
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push_str(": ");
                // Guarded above: every key in `keys` comes from `map`
                if let Some(v) = map.get(*key) {
                    write_value(out, v, depth + 1);
                }
                if i + 1 < keys.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push('}');
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            for (i, item) in items.iter().enumerate() {
                indent(out, depth + 1);
                write_value(out, item, depth + 1);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            indent(out, depth);
            out.push(']');
        }
        // Scalars: Display for Value is compact JSON with proper escaping
        other => out.push_str(&other.to_string()),
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}
