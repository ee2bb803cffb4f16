//! Input Fingerprints - SHA-256 over Canonical JSON
//!
//! Two analyses of equal detections, texts, dimensions and scale carry
//! the same fingerprint, so reports can be matched to their inputs.

use serde::Serialize;
use serde_json::{json, to_string, Value};
use sha2::{Digest, Sha256};

use crate::elements::{DetectedElement, ExtractedText};

/// Compute SHA-256 hash of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Convert to canonical JSON (sorted keys, no whitespace)
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let v: Value = serde_json::to_value(value)?;
    to_string(&sort_value(&v))
}

fn sort_value(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(entries.into_iter().map(|(k, v)| (k.clone(), sort_value(v))).collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_value).collect()),
        _ => v.clone(),
    }
}

/// fingerprint = sha256(engine_version + ":" + canonical(inputs))
pub fn compute_input_fingerprint(
    elements: &[DetectedElement],
    texts: &[ExtractedText],
    dimensions: (u32, u32),
    scale_override: Option<f64>,
) -> Result<String, serde_json::Error> {
    let inputs = json!({
        "elements": elements,
        "texts": texts,
        "width": dimensions.0,
        "height": dimensions.1,
        "scale_override": scale_override,
    });
    let combined = format!("{}:{}", crate::ENGINE_VERSION, canonical_json(&inputs)?);
    Ok(sha256_hex(combined.as_bytes()))
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{:02x}", b)).collect()
    }
}
