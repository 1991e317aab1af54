//! Deterministic fingerprints (spec.md §4.6).

use acm_contracts::GeneratorConfig;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// `content_hash = "sha256:" || hex(sha256(utf8(content)))`.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    format!("sha256:{}", hex_encode(&digest))
}

/// `config_hash` is over the canonical, lexicographically-key-sorted JSON of
/// the generator-affecting config subset only: `{provider, model,
/// temperature, instructions_hash, guidelines_hash}` (spec.md §4.6). Unlike
/// `content_hash` this is not itself prefixed with the digest algorithm name
/// in the spec's examples, but we keep the `sha256:` prefix for symmetry
/// and so the two fingerprint kinds are never confused downstream.
pub fn config_hash(config: &GeneratorConfig) -> String {
    let canonical = canonical_fingerprint_subset(config);
    content_hash(&canonical)
}

/// Builds the canonical JSON for the fingerprint subset, with object keys in
/// lexicographic order so the same logical config always serializes
/// identically regardless of construction order. `BTreeMap` gives us that
/// ordering for free through `serde_json`'s `Value::Object` rendering.
fn canonical_fingerprint_subset(config: &GeneratorConfig) -> String {
    let mut map: BTreeMap<&'static str, Value> = BTreeMap::new();
    map.insert("provider", Value::String(config.provider.clone()));
    map.insert("model", Value::String(config.model.clone()));
    map.insert(
        "temperature",
        Value::from(f64::from(config.temperature)),
    );
    map.insert(
        "instructions_hash",
        Value::String(config.instructions_hash.clone()),
    );
    map.insert(
        "guidelines_hash",
        Value::String(config.guidelines_hash.clone()),
    );
    // serde_json serializes BTreeMap keys in sorted order already; we avoid
    // going through `Value::Object` (a HashMap-backed type by default)
    // specifically to keep that ordering guarantee explicit and visible.
    let mut out = String::from("{");
    for (i, (key, value)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(key);
        out.push_str("\":");
        out.push_str(&value.to_string());
    }
    out.push('}');
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        write!(&mut s, "{byte:02x}").expect("writing to a String cannot fail");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg(provider: &str, model: &str, temperature: f32) -> GeneratorConfig {
        GeneratorConfig {
            provider: provider.to_string(),
            model: model.to_string(),
            iteration: 1,
            temperature,
            instructions_hash: "ih".to_string(),
            guidelines_hash: "gh".to_string(),
            extra: HashMap::new(),
        }
    }

    #[test]
    fn content_hash_is_deterministic_and_prefixed() {
        let a = content_hash("hello world");
        let b = content_hash("hello world");
        assert_eq!(a, b);
        assert!(a.starts_with("sha256:"));
    }

    #[test]
    fn config_hash_ignores_non_fingerprinted_fields() {
        let mut a = cfg("openai", "gpt-5", 0.3);
        let mut b = cfg("openai", "gpt-5", 0.3);
        a.iteration = 1;
        b.iteration = 99;
        a.extra.insert("timeout_s".to_string(), Value::from(10));
        b.extra.insert("timeout_s".to_string(), Value::from(9999));
        assert_eq!(config_hash(&a), config_hash(&b));
    }

    #[test]
    fn config_hash_changes_when_fingerprinted_field_changes() {
        let a = cfg("openai", "gpt-5", 0.3);
        let b = cfg("openai", "gpt-5", 0.31);
        assert_ne!(config_hash(&a), config_hash(&b));
    }
}
