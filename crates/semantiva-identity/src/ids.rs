//! Pipeline and node identity functions
//!
//! Three fingerprints describe one pipeline, each sensitive to a different
//! slice of the declaration:
//!
//! - `plsemid-` (semantic id): structure only, invariant to parameter values
//! - `plcid-` (config id): structure plus per-node semantic fingerprints
//! - `plid-` (pipeline id): the full canonical spec, including parameters
//!
//! Node-level semantic ids hash a processor's sweep metadata under a fixed
//! domain-separation prefix so they can never collide with other hash uses.

use crate::canon::canonical_json;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Domain-separation prefix fed to the node semantic id hash.
pub const NODE_SEMANTIC_DOMAIN: &str = "semantiva:node-sem-v1:";

/// Sentinel returned when identity computation degrades (spec metadata was
/// malformed). Diagnostic tooling keeps working; the id is simply opaque.
const DEGRADED_ID: &str = "error";

/// Metadata keys that only affect rendering, never semantics.
const UI_ONLY_FIELDS: &[&str] = &["view", "preview", "display", "label"];

/// Raw expression text is dropped from identity input; the normalized
/// signature (stored separately) is what identity sees.
const RAW_EXPRESSION_FIELD: &str = "expression";

/// Compute a node's semantic id from its preprocessor metadata.
///
/// UI-only fields are stripped recursively, raw expression text is dropped,
/// the remainder is canonicalized to sorted-key JSON, and the result is
/// SHA-256 hashed under [`NODE_SEMANTIC_DOMAIN`].
///
/// Identity computation is best-effort: metadata that defeats
/// canonicalization yields the literal `"error"` sentinel instead of failing
/// the caller.
#[must_use]
pub fn node_semantic_id(meta: &Value) -> String {
    let cleaned = strip_ui_fields(meta.clone());
    match canonical_json(&cleaned) {
        Ok(json) => {
            let mut hasher = Sha256::new();
            hasher.update(NODE_SEMANTIC_DOMAIN.as_bytes());
            hasher.update(json.as_bytes());
            hex::encode(hasher.finalize())
        }
        Err(_) => DEGRADED_ID.to_string(),
    }
}

fn strip_ui_fields(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| {
                    !UI_ONLY_FIELDS.contains(&k.as_str()) && k != RAW_EXPRESSION_FIELD
                })
                .map(|(k, v)| (k, strip_ui_fields(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_ui_fields).collect()),
        leaf => leaf,
    }
}

/// Compute the pipeline config id (`plcid-`) from `(node_uuid, semantic_id)`
/// pairs.
///
/// Pairs are sorted by node UUID before hashing, so the id is independent of
/// the order the caller assembled them in.
#[must_use]
pub fn pipeline_config_id(pairs: &[(Uuid, String)]) -> String {
    let mut sorted: Vec<(String, &str)> = pairs
        .iter()
        .map(|(uuid, sid)| (uuid.to_string(), sid.as_str()))
        .collect();
    sorted.sort();
    prefixed_hash("plcid-", &sorted)
}

/// Compute the structure-only pipeline semantic id (`plsemid-`).
///
/// The caller passes a structural projection of the canonical spec (node
/// names, UUIDs, and payload wiring) that deliberately excludes parameter
/// values.
#[must_use]
pub fn pipeline_semantic_id<T: Serialize>(structural: &T) -> String {
    prefixed_hash("plsemid-", structural)
}

/// Compute the full pipeline id (`plid-`) over the complete canonical spec.
///
/// This is the only pipeline identity sensitive to concrete parameter values.
#[must_use]
pub fn pipeline_id<T: Serialize>(canonical_spec: &T) -> String {
    prefixed_hash("plid-", canonical_spec)
}

fn prefixed_hash<T: Serialize>(prefix: &str, value: &T) -> String {
    match canonical_json(value) {
        Ok(json) => {
            let digest = Sha256::digest(json.as_bytes());
            format!("{prefix}{}", hex::encode(digest))
        }
        Err(_) => format!("{prefix}{DEGRADED_ID}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_semantic_id_ignores_ui_fields() {
        let bare = json!({"processor": "rescale", "factor_signature": "(* 3 t)"});
        let decorated = json!({
            "processor": "rescale",
            "factor_signature": "(* 3 t)",
            "view": {"color": "red"},
            "preview": true,
            "label": "my node",
        });
        assert_eq!(node_semantic_id(&bare), node_semantic_id(&decorated));
    }

    #[test]
    fn node_semantic_id_drops_raw_expression_text() {
        let spelled_one_way = json!({"processor": "rescale", "expression": "3 * t"});
        let spelled_other_way = json!({"processor": "rescale", "expression": "t * 3"});
        assert_eq!(
            node_semantic_id(&spelled_one_way),
            node_semantic_id(&spelled_other_way)
        );
    }

    #[test]
    fn node_semantic_id_is_sensitive_to_semantics() {
        let a = json!({"processor": "rescale", "factor_signature": "(* 3 t)"});
        let b = json!({"processor": "rescale", "factor_signature": "(* 4 t)"});
        assert_ne!(node_semantic_id(&a), node_semantic_id(&b));
    }

    #[test]
    fn node_semantic_id_strips_nested_ui_fields() {
        let bare = json!({"params": {"gain": 2}});
        let nested = json!({"params": {"gain": 2, "display": "slider"}});
        assert_eq!(node_semantic_id(&bare), node_semantic_id(&nested));
    }

    #[test]
    fn config_id_is_pair_order_independent() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        let forward = vec![(u1, "sid-a".to_string()), (u2, "sid-b".to_string())];
        let reversed = vec![(u2, "sid-b".to_string()), (u1, "sid-a".to_string())];
        assert_eq!(pipeline_config_id(&forward), pipeline_config_id(&reversed));
    }

    #[test]
    fn config_id_is_sensitive_to_semantic_ids() {
        let u1 = Uuid::new_v4();
        let a = vec![(u1, "sid-a".to_string())];
        let b = vec![(u1, "sid-b".to_string())];
        assert_ne!(pipeline_config_id(&a), pipeline_config_id(&b));
    }

    #[test]
    fn prefixes_are_distinct_per_identity_kind() {
        let spec = json!({"name": "p", "nodes": []});
        assert!(pipeline_id(&spec).starts_with("plid-"));
        assert!(pipeline_semantic_id(&spec).starts_with("plsemid-"));
        assert!(pipeline_config_id(&[]).starts_with("plcid-"));
    }

    #[test]
    fn pipeline_id_is_stable_across_calls() {
        let spec = json!({"name": "p", "nodes": [{"processor": "a", "params": {"x": 1}}]});
        assert_eq!(pipeline_id(&spec), pipeline_id(&spec));
    }

    #[test]
    fn pipeline_id_differs_from_semantic_id_input_sensitivity() {
        let with_params = json!({"name": "p", "nodes": [{"processor": "a", "params": {"x": 1}}]});
        let other_params = json!({"name": "p", "nodes": [{"processor": "a", "params": {"x": 2}}]});
        assert_ne!(pipeline_id(&with_params), pipeline_id(&other_params));
    }
}
