//! Node-level semantic metadata
//!
//! Bridges the canonical spec and the identity functions: builds the
//! preprocessor metadata each node contributes to identity hashing, with
//! sweep expressions replaced by their normalized signatures and declared
//! sweep domains replaced by bounded summaries.
//!
//! Parameter conventions recognized inside a node's `params`:
//!
//! - `{ "expression": "3 * t" }` — a sweep expression; identity sees the
//!   normalized signature, never the raw text
//! - `{ "sweep": { "kind": "range", ... } }` — a declared variable domain;
//!   identity sees the bounded [`semantiva_identity::DomainSignature`]
//!
//! Every other value passes through untouched.

use crate::canonical::{CanonicalNode, CanonicalSpec};
use semantiva_identity::{
    domain_signature, node_semantic_id, normalize_expression_signature, VariableSpec,
};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Sentinel used when a sweep expression or domain cannot be normalized.
/// Identity stays best-effort for diagnostics; the node id simply degrades.
const DEGRADED: &str = "error";

/// Build the identity-bearing metadata for one canonical node.
#[must_use]
pub fn node_semantic_meta(node: &CanonicalNode) -> Value {
    let params: Map<String, Value> = node
        .params
        .iter()
        .map(|(k, v)| (k.clone(), fold_param(v)))
        .collect();
    serde_json::json!({
        "processor": node.processor,
        "role": node.role,
        "params": Value::Object(params),
    })
}

/// Compute `(node_uuid, semantic_id)` pairs for a whole canonical spec.
#[must_use]
pub fn node_semantic_ids(spec: &CanonicalSpec) -> Vec<(Uuid, String)> {
    spec.nodes
        .iter()
        .map(|node| (node.node_uuid, node_semantic_id(&node_semantic_meta(node))))
        .collect()
}

fn fold_param(value: &Value) -> Value {
    let Value::Object(obj) = value else {
        return value.clone();
    };

    if let Some(Value::String(expr)) = obj.get("expression") {
        let signature = match normalize_expression_signature(expr) {
            Ok(sig) => sig.to_string(),
            Err(_) => DEGRADED.to_string(),
        };
        let mut folded = obj.clone();
        folded.remove("expression");
        folded.insert("expression_signature".to_string(), Value::String(signature));
        return Value::Object(folded);
    }

    if let Some(sweep) = obj.get("sweep") {
        let summary = match serde_json::from_value::<VariableSpec>(sweep.clone()) {
            Ok(spec) => serde_json::to_value(domain_signature(&spec))
                .unwrap_or_else(|_| Value::String(DEGRADED.to_string())),
            Err(_) => Value::String(DEGRADED.to_string()),
        };
        let mut folded = obj.clone();
        folded.insert("sweep".to_string(), summary);
        return Value::Object(folded);
    }

    value.clone()
}
