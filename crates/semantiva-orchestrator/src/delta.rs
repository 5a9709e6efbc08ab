//! Context delta observation
//!
//! Compares the context snapshots taken around one node attempt and reports
//! which keys appeared and which changed, with bounded per-key summaries.
//! Value comparison is canonical-JSON byte equality, so two structurally
//! identical values never count as an update.

use semantiva_identity::Fingerprint;
use semantiva_pipeline::ExecutionContext;
use semantiva_trace::ContextDelta;
use serde_json::Value;
use std::collections::BTreeMap;

/// What summaries carry beyond structural shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaOptions {
    /// Attach a `hash` digest of each changed value
    pub content_hash: bool,
    /// Attach a truncated rendering of each changed value
    pub repr: bool,
    /// Character budget for renderings
    pub repr_limit: usize,
}

impl Default for DeltaOptions {
    fn default() -> Self {
        Self {
            content_hash: false,
            repr: false,
            repr_limit: 120,
        }
    }
}

/// Computes [`ContextDelta`] values between context snapshots
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaCollector {
    options: DeltaOptions,
}

impl DeltaCollector {
    /// Collector with the given options
    #[inline]
    #[must_use]
    pub fn new(options: DeltaOptions) -> Self {
        Self { options }
    }

    /// Compare snapshots taken before and after one node attempt.
    ///
    /// `created_keys` holds keys absent before and present after;
    /// `updated_keys` holds keys present in both whose canonical rendering
    /// differs. Both lists are sorted. `required` (the node's declared reads)
    /// passes through as `read_keys`, sorted. A node that wrote nothing
    /// yields a delta with empty created/updated lists.
    #[must_use]
    pub fn compute(
        &self,
        pre: &ExecutionContext,
        post: &ExecutionContext,
        required: &[String],
    ) -> ContextDelta {
        let mut created_keys = Vec::new();
        let mut updated_keys = Vec::new();
        let mut key_summaries = BTreeMap::new();

        for (key, value) in post.iter() {
            match pre.get(key) {
                None => {
                    created_keys.push(key.clone());
                    key_summaries.insert(key.clone(), self.summarize(value));
                }
                Some(previous) if !canonically_equal(previous, value) => {
                    updated_keys.push(key.clone());
                    key_summaries.insert(key.clone(), self.summarize(value));
                }
                Some(_) => {}
            }
        }

        let mut read_keys = required.to_vec();
        read_keys.sort();

        ContextDelta {
            read_keys,
            created_keys,
            updated_keys,
            key_summaries,
        }
    }

    fn summarize(&self, value: &Value) -> Value {
        let mut summary = serde_json::Map::new();
        summary.insert("dtype".to_string(), Value::String(dtype(value).to_string()));

        match value {
            Value::String(s) => {
                summary.insert("len".to_string(), Value::from(s.chars().count()));
            }
            Value::Array(items) => {
                summary.insert("len".to_string(), Value::from(items.len()));
                if !items.is_empty() && items.iter().all(Value::is_array) {
                    summary.insert("rows".to_string(), Value::from(items.len()));
                    let widths: Vec<usize> = items
                        .iter()
                        .filter_map(Value::as_array)
                        .map(Vec::len)
                        .collect();
                    if let Some(first) = widths.first() {
                        if widths.iter().all(|w| w == first) {
                            summary.insert("cols".to_string(), Value::from(*first));
                        }
                    }
                }
            }
            Value::Object(map) => {
                summary.insert("len".to_string(), Value::from(map.len()));
            }
            _ => {}
        }

        let rendered = value.to_string();
        if self.options.content_hash {
            summary.insert(
                "hash".to_string(),
                Value::String(Fingerprint::compute(rendered.as_bytes()).prefixed()),
            );
        }
        if self.options.repr {
            summary.insert(
                "repr".to_string(),
                Value::String(truncate_chars(&rendered, self.options.repr_limit)),
            );
        }

        Value::Object(summary)
    }
}

fn canonically_equal(a: &Value, b: &Value) -> bool {
    a.to_string() == b.to_string()
}

fn dtype(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let mut out: String = text.chars().take(limit).collect();
    out.push('…');
    out
}
