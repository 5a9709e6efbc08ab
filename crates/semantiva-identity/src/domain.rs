//! Sweep-variable domain signatures
//!
//! A sweep variable's domain may be huge (a numeric range with millions of
//! steps) or opaque (a context-sourced value). [`domain_signature`] summarizes
//! each domain without materializing it, so node identity stays cheap and
//! bounded regardless of sweep size.

use crate::canon::canonical_json;
use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How many head/tail values an explicit sequence contributes verbatim.
const SEQUENCE_WINDOW: usize = 3;

/// Numeric range scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleKind {
    /// Evenly spaced values
    #[default]
    Linear,
    /// Logarithmically spaced values
    Log,
}

/// Declared domain of one sweep variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariableSpec {
    /// Numeric range, never materialized
    Range {
        /// Lower bound
        lo: f64,
        /// Upper bound
        hi: f64,
        /// Number of steps
        steps: u32,
        /// Spacing scale
        #[serde(default)]
        scale: ScaleKind,
        /// Whether `hi` is included
        #[serde(default = "default_endpoint")]
        endpoint: bool,
    },
    /// Explicit value sequence
    Sequence {
        /// The declared values, in order
        values: Vec<Value>,
    },
    /// Value taken from the execution context at run time
    ContextKey {
        /// Context key to read
        key: String,
    },
}

fn default_endpoint() -> bool {
    true
}

/// Bounded summary of a [`VariableSpec`], safe to embed in identity hashes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "snake_case")]
pub enum DomainSignature {
    /// Range summary: the five declared parameters pin the domain exactly
    Range {
        /// Lower bound
        lo: f64,
        /// Upper bound
        hi: f64,
        /// Number of steps
        steps: u32,
        /// Spacing scale
        scale: ScaleKind,
        /// Whether `hi` is included
        endpoint: bool,
    },
    /// Sequence summary: count, bounded head/tail window, full-content digest
    Sequence {
        /// Total value count
        count: usize,
        /// First values (at most 3)
        head: Vec<Value>,
        /// Last values (at most 3)
        tail: Vec<Value>,
        /// Digest over the canonical JSON of all values
        digest: Fingerprint,
    },
    /// Context-sourced value: only the key is known statically
    Context {
        /// Context key to read
        key: String,
    },
}

/// Summarize a variable domain without materializing it.
///
/// Sequences digest their full canonical JSON; if a value defeats
/// canonicalization the digest falls back to the debug rendering so identity
/// computation stays best-effort.
#[must_use]
pub fn domain_signature(spec: &VariableSpec) -> DomainSignature {
    match spec {
        VariableSpec::Range {
            lo,
            hi,
            steps,
            scale,
            endpoint,
        } => DomainSignature::Range {
            lo: *lo,
            hi: *hi,
            steps: *steps,
            scale: *scale,
            endpoint: *endpoint,
        },
        VariableSpec::Sequence { values } => {
            let head: Vec<Value> = values.iter().take(SEQUENCE_WINDOW).cloned().collect();
            let tail: Vec<Value> = if values.len() > SEQUENCE_WINDOW {
                values[values.len().saturating_sub(SEQUENCE_WINDOW)..].to_vec()
            } else {
                Vec::new()
            };
            let digest = match canonical_json(values) {
                Ok(json) => Fingerprint::compute(json.as_bytes()),
                Err(_) => Fingerprint::compute(format!("{values:?}").as_bytes()),
            };
            DomainSignature::Sequence {
                count: values.len(),
                head,
                tail,
                digest,
            }
        }
        VariableSpec::ContextKey { key } => DomainSignature::Context { key: key.clone() },
    }
}
