//! Semantic identity primitives for Semantiva pipelines
//!
//! Everything that makes two equivalent declarations hash identically lives
//! here: canonical JSON encoding, SHA-256 content fingerprints, arithmetic
//! expression normalization, sweep-variable domain signatures, and the
//! prefix-tagged pipeline/node identity functions.
//!
//! All functions in this crate are pure: the only I/O is
//! [`Fingerprint::of_file`], which reads the file it is asked to digest.

pub mod canon;
pub mod domain;
mod error;
pub mod expression;
pub mod fingerprint;
pub mod ids;

pub use canon::canonical_json;
pub use domain::{domain_signature, DomainSignature, ScaleKind, VariableSpec};
pub use error::IdentityError;
pub use expression::{normalize_expression_signature, ExprSignature};
pub use fingerprint::Fingerprint;
pub use ids::{
    node_semantic_id, pipeline_config_id, pipeline_id, pipeline_semantic_id, NODE_SEMANTIC_DOMAIN,
};
