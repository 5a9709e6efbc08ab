//! Canonical JSON encoding
//!
//! Every hash input in the workspace goes through [`canonical_json`]: sorted
//! object keys, compact separators, UTF-8, no trailing whitespace. Sorting
//! falls out of `serde_json`'s default `BTreeMap`-backed object map, so the
//! round trip through [`serde_json::Value`] is the entire canonicalization.

use crate::error::IdentityError;
use serde::Serialize;

/// Encode a value as canonical JSON.
///
/// The output is byte-stable across processes and platforms for the same
/// logical value: object keys are sorted, separators are compact, and strings
/// are UTF-8.
///
/// # Errors
/// Returns [`IdentityError::Canonicalization`] if the value cannot be
/// represented as JSON (e.g. a map with non-string keys or a NaN float).
pub fn canonical_json<T: Serialize>(value: &T) -> Result<String, IdentityError> {
    let tree = serde_json::to_value(value)?;
    Ok(tree.to_string())
}
