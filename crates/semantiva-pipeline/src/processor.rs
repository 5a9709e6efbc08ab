//! Processor contract
//!
//! The orchestrator treats processors purely as an interface: a declared
//! input/output data kind, parameter metadata, optional capability hooks, and
//! one `process` call. Capability support is modeled as typed enums rather
//! than runtime attribute probing.

use crate::context::ExecutionContext;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Payload data kind declared by a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Absent payload (source nodes)
    Null,
    /// Boolean payload
    Bool,
    /// Integer payload
    Integer,
    /// Floating-point payload (integers are accepted)
    Float,
    /// String payload
    String,
    /// Array payload
    Array,
    /// Object payload
    Object,
    /// Any payload accepted / produced
    Any,
}

impl DataKind {
    /// Check whether `value` is compatible with this declared kind.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::Null => value.is_null(),
            Self::Bool => value.is_boolean(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::String => value.is_string(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }

    /// Kind name used in check details
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
            Self::Any => "any",
        }
    }
}

/// Typed answer to "which context keys does this processor require?"
///
/// Absence of the capability is a value, not a missing attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequiredKeys {
    /// Processor does not implement the capability
    NotSupported,
    /// Processor declares these required context keys
    Keys(Vec<String>),
}

/// A pipeline node's workhorse
///
/// Implementations are constructed by the [`crate::ProcessorRegistry`] from a
/// node's configured parameters. `process` consumes the upstream payload and
/// may read and write the execution context.
pub trait Processor: Send {
    /// Declared input payload kind
    fn input_type(&self) -> DataKind;

    /// Declared output payload kind
    fn output_type(&self) -> DataKind;

    /// Names of configurable parameters
    fn parameter_names(&self) -> Vec<String> {
        Vec::new()
    }

    /// Default values for parameters that have one
    fn default_params(&self) -> BTreeMap<String, Value> {
        BTreeMap::new()
    }

    /// Context keys this processor requires before running
    fn required_keys(&self) -> RequiredKeys {
        RequiredKeys::NotSupported
    }

    /// Context keys this processor declares it will create or update
    fn declared_writes(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run the processor
    ///
    /// # Errors
    /// Any [`ProcessorError`] is captured into the node's execution record
    /// and then propagated unchanged to the caller.
    fn process(
        &mut self,
        payload: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<Value, ProcessorError>;
}

/// Errors raised inside a processor's `process` call
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProcessorError {
    /// A required parameter was not supplied and has no default
    #[error("missing parameter '{name}'")]
    MissingParameter {
        /// Parameter name
        name: String,
    },

    /// A supplied parameter value was rejected
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Payload did not match what the processor can consume
    #[error("incompatible payload: {0}")]
    IncompatiblePayload(String),

    /// Domain-specific failure with a caller-chosen code
    #[error("{code}: {message}")]
    Failure {
        /// Stable failure code (becomes `error.type` in the execution record)
        code: String,
        /// Human-readable message
        message: String,
    },
}

impl ProcessorError {
    /// Stable code identifying the failure class
    ///
    /// Used both as the SER `error.type` and as the code of the failing
    /// post-check, so one failure class always maps to one shape.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::MissingParameter { .. } => "MissingParameter",
            Self::InvalidParameter { .. } => "InvalidParameter",
            Self::IncompatiblePayload(_) => "IncompatiblePayload",
            Self::Failure { code, .. } => code,
        }
    }

    /// Construct a domain failure with an explicit code
    #[inline]
    #[must_use]
    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            code: code.into(),
            message: message.into(),
        }
    }
}
