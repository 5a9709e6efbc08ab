//! Semantic execution records
//!
//! One [`SerRecord`] is emitted per node attempt, whether the node succeeded
//! or not. The record ties together identity (which node of which pipeline in
//! which run), dependencies, the processor invocation, the observed context
//! delta, pre/post assertion outcomes, timing, and the final status. Field
//! names are part of the on-disk contract and stay stable across releases.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Outcome of a single assertion check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckResult {
    /// Check held
    Pass,
    /// Check violated
    Fail,
    /// Check could not be fully evaluated; execution continued
    Warn,
}

/// One named assertion outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    /// Stable check code, e.g. `required_keys_present`
    pub code: String,
    /// Outcome
    pub result: CheckResult,
    /// Structured diagnostic payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Check {
    /// A passing check with no details
    #[must_use]
    pub fn pass(code: &str) -> Self {
        Self {
            code: code.to_string(),
            result: CheckResult::Pass,
            details: None,
        }
    }

    /// A failing check carrying a diagnostic payload
    #[must_use]
    pub fn fail(code: &str, details: Value) -> Self {
        Self {
            code: code.to_string(),
            result: CheckResult::Fail,
            details: Some(details),
        }
    }

    /// A warning check carrying a diagnostic payload
    #[must_use]
    pub fn warn(code: &str, details: Value) -> Self {
        Self {
            code: code.to_string(),
            result: CheckResult::Warn,
            details: Some(details),
        }
    }
}

/// Terminal status of a node attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Completed normally
    Succeeded,
    /// Raised an error; the record still carries everything observed
    Error,
}

/// Structured error payload attached to failed records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error class, e.g. `MissingParameter`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable message
    pub message: String,
}

/// Who a record is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordIdentity {
    /// Run identifier, unique per orchestrator invocation
    pub run_id: String,
    /// Canonical pipeline identity (`plid-` prefixed)
    pub pipeline_id: String,
    /// Deterministic node UUID within the canonical spec
    pub node_id: String,
}

/// Structural dependencies of the node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Node UUIDs whose output this node consumed
    pub upstream: Vec<String>,
}

/// The processor invocation as resolved at execution time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorInvocation {
    /// Registered processor name
    #[serde(rename = "ref")]
    pub reference: String,
    /// Fully resolved parameters, after defaults and context lookups
    pub parameters: BTreeMap<String, Value>,
    /// Where each parameter came from: `node`, `context`, or `default`
    pub parameter_sources: BTreeMap<String, String>,
    /// Node semantic identity, when the identity phase computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_id: Option<String>,
}

/// What the node did to the execution context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextDelta {
    /// Keys the node declared it reads, sorted
    #[serde(default)]
    pub read_keys: Vec<String>,
    /// Keys absent before, present after
    pub created_keys: Vec<String>,
    /// Keys present before whose value changed
    pub updated_keys: Vec<String>,
    /// Per-key structural summaries for created and updated keys
    pub key_summaries: BTreeMap<String, Value>,
}

/// Environment pins recorded alongside assertions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentPins {
    /// Platform triple-ish identifier
    pub platform: String,
    /// Operating system family
    pub os: String,
    /// CPU architecture
    pub arch: String,
    /// Orchestrator version executing the run
    pub runtime_version: String,
    /// Digest of the processor registry contents
    pub registry_fingerprint: String,
}

/// Assertion outcomes grouped by phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assertions {
    /// Checks evaluated before the processor ran
    pub preconditions: Vec<Check>,
    /// Checks evaluated after the processor ran
    pub postconditions: Vec<Check>,
    /// Environment the checks were evaluated in
    pub environment: EnvironmentPins,
}

/// Wall-clock and CPU timing of the attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// ISO-8601 UTC start, millisecond precision
    pub started_at: String,
    /// ISO-8601 UTC end, millisecond precision
    pub finished_at: String,
    /// Elapsed wall time in milliseconds
    pub wall_ms: u64,
    /// Process CPU time consumed in milliseconds, when measurable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_ms: Option<u64>,
}

/// One node attempt, success or failure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerRecord {
    /// Run / pipeline / node identity
    pub identity: RecordIdentity,
    /// Upstream structure
    pub dependencies: Dependencies,
    /// Resolved invocation
    pub processor: ProcessorInvocation,
    /// Observed context mutation
    pub context_delta: ContextDelta,
    /// Pre/post checks and environment pins
    pub assertions: Assertions,
    /// Attempt timing
    pub timing: Timing,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Error payload, present exactly when `status` is `error`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl SerRecord {
    /// Whether the attempt failed
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.status == ExecutionStatus::Error
    }
}
