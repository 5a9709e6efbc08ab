//! Trace driver seam
//!
//! The orchestrator speaks to tracing through [`TraceDriver`] only; swapping
//! the JSONL file driver for an in-memory one (or none at all) changes no
//! execution behavior. Drivers must tolerate `close` being called after an
//! error mid-run: the orchestrator guarantees `flush` and `close` run on
//! every exit path.

use crate::record::{ErrorInfo, SerRecord};
use semantiva_pipeline::CanonicalSpec;
use serde_json::Value;

/// Trace emission failure
#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    /// Underlying sink write failed
    #[error("trace i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be serialized
    #[error("trace serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Terminal status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every node succeeded
    Ok,
    /// A node error propagated
    Error,
}

/// End-of-run summary passed to [`TraceDriver::on_pipeline_end`]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunSummary {
    /// Terminal run status
    pub status: RunStatus,
    /// Nodes that entered execution, including a failed final attempt;
    /// zero when the run stopped during instantiation
    pub nodes_executed: usize,
    /// Error payload when the run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

/// Sink for run lifecycle events and per-node records
pub trait TraceDriver: Send {
    /// Record the start of a run: canonical structure plus run metadata.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn on_pipeline_start(
        &mut self,
        pipeline_id: &str,
        run_id: &str,
        spec: &CanonicalSpec,
        meta: &Value,
    ) -> Result<(), TraceError>;

    /// Record one node attempt.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn on_node_event(&mut self, record: &SerRecord) -> Result<(), TraceError>;

    /// Record the end of a run, successful or not.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn on_pipeline_end(&mut self, run_id: &str, summary: &RunSummary) -> Result<(), TraceError>;

    /// Push buffered events to the sink.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn flush(&mut self) -> Result<(), TraceError>;

    /// Release the sink. Called exactly once, after `flush`, on every exit
    /// path including failures.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn close(&mut self) -> Result<(), TraceError>;
}

/// Everything a driver observes, in order. Used by tests to assert on the
/// exact event stream without touching the filesystem.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    /// `on_pipeline_start`
    PipelineStart {
        /// Canonical pipeline identity
        pipeline_id: String,
        /// Run identifier
        run_id: String,
        /// Canonical structure
        spec: CanonicalSpec,
        /// Run metadata
        meta: Value,
    },
    /// `on_node_event`
    Node(Box<SerRecord>),
    /// `on_pipeline_end`
    PipelineEnd {
        /// Run identifier
        run_id: String,
        /// End-of-run summary
        summary: RunSummary,
    },
    /// `flush`
    Flushed,
    /// `close`
    Closed,
}

/// Driver that retains every event in memory
#[derive(Debug, Default)]
pub struct MemoryTraceDriver {
    events: Vec<TraceEvent>,
}

impl MemoryTraceDriver {
    /// Empty driver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events observed so far, in order
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Node records only, in order
    pub fn node_records(&self) -> impl Iterator<Item = &SerRecord> {
        self.events.iter().filter_map(|e| match e {
            TraceEvent::Node(record) => Some(record.as_ref()),
            _ => None,
        })
    }

    /// Whether `close` was observed
    #[must_use]
    pub fn closed(&self) -> bool {
        self.events.iter().any(|e| matches!(e, TraceEvent::Closed))
    }
}

impl TraceDriver for MemoryTraceDriver {
    fn on_pipeline_start(
        &mut self,
        pipeline_id: &str,
        run_id: &str,
        spec: &CanonicalSpec,
        meta: &Value,
    ) -> Result<(), TraceError> {
        self.events.push(TraceEvent::PipelineStart {
            pipeline_id: pipeline_id.to_string(),
            run_id: run_id.to_string(),
            spec: spec.clone(),
            meta: meta.clone(),
        });
        Ok(())
    }

    fn on_node_event(&mut self, record: &SerRecord) -> Result<(), TraceError> {
        self.events.push(TraceEvent::Node(Box::new(record.clone())));
        Ok(())
    }

    fn on_pipeline_end(&mut self, run_id: &str, summary: &RunSummary) -> Result<(), TraceError> {
        self.events.push(TraceEvent::PipelineEnd {
            run_id: run_id.to_string(),
            summary: summary.clone(),
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        self.events.push(TraceEvent::Flushed);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TraceError> {
        self.events.push(TraceEvent::Closed);
        Ok(())
    }
}
