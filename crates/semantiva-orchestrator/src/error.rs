//! Orchestrator error taxonomy
//!
//! Every failure a run can hit is a typed variant. Processor failures keep
//! their original error as the source so the stable failure code survives
//! into both the execution record and the propagated error.

use semantiva_pipeline::{PipelineError, ProcessorError};
use semantiva_runspace::RunSpaceError;
use semantiva_trace::TraceError;
use uuid::Uuid;

/// Worker-side executor failure
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// The worker running the node panicked
    #[error("node worker panicked")]
    WorkerPanicked,
}

/// Transport publish failure
#[derive(Debug, thiserror::Error)]
#[error("transport publish failed on '{channel}': {reason}")]
pub struct TransportError {
    /// Channel the publish targeted
    pub channel: String,
    /// What went wrong
    pub reason: String,
}

/// Top-level orchestration error
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Declaration, canonicalization, or processor construction failed
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A node's processor raised during execution
    #[error("node {node_uuid} ({processor}) failed: {source}")]
    Node {
        /// Canonical node UUID
        node_uuid: Uuid,
        /// Processor reference
        processor: String,
        /// The processor's own error, code intact
        source: ProcessorError,
    },

    /// The executor seam failed
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    /// The transport seam failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The trace driver failed
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// Run-space expansion failed
    #[error(transparent)]
    RunSpace(#[from] RunSpaceError),
}
