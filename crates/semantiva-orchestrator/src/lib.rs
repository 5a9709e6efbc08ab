//! Sequential pipeline orchestration
//!
//! Executes declared pipelines node by node with pre/post assertion checks,
//! context delta observation, and one execution record per node attempt.
//! The three seams — [`Executor`], [`Transport`], and
//! [`semantiva_trace::TraceDriver`] — are injected; swapping any of them
//! never changes what a run computes.

pub mod delta;
pub mod environment;
mod error;
pub mod executor;
pub mod orchestrator;
pub mod transport;

pub use delta::{DeltaCollector, DeltaOptions};
pub use environment::environment_pins;
pub use error::{ExecutorError, OrchestratorError, TransportError};
pub use executor::{Executor, InlineExecutor, JobHandle, NodeJob, NodeOutcome, ThreadExecutor};
pub use orchestrator::{Orchestrator, PipelineOutput, RunSpaceOutcome};
pub use transport::{MemoryTransport, NullTransport, Publication, Transport};
