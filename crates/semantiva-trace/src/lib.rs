//! Semantic execution records and trace drivers
//!
//! Every node attempt an orchestrator makes produces one [`SerRecord`]
//! (semantic execution record), failed attempts included. Drivers receive
//! records through the [`TraceDriver`] seam; the crate ships a JSONL file
//! driver and an in-memory driver for tests.

pub mod driver;
pub mod jsonl;
pub mod record;

pub use driver::{MemoryTraceDriver, RunStatus, RunSummary, TraceDriver, TraceError, TraceEvent};
pub use jsonl::JsonlTraceDriver;
pub use record::{
    Assertions, Check, CheckResult, ContextDelta, Dependencies, EnvironmentPins, ErrorInfo,
    ExecutionStatus, ProcessorInvocation, RecordIdentity, SerRecord, Timing,
};
