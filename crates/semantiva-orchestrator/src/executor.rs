//! Executor seam
//!
//! The orchestrator never runs processor code directly; it hands a
//! [`NodeJob`] to an [`Executor`] and blocks on the returned handle. The
//! scheduling model stays strictly sequential regardless of executor: the
//! orchestrator submits one job and waits for it before touching the next
//! node.

use crate::error::ExecutorError;
use semantiva_pipeline::{ExecutionContext, Processor, ProcessorError};
use serde_json::Value;

/// Everything one node attempt needs, moved into the executor
pub struct NodeJob {
    /// Constructed processor
    pub processor: Box<dyn Processor>,
    /// Upstream payload
    pub payload: Value,
    /// Context state at submission
    pub context: ExecutionContext,
}

impl NodeJob {
    /// Run the processor to completion.
    #[must_use]
    pub fn run(mut self) -> NodeOutcome {
        let result = self.processor.process(self.payload, &mut self.context);
        NodeOutcome {
            context: self.context,
            result,
        }
    }
}

impl std::fmt::Debug for NodeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeJob")
            .field("payload", &self.payload)
            .field("context_keys", &self.context.keys())
            .finish_non_exhaustive()
    }
}

/// What came back from a node attempt
#[derive(Debug)]
pub struct NodeOutcome {
    /// Context state after the attempt, partial mutations included
    pub context: ExecutionContext,
    /// The processor's result
    pub result: Result<Value, ProcessorError>,
}

/// Handle to one submitted job
pub trait JobHandle {
    /// Block until the job finishes.
    ///
    /// # Errors
    /// Returns [`ExecutorError`] when the worker itself failed (as opposed to
    /// the processor returning an error, which is a normal [`NodeOutcome`]).
    fn wait(self: Box<Self>) -> Result<NodeOutcome, ExecutorError>;
}

/// Where node jobs run
pub trait Executor: Send {
    /// Submit one job. The orchestrator waits on the handle immediately.
    fn submit(&self, job: NodeJob) -> Box<dyn JobHandle>;
}

/// Runs jobs on the calling thread at submission time
///
/// Processor panics are caught and surface as
/// [`ExecutorError::WorkerPanicked`], so the orchestrator's trace cleanup
/// still runs when a node blows up.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl InlineExecutor {
    /// Create an inline executor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct ReadyHandle(Result<NodeOutcome, ExecutorError>);

impl JobHandle for ReadyHandle {
    fn wait(self: Box<Self>) -> Result<NodeOutcome, ExecutorError> {
        self.0
    }
}

impl Executor for InlineExecutor {
    fn submit(&self, job: NodeJob) -> Box<dyn JobHandle> {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| job.run()))
            .map_err(|_| ExecutorError::WorkerPanicked);
        Box::new(ReadyHandle(outcome))
    }
}

/// Runs each job on a fresh worker thread
///
/// Isolates processor panics from the orchestrator thread: a panicked worker
/// surfaces as [`ExecutorError::WorkerPanicked`] instead of unwinding through
/// the run loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadExecutor;

impl ThreadExecutor {
    /// Create a thread-per-job executor
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

struct ThreadHandle(std::thread::JoinHandle<NodeOutcome>);

impl JobHandle for ThreadHandle {
    fn wait(self: Box<Self>) -> Result<NodeOutcome, ExecutorError> {
        self.0.join().map_err(|_| ExecutorError::WorkerPanicked)
    }
}

impl Executor for ThreadExecutor {
    fn submit(&self, job: NodeJob) -> Box<dyn JobHandle> {
        Box::new(ThreadHandle(std::thread::spawn(move || job.run())))
    }
}
