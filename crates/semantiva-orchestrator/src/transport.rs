//! Transport seam
//!
//! Nodes with a declared output port publish their payload and a context
//! snapshot through a [`Transport`]. Execution semantics never depend on the
//! transport; a publish failure fails the run, but a [`NullTransport`] run
//! and a publishing run compute identical results.

use crate::error::TransportError;
use semantiva_pipeline::ExecutionContext;
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Sink for node output publications
pub trait Transport: Send {
    /// Publish one payload on `channel` with the context at publication time.
    ///
    /// # Errors
    /// Propagates sink failures.
    fn publish(
        &mut self,
        channel: &str,
        payload: &Value,
        context: &ExecutionContext,
    ) -> Result<(), TransportError>;
}

/// Discards every publication
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

impl NullTransport {
    /// Create a discarding transport
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for NullTransport {
    fn publish(
        &mut self,
        channel: &str,
        _payload: &Value,
        _context: &ExecutionContext,
    ) -> Result<(), TransportError> {
        tracing::trace!(channel, "publication discarded");
        Ok(())
    }
}

/// One captured publication
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    /// Channel published on
    pub channel: String,
    /// Published payload
    pub payload: Value,
    /// Context snapshot at publication time
    pub context: ExecutionContext,
}

/// Retains every publication in memory, for tests and dry inspection
///
/// Clones share one buffer, so a handle kept outside the orchestrator sees
/// what the orchestrator-owned clone published.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    publications: Arc<Mutex<Vec<Publication>>>,
}

impl MemoryTransport {
    /// Create an empty transport
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publications captured so far, in order
    #[must_use]
    pub fn publications(&self) -> Vec<Publication> {
        self.publications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl Transport for MemoryTransport {
    fn publish(
        &mut self,
        channel: &str,
        payload: &Value,
        context: &ExecutionContext,
    ) -> Result<(), TransportError> {
        self.publications
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Publication {
                channel: channel.to_string(),
                payload: payload.clone(),
                context: context.snapshot(),
            });
        Ok(())
    }
}
