//! Pipeline object model for Semantiva
//!
//! Declares what a pipeline *is*, independent of how it executes: the
//! execution context that flows between nodes, the processor contract and its
//! capability interfaces, the explicit processor registry, the raw YAML
//! declaration, and the canonical (hashable) spec with deterministic node
//! UUIDs.

pub mod canonical;
pub mod config;
pub mod context;
mod error;
pub mod processor;
pub mod registry;
pub mod semantic;

pub use canonical::{CanonicalEdge, CanonicalNode, CanonicalSpec, CanonicalSpecBuilder, Ports};
pub use config::{NodeDecl, PipelineDecl, PortsDecl};
pub use context::ExecutionContext;
pub use error::{PipelineError, RegistryError};
pub use processor::{DataKind, Processor, ProcessorError, RequiredKeys};
pub use registry::{ProcessorDescriptor, ProcessorRegistry};
pub use semantic::{node_semantic_ids, node_semantic_meta};
