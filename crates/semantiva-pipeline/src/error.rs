//! Error types for pipeline declaration and canonicalization

use semantiva_identity::IdentityError;

/// Errors raised while loading or canonicalizing a pipeline declaration
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// YAML declaration could not be parsed
    #[error("invalid pipeline declaration: {0}")]
    Declaration(#[from] serde_yaml::Error),

    /// Declaration has no nodes
    #[error("pipeline '{0}' declares no nodes")]
    EmptyPipeline(String),

    /// Identity computation failed while canonicalizing
    #[error("identity error: {0}")]
    Identity(#[from] IdentityError),

    /// Processor resolution failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Processor factory rejected the node's configuration
    #[error("processor construction failed: {0}")]
    Construction(#[from] crate::processor::ProcessorError),
}

/// Errors raised by the processor registry
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Reference does not name a registered processor
    #[error("unknown processor '{name}' (registered: {available:?})")]
    UnknownProcessor {
        /// The unresolved reference
        name: String,
        /// Names that are registered, for the diagnostic
        available: Vec<String>,
    },
}
