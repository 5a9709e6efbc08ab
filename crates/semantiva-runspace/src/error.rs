//! Run-space error taxonomy
//!
//! Configuration errors are raised before any expansion output exists —
//! expansion is never partially applied. Capacity errors carry both the
//! would-be size and the limit so callers can produce remediation messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

/// A run-space declaration is invalid
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Key declared both inline and by the block's source
    #[error("duplicate key '{key}' in block {block}: declared inline and by the source")]
    DuplicateKey {
        /// Offending key
        key: String,
        /// Zero-based block index
        block: usize,
    },

    /// Key appears in more than one block
    #[error("key '{key}' already provided by an earlier block (seen again in block {block})")]
    CrossBlockDuplicate {
        /// Offending key
        key: String,
        /// Zero-based index of the later block
        block: usize,
    },

    /// Zip block columns have unequal lengths
    #[error("zip block {block} has mismatched lengths: {lengths:?}")]
    ZipLengthMismatch {
        /// Zero-based block index
        block: usize,
        /// Per-key list lengths
        lengths: BTreeMap<String, usize>,
    },

    /// Zip combine over blocks of different sizes
    #[error("zip combine requires equal block sizes, got {sizes:?}")]
    ZipCombineSizeMismatch {
        /// Per-block run counts, in declaration order
        sizes: Vec<usize>,
    },

    /// `select` named a column the source does not have
    #[error("column '{column}' not found in {path}; available: {available:?}")]
    MissingColumn {
        /// Requested column
        column: String,
        /// Columns the source actually provides, sorted
        available: Vec<String>,
        /// Source path
        path: PathBuf,
    },

    /// `rename` target collides with an existing or another renamed column
    #[error("rename target '{target}' collides with an existing column in {path}")]
    RenameCollision {
        /// Colliding target name
        target: String,
        /// Source path
        path: PathBuf,
    },

    /// Source file content could not be parsed
    #[error("failed to parse {path} as {format}: {reason}")]
    SourceParse {
        /// Source path
        path: PathBuf,
        /// Declared format
        format: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Source parsed but its shape is not tabular
    #[error("source {path} has an unsupported shape: {reason}")]
    SourceShape {
        /// Source path
        path: PathBuf,
        /// What was wrong
        reason: String,
    },
}

/// Expansion would exceed the declared run cap
///
/// Raised from block sizes alone, before any combination is materialized.
#[derive(Debug, thiserror::Error)]
#[error("run space expands to {actual_runs} runs, exceeding max_runs={max_runs}")]
pub struct CapacityExceededError {
    /// Run count the spec would expand to
    pub actual_runs: u64,
    /// Declared cap
    pub max_runs: u64,
}

/// Top-level run-space error
#[derive(Debug, thiserror::Error)]
pub enum RunSpaceError {
    /// Declaration is invalid
    #[error(transparent)]
    Config(#[from] ConfigurationError),

    /// Expansion exceeds `max_runs`
    #[error(transparent)]
    Capacity(#[from] CapacityExceededError),

    /// Source file could not be read
    #[error("i/o error reading {path}: {source}")]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Source fingerprinting failed
    #[error("fingerprint error: {0}")]
    Identity(#[from] semantiva_identity::IdentityError),
}
