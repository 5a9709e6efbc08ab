//! Run-space expansion
//!
//! A run space declares parameter sweeps; expansion turns the declaration
//! into an ordered, auditable list of concrete runs plus provenance
//! metadata. Expansion is pure modulo reading the files a declaration
//! references: the same spec and the same files always produce the same runs
//! and the same metadata.
//!
//! Vocabulary: the canonical combine/block modes are `zip` (positional) and
//! `product` (combinatorial). The legacy spellings `by_position` and
//! `combinatorial` are accepted when deserializing declarations.

mod error;
pub mod expand;
pub mod source;
pub mod spec;

pub use error::{CapacityExceededError, ConfigurationError, RunSpaceError};
pub use expand::{expand, BlockMeta, Run, RunSpaceMeta, SourceMeta};
pub use source::{load_source, LoadedSource};
pub use spec::{CombineMode, RunBlock, RunSource, RunSpaceSpec, SourceFormat, SourceMode};
