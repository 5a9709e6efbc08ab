//! Run-space declaration model
//!
//! Parsed once from configuration, then treated as immutable by the
//! expander. The YAML shape:
//!
//! ```yaml
//! combine: product
//! max_runs: 500
//! blocks:
//!   - mode: zip
//!     context:
//!       a: [1, 2, 3]
//!       b: [10, 20, 30]
//!   - mode: product
//!     source:
//!       path: params.csv
//!       format: csv
//!       select: [gain, offset]
//!       rename: { gain: g }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default run cap applied when a declaration does not set one.
const DEFAULT_MAX_RUNS: u64 = 10_000;

/// How lists of runs are combined, within a block and across blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Positional: i-th value of every key forms the i-th run
    #[serde(alias = "by_position")]
    Zip,
    /// Combinatorial: Cartesian product over keys (sorted) or blocks
    /// (declaration order)
    #[default]
    #[serde(alias = "combinatorial")]
    Product,
}

impl CombineMode {
    /// Canonical lowercase name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Product => "product",
        }
    }
}

/// Declarative sweep configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpaceSpec {
    /// Expansion units, in declaration order
    #[serde(default)]
    pub blocks: Vec<RunBlock>,
    /// How per-block run lists combine
    #[serde(default)]
    pub combine: CombineMode,
    /// Hard cap on expanded run count
    #[serde(default = "default_max_runs")]
    pub max_runs: u64,
    /// Expand only; callers skip execution when set
    #[serde(default)]
    pub dry_run: bool,
}

fn default_max_runs() -> u64 {
    DEFAULT_MAX_RUNS
}

impl Default for RunSpaceSpec {
    fn default() -> Self {
        Self {
            blocks: Vec::new(),
            combine: CombineMode::default(),
            max_runs: DEFAULT_MAX_RUNS,
            dry_run: false,
        }
    }
}

impl RunSpaceSpec {
    /// Parse a declaration from YAML text
    ///
    /// # Errors
    /// Returns the underlying YAML error on malformed input.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

/// One expansion unit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunBlock {
    /// How this block's keys expand
    #[serde(default)]
    pub mode: CombineMode,
    /// Inline columns: key → value list
    #[serde(default)]
    pub context: BTreeMap<String, Vec<Value>>,
    /// Optional external tabular source merged into the block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RunSource>,
}

/// External tabular data reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSource {
    /// File path, resolved against the expansion working directory
    pub path: PathBuf,
    /// File format
    pub format: SourceFormat,
    /// Shape interpretation for JSON/YAML documents
    #[serde(default)]
    pub mode: SourceMode,
    /// Restrict to these columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Rename columns, old → new
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename: Option<BTreeMap<String, String>>,
}

/// Supported source file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Header-defined columns, scalar-coerced cells
    Csv,
    /// One document, row- or column-oriented
    Json,
    /// One document, row- or column-oriented
    Yaml,
    /// One JSON object per line, column-unioned
    Ndjson,
}

impl SourceFormat {
    /// Canonical lowercase name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Ndjson => "ndjson",
        }
    }
}

/// How a JSON/YAML document maps to columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Detect from the document shape: a list is rows, a mapping is columns
    #[default]
    Auto,
    /// List of mappings, one run per element
    Rows,
    /// Mapping of lists (bare scalars wrap into singleton lists)
    Columns,
}
