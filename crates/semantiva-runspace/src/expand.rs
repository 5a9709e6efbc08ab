//! Run-space expansion
//!
//! Turns a [`RunSpaceSpec`] into an ordered run list plus provenance
//! metadata. All configuration errors are raised before any run is produced,
//! and the capacity cap is enforced from block sizes alone — a spec that
//! would blow past `max_runs` never materializes a single combination.

use crate::error::{CapacityExceededError, ConfigurationError, RunSpaceError};
use crate::source::load_source;
use crate::spec::{CombineMode, RunSpaceSpec, SourceFormat, SourceMode};
use semantiva_identity::Fingerprint;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One concrete parameter assignment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Run {
    values: BTreeMap<String, Value>,
}

impl Run {
    /// Look up a parameter
    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Iterate parameters in key order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Number of parameters
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the run carries no parameters
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume into the underlying map
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.values
    }
}

impl From<BTreeMap<String, Value>> for Run {
    fn from(values: BTreeMap<String, Value>) -> Self {
        Self { values }
    }
}

/// Provenance metadata for one expansion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSpaceMeta {
    /// Top-level combine mode
    pub combine: CombineMode,
    /// Declared cap
    pub max_runs: u64,
    /// Number of runs produced
    pub expanded_runs: usize,
    /// Per-block provenance, in declaration order
    pub blocks: Vec<BlockMeta>,
}

/// Per-block provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockMeta {
    /// Block expansion mode
    pub mode: CombineMode,
    /// Runs this block contributed before combining
    pub size: usize,
    /// Sorted keys the block provides
    pub context_keys: Vec<String>,
    /// Source provenance, when the block declared one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceMeta>,
}

/// Source provenance recorded in metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMeta {
    /// Declared path
    pub path: PathBuf,
    /// Declared format
    pub format: SourceFormat,
    /// Declared shape mode
    pub mode: SourceMode,
    /// Declared column selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub select: Option<Vec<String>>,
    /// Declared column renames
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rename: Option<BTreeMap<String, String>>,
    /// Whole-file digest, for provenance and cache invalidation
    pub sha256: Fingerprint,
}

/// Expand a run-space spec into concrete runs plus metadata.
///
/// Pure modulo reading the files the spec references: identical inputs give
/// identical output, and nothing is mutated on failure.
///
/// # Errors
/// [`ConfigurationError`] for invalid specs (raised before any run exists),
/// [`CapacityExceededError`] when the computed run count exceeds `max_runs`.
pub fn expand(spec: &RunSpaceSpec, cwd: &Path) -> Result<(Vec<Run>, RunSpaceMeta), RunSpaceError> {
    // Phase 1: resolve every block's columns and detect key collisions.
    let mut blocks: Vec<ResolvedBlock> = Vec::with_capacity(spec.blocks.len());
    let mut seen_keys: BTreeSet<String> = BTreeSet::new();

    for (index, block) in spec.blocks.iter().enumerate() {
        let mut columns: BTreeMap<String, Vec<Value>> = block.context.clone();
        let mut source_meta = None;

        if let Some(source) = &block.source {
            let loaded = load_source(source, cwd)?;
            for (key, values) in loaded.columns {
                if columns.contains_key(&key) {
                    return Err(ConfigurationError::DuplicateKey { key, block: index }.into());
                }
                columns.insert(key, values);
            }
            source_meta = Some(SourceMeta {
                path: source.path.clone(),
                format: source.format,
                mode: source.mode,
                select: source.select.clone(),
                rename: source.rename.clone(),
                sha256: loaded.sha256,
            });
        }

        for key in columns.keys() {
            if !seen_keys.insert(key.clone()) {
                return Err(ConfigurationError::CrossBlockDuplicate {
                    key: key.clone(),
                    block: index,
                }
                .into());
            }
        }

        let size = block_size(index, block.mode, &columns)?;
        blocks.push(ResolvedBlock {
            mode: block.mode,
            columns,
            size,
            source: source_meta,
        });
    }

    // Phase 2: capacity and combine-shape checks, from sizes alone.
    let total = match spec.combine {
        CombineMode::Product => {
            let mut total: u64 = 1;
            for b in &blocks {
                total = total
                    .checked_mul(b.size as u64)
                    .ok_or(CapacityExceededError {
                        actual_runs: u64::MAX,
                        max_runs: spec.max_runs,
                    })?;
            }
            total
        }
        CombineMode::Zip => {
            let sizes: Vec<usize> = blocks.iter().map(|b| b.size).collect();
            if let Some(first) = sizes.first() {
                if sizes.iter().any(|s| s != first) {
                    return Err(ConfigurationError::ZipCombineSizeMismatch { sizes }.into());
                }
                *first as u64
            } else {
                1
            }
        }
    };
    if total > spec.max_runs {
        return Err(CapacityExceededError {
            actual_runs: total,
            max_runs: spec.max_runs,
        }
        .into());
    }

    // Phase 3: materialize per-block runs, then combine.
    let per_block: Vec<Vec<Run>> = blocks.iter().map(ResolvedBlock::materialize).collect();

    let runs = match spec.combine {
        CombineMode::Zip => combine_zip(&per_block),
        CombineMode::Product => combine_product(&per_block),
    };
    debug_assert_eq!(runs.len() as u64, total);

    let meta = RunSpaceMeta {
        combine: spec.combine,
        max_runs: spec.max_runs,
        expanded_runs: runs.len(),
        blocks: blocks
            .into_iter()
            .map(|b| BlockMeta {
                mode: b.mode,
                size: b.size,
                context_keys: b.columns.keys().cloned().collect(),
                source: b.source,
            })
            .collect(),
    };

    tracing::info!(
        combine = meta.combine.name(),
        runs = meta.expanded_runs,
        blocks = meta.blocks.len(),
        "expanded run space"
    );
    Ok((runs, meta))
}

struct ResolvedBlock {
    mode: CombineMode,
    columns: BTreeMap<String, Vec<Value>>,
    size: usize,
    source: Option<SourceMeta>,
}

/// Run count a block will contribute, without materializing anything.
fn block_size(
    index: usize,
    mode: CombineMode,
    columns: &BTreeMap<String, Vec<Value>>,
) -> Result<usize, ConfigurationError> {
    match mode {
        CombineMode::Zip => {
            let lengths: BTreeMap<String, usize> =
                columns.iter().map(|(k, v)| (k.clone(), v.len())).collect();
            let mut distinct = lengths.values().copied().collect::<BTreeSet<usize>>();
            match (distinct.len(), distinct.pop_first()) {
                (0, _) => Ok(1), // no keys: one empty run
                (1, Some(n)) => Ok(n),
                _ => Err(ConfigurationError::ZipLengthMismatch {
                    block: index,
                    lengths,
                }),
            }
        }
        CombineMode::Product => Ok(columns.values().map(Vec::len).product()),
    }
}

impl ResolvedBlock {
    /// Materialize this block's run list. `size` was computed first, so the
    /// shape is already validated.
    fn materialize(&self) -> Vec<Run> {
        match self.mode {
            CombineMode::Zip => (0..self.size)
                .map(|i| {
                    self.columns
                        .iter()
                        .map(|(key, values)| (key.clone(), values[i].clone()))
                        .collect::<BTreeMap<_, _>>()
                        .into()
                })
                .collect(),
            CombineMode::Product => {
                // Keys iterate in sorted order (BTreeMap), making the output
                // the lexicographic product.
                let mut acc: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
                for (key, values) in &self.columns {
                    let mut next = Vec::with_capacity(acc.len() * values.len());
                    for partial in &acc {
                        for value in values {
                            let mut run = partial.clone();
                            run.insert(key.clone(), value.clone());
                            next.push(run);
                        }
                    }
                    acc = next;
                }
                acc.into_iter().map(Run::from).collect()
            }
        }
    }
}

/// Positional merge: the i-th run of every block fuses into one run.
fn combine_zip(per_block: &[Vec<Run>]) -> Vec<Run> {
    let Some(first) = per_block.first() else {
        return vec![Run::default()];
    };
    (0..first.len())
        .map(|i| {
            let mut merged = BTreeMap::new();
            for block in per_block {
                merged.extend(block[i].values.clone());
            }
            Run::from(merged)
        })
        .collect()
}

/// Cartesian product of block run lists, in declared block order.
fn combine_product(per_block: &[Vec<Run>]) -> Vec<Run> {
    let mut acc: Vec<BTreeMap<String, Value>> = vec![BTreeMap::new()];
    for block in per_block {
        let mut next = Vec::with_capacity(acc.len() * block.len());
        for partial in &acc {
            for run in block {
                let mut merged = partial.clone();
                merged.extend(run.values.clone());
                next.push(merged);
            }
        }
        acc = next;
    }
    acc.into_iter().map(Run::from).collect()
}
