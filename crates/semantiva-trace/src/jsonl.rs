//! JSONL trace driver
//!
//! One JSON object per line, keys sorted, three envelope kinds tagged by
//! `type`: `pipeline_start`, `node`, `pipeline_end`. Lines are buffered;
//! `flush` and `close` push them to disk.

use crate::driver::{RunSummary, TraceDriver, TraceError};
use crate::record::SerRecord;
use semantiva_pipeline::CanonicalSpec;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Envelope<'a> {
    PipelineStart {
        pipeline_id: &'a str,
        run_id: &'a str,
        canonical_spec: &'a CanonicalSpec,
        meta: &'a Value,
    },
    Node {
        #[serde(flatten)]
        record: &'a SerRecord,
    },
    PipelineEnd {
        run_id: &'a str,
        summary: &'a RunSummary,
    },
}

/// Append-only JSONL sink
#[derive(Debug)]
pub struct JsonlTraceDriver {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlTraceDriver {
    /// Create (truncating) the trace file at `path`.
    ///
    /// # Errors
    /// Propagates file creation failures.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TraceError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
        })
    }

    /// Path the driver writes to
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&mut self, envelope: &Envelope<'_>) -> Result<(), TraceError> {
        let Some(writer) = self.writer.as_mut() else {
            // Writes after close are dropped; the run is already over.
            tracing::warn!(path = %self.path.display(), "trace event after close dropped");
            return Ok(());
        };
        // Round-trip through Value so keys come out sorted.
        let line = serde_json::to_value(envelope)?.to_string();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

impl TraceDriver for JsonlTraceDriver {
    fn on_pipeline_start(
        &mut self,
        pipeline_id: &str,
        run_id: &str,
        spec: &CanonicalSpec,
        meta: &Value,
    ) -> Result<(), TraceError> {
        self.write_line(&Envelope::PipelineStart {
            pipeline_id,
            run_id,
            canonical_spec: spec,
            meta,
        })
    }

    fn on_node_event(&mut self, record: &SerRecord) -> Result<(), TraceError> {
        self.write_line(&Envelope::Node { record })
    }

    fn on_pipeline_end(&mut self, run_id: &str, summary: &RunSummary) -> Result<(), TraceError> {
        self.write_line(&Envelope::PipelineEnd { run_id, summary })
    }

    fn flush(&mut self) -> Result<(), TraceError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), TraceError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }
}
