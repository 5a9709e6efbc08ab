//! Sequential pipeline orchestrator
//!
//! Drives one pipeline run node by node: resolve, check, execute, observe,
//! record. Scheduling is strictly sequential — one job is submitted to the
//! executor and waited on before the next node is touched, so context
//! mutation needs no synchronization.
//!
//! Record guarantees: when a trace driver is attached, every node attempt
//! produces exactly one execution record, failed attempts included, and the
//! driver is flushed and closed on every exit path.

use crate::delta::{DeltaCollector, DeltaOptions};
use crate::environment::environment_pins;
use crate::error::{OrchestratorError, TransportError};
use crate::executor::{Executor, InlineExecutor, NodeJob};
use crate::transport::{NullTransport, Transport};
use semantiva_identity::{pipeline_config_id, pipeline_id, pipeline_semantic_id};
use semantiva_pipeline::{
    node_semantic_ids, CanonicalNode, CanonicalSpec, CanonicalSpecBuilder, ExecutionContext,
    PipelineDecl, ProcessorDescriptor, ProcessorRegistry, RequiredKeys,
};
use semantiva_runspace::{expand, RunSpaceMeta, RunSpaceSpec};
use semantiva_trace::{
    Assertions, Check, ContextDelta, Dependencies, EnvironmentPins, ErrorInfo, ExecutionStatus,
    ProcessorInvocation, RecordIdentity, RunStatus, RunSummary, SerRecord, Timing, TraceDriver,
};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Run identifier
    pub run_id: String,
    /// Final payload out of the last node
    pub payload: Value,
    /// Context state after the last node
    pub context: ExecutionContext,
}

/// Result of executing a whole run space
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpaceOutcome {
    /// Expansion provenance
    pub meta: RunSpaceMeta,
    /// One output per run, in expansion order; empty for a dry run
    pub outputs: Vec<PipelineOutput>,
}

/// Pipeline runner with injected executor, transport, and delta policy
pub struct Orchestrator {
    executor: Box<dyn Executor>,
    transport: Box<dyn Transport>,
    delta: DeltaCollector,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Inline executor, discarding transport, shape-only deltas
    #[must_use]
    pub fn new() -> Self {
        Self {
            executor: Box::new(InlineExecutor::new()),
            transport: Box::new(NullTransport::new()),
            delta: DeltaCollector::default(),
        }
    }

    /// Replace the executor
    #[must_use]
    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.executor = Box::new(executor);
        self
    }

    /// Replace the transport
    #[must_use]
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Box::new(transport);
        self
    }

    /// Replace the delta summary policy
    #[must_use]
    pub fn with_delta_options(mut self, options: DeltaOptions) -> Self {
        self.delta = DeltaCollector::new(options);
        self
    }

    /// Execute one pipeline run.
    ///
    /// `payload` feeds the first node; `context` seeds the execution context.
    /// When `trace` is given, identity is computed up front, the full record
    /// stream is emitted, and the driver is flushed and closed before this
    /// method returns — on the error path too.
    ///
    /// # Errors
    /// Any [`OrchestratorError`]; records for the failing node are emitted
    /// before the error propagates.
    pub fn execute(
        &mut self,
        decl: &PipelineDecl,
        registry: &ProcessorRegistry,
        payload: Value,
        context: ExecutionContext,
        mut trace: Option<&mut dyn TraceDriver>,
    ) -> Result<PipelineOutput, OrchestratorError> {
        // Reborrow per call so the driver is still usable for cleanup below.
        let result = match trace.as_mut() {
            Some(driver) => {
                self.execute_inner(decl, registry, payload, context, Some(&mut **driver))
            }
            None => self.execute_inner(decl, registry, payload, context, None),
        };
        if let Some(driver) = trace {
            let cleanup = driver.flush().and_then(|()| driver.close());
            if let Err(err) = cleanup {
                tracing::error!(error = %err, "trace cleanup failed");
                if result.is_ok() {
                    return Err(err.into());
                }
            }
        }
        result
    }

    /// Expand a run space and execute every run sequentially.
    ///
    /// Each run seeds a fresh context from its parameter assignment; `payload`
    /// is cloned into every run. A `dry_run` spec expands and returns metadata
    /// without executing anything. Per-run tracing is the caller's loop:
    /// expand with [`semantiva_runspace::expand`] and call
    /// [`Orchestrator::execute`] with a fresh driver per run.
    ///
    /// # Errors
    /// Expansion errors surface before any run executes; a failing run stops
    /// the sweep at that run.
    pub fn execute_run_space(
        &mut self,
        decl: &PipelineDecl,
        registry: &ProcessorRegistry,
        spec: &RunSpaceSpec,
        cwd: &Path,
        payload: Value,
    ) -> Result<RunSpaceOutcome, OrchestratorError> {
        let (runs, meta) = expand(spec, cwd)?;
        if spec.dry_run {
            return Ok(RunSpaceOutcome {
                meta,
                outputs: Vec::new(),
            });
        }

        let mut outputs = Vec::with_capacity(runs.len());
        for run in runs {
            let context = ExecutionContext::from(run.into_inner());
            outputs.push(self.execute(decl, registry, payload.clone(), context, None)?);
        }
        Ok(RunSpaceOutcome { meta, outputs })
    }

    #[allow(clippy::too_many_lines)]
    fn execute_inner(
        &mut self,
        decl: &PipelineDecl,
        registry: &ProcessorRegistry,
        mut payload: Value,
        mut context: ExecutionContext,
        trace: Option<&mut dyn TraceDriver>,
    ) -> Result<PipelineOutput, OrchestratorError> {
        let spec = CanonicalSpecBuilder::new().build(decl)?;

        // Resolve every processor before anything executes: an unknown name
        // fails the run with zero side effects.
        let descriptors = spec
            .nodes
            .iter()
            .map(|n| registry.descriptor(&n.processor))
            .collect::<Result<Vec<_>, _>>()
            .map_err(semantiva_pipeline::PipelineError::from)?;

        let run_id = format!("run-{}", Uuid::new_v4());
        let environment = environment_pins(registry);
        let upstream = spec.upstream_map();

        // Node semantic ids key transport channels, so they are always
        // computed; the pipeline-level identity hashes only matter when
        // someone records them.
        let node_sems: BTreeMap<Uuid, String> =
            node_semantic_ids(&spec).into_iter().collect();
        let mut ts = match trace {
            Some(driver) => Some(TraceState::start(driver, &spec, &run_id, &context, &node_sems)?),
            None => None,
        };

        tracing::info!(
            run_id = %run_id,
            pipeline = %spec.name,
            nodes = spec.nodes.len(),
            "pipeline run started"
        );

        // Instantiation phase: every node is constructed before the first
        // one runs, so a rejected configuration stops the run with zero
        // nodes executed. Identity is already on record at this point.
        let mut instances = Vec::with_capacity(spec.nodes.len());
        for (node, &descriptor) in spec.nodes.iter().zip(&descriptors) {
            let started_at = timestamp_now();
            let wall = Instant::now();
            let cpu = cpu_time::ProcessTime::try_now().ok();
            let (parameters, parameter_sources) =
                resolve_parameters(node, descriptor, &context);
            match registry.instantiate(&node.processor, &parameters) {
                Ok(instance) => {
                    let declared_writes = instance.declared_writes();
                    let required =
                        required_key_list(node, descriptor, &instance.required_keys());
                    instances.push(PreparedNode {
                        instance,
                        parameters,
                        parameter_sources,
                        declared_writes,
                        required,
                    });
                }
                Err(err) => {
                    let mut obs =
                        NodeObservation::new(parameters, parameter_sources, started_at);
                    obs.finish_error(wall, cpu, error_info_for_pipeline(&err));
                    emit_failure(&mut ts, &run_id, node, &upstream, &environment, obs, 0)?;
                    return Err(err.into());
                }
            }
        }

        let mut nodes_executed = 0usize;
        for ((node, &descriptor), prepared) in
            spec.nodes.iter().zip(&descriptors).zip(instances)
        {
            let started_at = timestamp_now();
            let wall = Instant::now();
            let cpu = cpu_time::ProcessTime::try_now().ok();
            let pre_ctx = context.snapshot();

            let PreparedNode {
                instance,
                parameters,
                parameter_sources,
                declared_writes,
                required,
            } = prepared;
            let mut obs = NodeObservation::new(parameters, parameter_sources, started_at);

            // Check outcomes are evidence, not gates: a FAIL is recorded in
            // the node's record and the run continues. Only a raised error
            // stops the run.
            obs.preconditions = preconditions(node, descriptor, &required, &payload, &pre_ctx);

            let handle = self.executor.submit(NodeJob {
                processor: instance,
                payload: payload.clone(),
                context: pre_ctx.snapshot(),
            });
            let outcome = match handle.wait() {
                Ok(outcome) => outcome,
                Err(err) => {
                    obs.finish_error(
                        wall,
                        cpu,
                        ErrorInfo {
                            kind: "ExecutorFailure".to_string(),
                            message: err.to_string(),
                        },
                    );
                    nodes_executed += 1;
                    emit_failure(&mut ts, &run_id, node, &upstream, &environment, obs, nodes_executed)?;
                    return Err(err.into());
                }
            };

            // Delta is observed even when the processor failed: partial
            // mutations belong in the record.
            obs.delta = self.delta.compute(&pre_ctx, &outcome.context, &required);

            match outcome.result {
                Ok(output) => {
                    obs.postconditions =
                        postconditions(descriptor, &declared_writes, &output, &outcome.context);
                    obs.finish_ok(wall, cpu);
                    nodes_executed += 1;
                    if let Some(ts) = ts.as_mut() {
                        let record = ts.node_record(&run_id, node, &upstream, &environment, &obs);
                        ts.driver.on_node_event(&record)?;
                    }

                    context = outcome.context;
                    payload = output;
                    // Channel key is the node's semantic identity, so
                    // consumers subscribe to what a node means, not where
                    // it sits in the chain.
                    let channel = node_sems
                        .get(&node.node_uuid)
                        .cloned()
                        .unwrap_or_else(|| node.node_uuid.to_string());
                    if let Err(err) = self.transport.publish(&channel, &payload, &context) {
                        finish_run(&mut ts, &run_id, nodes_executed, Some(error_info(&err)))?;
                        return Err(err.into());
                    }
                }
                Err(perr) => {
                    obs.postconditions = vec![Check::fail(
                        perr.code(),
                        json!({ "error": perr.to_string() }),
                    )];
                    obs.finish_error(
                        wall,
                        cpu,
                        ErrorInfo {
                            kind: perr.code().to_string(),
                            message: perr.to_string(),
                        },
                    );
                    nodes_executed += 1;
                    emit_failure(&mut ts, &run_id, node, &upstream, &environment, obs, nodes_executed)?;
                    return Err(OrchestratorError::Node {
                        node_uuid: node.node_uuid,
                        processor: node.processor.clone(),
                        source: perr,
                    });
                }
            }
        }

        finish_run(&mut ts, &run_id, nodes_executed, None)?;
        tracing::info!(run_id = %run_id, nodes = nodes_executed, "pipeline run finished");
        Ok(PipelineOutput {
            run_id,
            payload,
            context,
        })
    }
}

/// Per-run identity plus the attached driver
struct TraceState<'d> {
    driver: &'d mut dyn TraceDriver,
    pipeline_id: String,
    node_semantic_ids: BTreeMap<Uuid, String>,
}

impl<'d> TraceState<'d> {
    fn start(
        driver: &'d mut dyn TraceDriver,
        spec: &CanonicalSpec,
        run_id: &str,
        context: &ExecutionContext,
        node_sems: &BTreeMap<Uuid, String>,
    ) -> Result<Self, OrchestratorError> {
        let pid = pipeline_id(spec);
        let sem_pairs: Vec<(Uuid, String)> = node_sems
            .iter()
            .map(|(uuid, sid)| (*uuid, sid.clone()))
            .collect();
        let config_id = pipeline_config_id(&sem_pairs);
        let semantic_id = pipeline_semantic_id(&spec.structural());

        let mut meta = json!({
            "num_nodes": spec.nodes.len(),
            "semantic_id": semantic_id,
            "config_id": config_id,
            "node_semantic_ids": node_sems
                .iter()
                .map(|(uuid, sid)| (uuid.to_string(), sid.clone()))
                .collect::<BTreeMap<String, String>>(),
        });
        // Run-space foreign keys only when a run seeded the context.
        if !context.is_empty() {
            meta["run_space"] = json!({ "context_keys": context.keys() });
        }
        driver.on_pipeline_start(&pid, run_id, spec, &meta)?;

        Ok(Self {
            driver,
            pipeline_id: pid,
            node_semantic_ids: node_sems.clone(),
        })
    }

    fn node_record(
        &self,
        run_id: &str,
        node: &CanonicalNode,
        upstream: &BTreeMap<Uuid, Vec<Uuid>>,
        environment: &EnvironmentPins,
        obs: &NodeObservation,
    ) -> SerRecord {
        SerRecord {
            identity: RecordIdentity {
                run_id: run_id.to_string(),
                pipeline_id: self.pipeline_id.clone(),
                node_id: node.node_uuid.to_string(),
            },
            dependencies: Dependencies {
                upstream: upstream
                    .get(&node.node_uuid)
                    .map(|ups| ups.iter().map(Uuid::to_string).collect())
                    .unwrap_or_default(),
            },
            processor: ProcessorInvocation {
                reference: node.processor.clone(),
                parameters: obs.parameters.clone(),
                parameter_sources: obs.parameter_sources.clone(),
                semantic_id: self.node_semantic_ids.get(&node.node_uuid).cloned(),
            },
            context_delta: obs.delta.clone(),
            assertions: Assertions {
                preconditions: obs.preconditions.clone(),
                postconditions: obs.postconditions.clone(),
                environment: environment.clone(),
            },
            timing: Timing {
                started_at: obs.started_at.clone(),
                finished_at: obs.finished_at.clone(),
                wall_ms: obs.wall_ms,
                cpu_ms: obs.cpu_ms,
            },
            status: obs.status,
            error: obs.error.clone(),
        }
    }
}

/// A node constructed during the instantiation phase, waiting to run
struct PreparedNode {
    instance: Box<dyn semantiva_pipeline::Processor>,
    parameters: BTreeMap<String, Value>,
    parameter_sources: BTreeMap<String, String>,
    declared_writes: Vec<String>,
    required: Vec<String>,
}

/// Everything observed about one node attempt, accumulated across the
/// lifecycle phases
struct NodeObservation {
    parameters: BTreeMap<String, Value>,
    parameter_sources: BTreeMap<String, String>,
    preconditions: Vec<Check>,
    postconditions: Vec<Check>,
    delta: ContextDelta,
    started_at: String,
    finished_at: String,
    wall_ms: u64,
    cpu_ms: Option<u64>,
    status: ExecutionStatus,
    error: Option<ErrorInfo>,
}

impl NodeObservation {
    fn new(
        parameters: BTreeMap<String, Value>,
        parameter_sources: BTreeMap<String, String>,
        started_at: String,
    ) -> Self {
        Self {
            parameters,
            parameter_sources,
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            delta: ContextDelta::default(),
            started_at,
            finished_at: String::new(),
            wall_ms: 0,
            cpu_ms: None,
            status: ExecutionStatus::Succeeded,
            error: None,
        }
    }

    fn finish_ok(&mut self, wall: Instant, cpu: Option<cpu_time::ProcessTime>) {
        self.finish(wall, cpu);
        self.status = ExecutionStatus::Succeeded;
    }

    fn finish_error(
        &mut self,
        wall: Instant,
        cpu: Option<cpu_time::ProcessTime>,
        error: ErrorInfo,
    ) {
        self.finish(wall, cpu);
        self.status = ExecutionStatus::Error;
        self.error = Some(error);
    }

    fn finish(&mut self, wall: Instant, cpu: Option<cpu_time::ProcessTime>) {
        self.finished_at = timestamp_now();
        self.wall_ms = u64::try_from(wall.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.cpu_ms = cpu
            .and_then(|start| start.try_elapsed().ok())
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
    }
}

/// Resolve a node's effective parameters with provenance: node configuration
/// wins over context values, which win over declared defaults.
fn resolve_parameters(
    node: &CanonicalNode,
    descriptor: &ProcessorDescriptor,
    context: &ExecutionContext,
) -> (BTreeMap<String, Value>, BTreeMap<String, String>) {
    let mut parameters = BTreeMap::new();
    let mut sources = BTreeMap::new();

    for name in &descriptor.parameter_names {
        if let Some(value) = node.params.get(name) {
            parameters.insert(name.clone(), value.clone());
            sources.insert(name.clone(), "node".to_string());
        } else if let Some(value) = context.get(name) {
            parameters.insert(name.clone(), value.clone());
            sources.insert(name.clone(), "context".to_string());
        } else if let Some(value) = descriptor.default_params.get(name) {
            parameters.insert(name.clone(), value.clone());
            sources.insert(name.clone(), "default".to_string());
        }
    }

    // Extra configured keys pass through; config_valid flags them.
    for (name, value) in &node.params {
        if !parameters.contains_key(name) {
            parameters.insert(name.clone(), value.clone());
            sources.insert(name.clone(), "node".to_string());
        }
    }

    (parameters, sources)
}

/// A node's declared reads: the explicit required-keys hook, parameter names
/// satisfiable only from the context (no node config, no default), and the
/// declared input context keys. Sorted and deduplicated.
fn required_key_list(
    node: &CanonicalNode,
    descriptor: &ProcessorDescriptor,
    required_keys: &RequiredKeys,
) -> Vec<String> {
    let mut required: BTreeSet<String> = node.input_context_keys.iter().cloned().collect();
    if let RequiredKeys::Keys(keys) = required_keys {
        required.extend(keys.iter().cloned());
    }
    for name in &descriptor.parameter_names {
        if !node.params.contains_key(name) && !descriptor.default_params.contains_key(name) {
            required.insert(name.clone());
        }
    }
    required.into_iter().collect()
}

fn preconditions(
    node: &CanonicalNode,
    descriptor: &ProcessorDescriptor,
    required: &[String],
    payload: &Value,
    context: &ExecutionContext,
) -> Vec<Check> {
    let mut checks = Vec::with_capacity(3);

    let missing: Vec<&str> = required
        .iter()
        .map(String::as_str)
        .filter(|key| !context.contains_key(key))
        .collect();
    checks.push(if missing.is_empty() {
        Check::pass("required_keys_present")
    } else {
        Check::fail("required_keys_present", json!({ "missing": missing }))
    });

    checks.push(if descriptor.input_type.accepts(payload) {
        Check::pass("input_type_ok")
    } else {
        Check::fail(
            "input_type_ok",
            json!({
                "expected": descriptor.input_type.name(),
                "got": value_kind(payload),
            }),
        )
    });

    let unknown: Vec<&String> = node
        .params
        .keys()
        .filter(|k| !descriptor.parameter_names.contains(k))
        .collect();
    checks.push(if unknown.is_empty() {
        Check::pass("config_valid")
    } else {
        // Unknown parameters are suspicious but not fatal.
        Check::warn("config_valid", json!({ "unknown_params": unknown }))
    });

    checks
}

fn postconditions(
    descriptor: &ProcessorDescriptor,
    declared_writes: &[String],
    output: &Value,
    context: &ExecutionContext,
) -> Vec<Check> {
    let mut checks = Vec::with_capacity(2);

    checks.push(if descriptor.output_type.accepts(output) {
        Check::pass("output_type_ok")
    } else {
        Check::fail(
            "output_type_ok",
            json!({
                "expected": descriptor.output_type.name(),
                "got": value_kind(output),
            }),
        )
    });

    let unrealized: Vec<&String> = declared_writes
        .iter()
        .filter(|key| !context.contains_key(key))
        .collect();
    checks.push(if unrealized.is_empty() {
        Check::pass("context_writes_realized")
    } else {
        Check::fail("context_writes_realized", json!({ "missing": unrealized }))
    });

    checks
}

fn emit_failure(
    ts: &mut Option<TraceState<'_>>,
    run_id: &str,
    node: &CanonicalNode,
    upstream: &BTreeMap<Uuid, Vec<Uuid>>,
    environment: &EnvironmentPins,
    obs: NodeObservation,
    nodes_executed: usize,
) -> Result<(), OrchestratorError> {
    if let Some(ts) = ts.as_mut() {
        let record = ts.node_record(run_id, node, upstream, environment, &obs);
        ts.driver.on_node_event(&record)?;
        ts.driver.on_pipeline_end(
            run_id,
            &RunSummary {
                status: RunStatus::Error,
                nodes_executed,
                error: obs.error,
            },
        )?;
    }
    Ok(())
}

fn finish_run(
    ts: &mut Option<TraceState<'_>>,
    run_id: &str,
    nodes_executed: usize,
    error: Option<ErrorInfo>,
) -> Result<(), OrchestratorError> {
    if let Some(ts) = ts.as_mut() {
        let status = if error.is_some() {
            RunStatus::Error
        } else {
            RunStatus::Ok
        };
        ts.driver.on_pipeline_end(
            run_id,
            &RunSummary {
                status,
                nodes_executed,
                error,
            },
        )?;
    }
    Ok(())
}

fn error_info(err: &TransportError) -> ErrorInfo {
    ErrorInfo {
        kind: "TransportError".to_string(),
        message: err.to_string(),
    }
}

fn error_info_for_pipeline(err: &semantiva_pipeline::PipelineError) -> ErrorInfo {
    let kind = match err {
        semantiva_pipeline::PipelineError::Construction(perr) => perr.code().to_string(),
        semantiva_pipeline::PipelineError::Registry(_) => "UnknownProcessor".to_string(),
        _ => "PipelineError".to_string(),
    };
    ErrorInfo {
        kind,
        message: err.to_string(),
    }
}

fn timestamp_now() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
