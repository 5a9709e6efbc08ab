//! End-to-end orchestration behavior: record streams, failure handling,
//! transport publication, and run-space sweeps.

use semantiva_orchestrator::{MemoryTransport, Orchestrator, OrchestratorError};
use semantiva_pipeline::{
    DataKind, ExecutionContext, PipelineDecl, Processor, ProcessorDescriptor, ProcessorError,
    ProcessorRegistry,
};
use semantiva_runspace::RunSpaceSpec;
use semantiva_trace::{CheckResult, ExecutionStatus, MemoryTraceDriver, RunStatus, TraceEvent};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;

fn registry() -> ProcessorRegistry {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut registry = ProcessorRegistry::new();
    registry.initialize_defaults();
    registry.register(
        ProcessorDescriptor {
            name: "reject".to_string(),
            parameter_names: Vec::new(),
            default_params: BTreeMap::new(),
            input_type: DataKind::Any,
            output_type: DataKind::Any,
        },
        Box::new(|_| Ok(Box::new(Reject) as Box<dyn Processor>)),
    );
    registry.register(
        ProcessorDescriptor {
            name: "promise".to_string(),
            parameter_names: Vec::new(),
            default_params: BTreeMap::new(),
            input_type: DataKind::Any,
            output_type: DataKind::Any,
        },
        Box::new(|_| Ok(Box::new(Promise) as Box<dyn Processor>)),
    );
    registry.register(
        ProcessorDescriptor {
            name: "combust".to_string(),
            parameter_names: Vec::new(),
            default_params: BTreeMap::new(),
            input_type: DataKind::Any,
            output_type: DataKind::Any,
        },
        Box::new(|_| Ok(Box::new(Combust) as Box<dyn Processor>)),
    );
    registry
}

struct Reject;

impl Processor for Reject {
    fn input_type(&self) -> DataKind {
        DataKind::Any
    }

    fn output_type(&self) -> DataKind {
        DataKind::Any
    }

    fn process(
        &mut self,
        _payload: Value,
        _ctx: &mut ExecutionContext,
    ) -> Result<Value, ProcessorError> {
        Err(ProcessorError::failure("ValueError", "payload rejected"))
    }
}

/// Declares a context write it never performs.
struct Promise;

impl Processor for Promise {
    fn input_type(&self) -> DataKind {
        DataKind::Any
    }

    fn output_type(&self) -> DataKind {
        DataKind::Any
    }

    fn declared_writes(&self) -> Vec<String> {
        vec!["promised".to_string()]
    }

    fn process(
        &mut self,
        payload: Value,
        _ctx: &mut ExecutionContext,
    ) -> Result<Value, ProcessorError> {
        Ok(payload)
    }
}

struct Combust;

impl Processor for Combust {
    fn input_type(&self) -> DataKind {
        DataKind::Any
    }

    fn output_type(&self) -> DataKind {
        DataKind::Any
    }

    fn process(
        &mut self,
        _payload: Value,
        _ctx: &mut ExecutionContext,
    ) -> Result<Value, ProcessorError> {
        panic!("combusted")
    }
}

fn decl(yaml: &str) -> PipelineDecl {
    PipelineDecl::from_yaml(yaml).unwrap()
}

#[test]
fn successful_run_emits_full_record_stream() {
    let registry = registry();
    let pipeline = decl(
        r"
name: demo
nodes:
  - processor: scale
    params: { factor: 2.0 }
  - processor: annotate
    params: { key: done, value: true }
",
    );

    let mut driver = MemoryTraceDriver::new();
    let mut orchestrator = Orchestrator::new();
    let output = orchestrator
        .execute(
            &pipeline,
            &registry,
            json!(21.0),
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap();

    assert_eq!(output.payload, json!(42.0));
    assert_eq!(output.context.get("done"), Some(&json!(true)));
    assert!(output.run_id.starts_with("run-"));

    let events = driver.events();
    let TraceEvent::PipelineStart { meta, .. } = &events[0] else {
        panic!("expected pipeline_start first, got {:?}", events[0]);
    };
    assert_eq!(meta["num_nodes"], json!(2));
    assert!(meta["semantic_id"].as_str().unwrap().starts_with("plsemid-"));
    assert!(meta["config_id"].as_str().unwrap().starts_with("plcid-"));
    // No run-space seeded this run.
    assert!(meta.get("run_space").is_none());
    assert!(matches!(events[1], TraceEvent::Node(_)));
    assert!(matches!(events[2], TraceEvent::Node(_)));
    assert!(matches!(events[3], TraceEvent::PipelineEnd { .. }));
    assert!(driver.closed());

    let records: Vec<_> = driver.node_records().collect();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.status, ExecutionStatus::Succeeded);
        assert_eq!(record.identity.run_id, output.run_id);
        assert!(record.identity.pipeline_id.starts_with("plid-"));
        assert!(record.processor.semantic_id.is_some());
        assert!(record
            .assertions
            .preconditions
            .iter()
            .all(|c| c.result == CheckResult::Pass));
    }

    // Parameter provenance and delta observation.
    assert_eq!(records[0].processor.parameter_sources["factor"], "node");
    assert_eq!(records[1].context_delta.created_keys, vec!["done"]);
    assert_eq!(records[1].dependencies.upstream.len(), 1);
    assert_eq!(
        records[1].dependencies.upstream[0],
        records[0].identity.node_id
    );
}

#[test]
fn parameters_fall_back_to_context_then_default() {
    let registry = registry();
    let pipeline = decl("name: p\nnodes:\n  - processor: scale\n");
    let context: ExecutionContext =
        [("factor".to_string(), json!(3.0))].into_iter().collect();

    let mut driver = MemoryTraceDriver::new();
    let output = Orchestrator::new()
        .execute(&pipeline, &registry, json!(10.0), context, Some(&mut driver))
        .unwrap();

    assert_eq!(output.payload, json!(30.0));
    let record = driver.node_records().next().unwrap();
    assert_eq!(record.processor.parameter_sources["factor"], "context");
    // A parameter with no node config and no default is a declared read.
    assert_eq!(record.context_delta.read_keys, vec!["factor"]);

    // A seeded context surfaces as run-space foreign keys in the start meta.
    let TraceEvent::PipelineStart { meta, .. } = &driver.events()[0] else {
        panic!("expected pipeline_start first");
    };
    assert_eq!(meta["run_space"]["context_keys"], json!(["factor"]));
}

#[test]
fn failing_node_still_produces_a_record() {
    let registry = registry();
    let pipeline = decl(
        r"
name: failing
nodes:
  - processor: passthrough
  - processor: reject
",
    );

    let mut driver = MemoryTraceDriver::new();
    let err = Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestratorError::Node { ref processor, .. } if processor == "reject"
    ));

    let records: Vec<_> = driver.node_records().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, ExecutionStatus::Succeeded);

    let failed = records[1];
    assert_eq!(failed.status, ExecutionStatus::Error);
    let error = failed.error.as_ref().unwrap();
    assert_eq!(error.kind, "ValueError");
    assert_eq!(error.message, "ValueError: payload rejected");

    // The failing check leads the postconditions with the same code.
    assert_eq!(failed.assertions.postconditions[0].code, "ValueError");
    assert_eq!(
        failed.assertions.postconditions[0].result,
        CheckResult::Fail
    );

    // End event carries the error; cleanup still ran.
    let end = driver
        .events()
        .iter()
        .find_map(|e| match e {
            TraceEvent::PipelineEnd { summary, .. } => Some(summary),
            _ => None,
        })
        .unwrap();
    assert_eq!(end.status, RunStatus::Error);
    assert_eq!(end.nodes_executed, 2);
    assert!(driver.closed());
}

#[test]
fn missing_required_context_key_is_recorded_not_fatal() {
    let registry = registry();
    let pipeline = decl(
        r"
name: gated
nodes:
  - processor: passthrough
    input_context_keys: [calibration]
",
    );

    let mut driver = MemoryTraceDriver::new();
    let output = Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap();
    assert!(output.run_id.starts_with("run-"));

    // The FAIL is evidence in the record; the node still ran.
    let record = driver.node_records().next().unwrap();
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    assert_eq!(record.context_delta.read_keys, vec!["calibration"]);
    let failing = &record.assertions.preconditions[0];
    assert_eq!(failing.code, "required_keys_present");
    assert_eq!(failing.result, CheckResult::Fail);
    assert_eq!(
        failing.details.as_ref().unwrap()["missing"],
        json!(["calibration"])
    );
}

#[test]
fn unrealized_declared_write_is_recorded_not_fatal() {
    let registry = registry();
    let pipeline = decl("name: p\nnodes:\n  - processor: promise\n");

    let mut driver = MemoryTraceDriver::new();
    Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap();

    let record = driver.node_records().next().unwrap();
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    let check = record
        .assertions
        .postconditions
        .iter()
        .find(|c| c.code == "context_writes_realized")
        .unwrap();
    assert_eq!(check.result, CheckResult::Fail);
    assert_eq!(check.details.as_ref().unwrap()["missing"], json!(["promised"]));

    // The run still completed normally.
    let end = driver
        .events()
        .iter()
        .find_map(|e| match e {
            TraceEvent::PipelineEnd { summary, .. } => Some(summary),
            _ => None,
        })
        .unwrap();
    assert_eq!(end.status, RunStatus::Ok);
}

#[test]
fn rejected_config_stops_the_run_before_any_node_executes() {
    let registry = registry();
    let pipeline = decl(
        r"
name: halted
nodes:
  - processor: annotate
    params: { key: ran, value: true }
  - processor: scale
    params: { factor: nope }
",
    );

    let transport = MemoryTransport::new();
    let mut driver = MemoryTraceDriver::new();
    let err = Orchestrator::new()
        .with_transport(transport.clone())
        .execute(
            &pipeline,
            &registry,
            json!(1.0),
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Pipeline(_)));

    // All nodes are constructed before the first one runs, so the earlier
    // node neither executed nor published.
    assert!(transport.publications().is_empty());
    let records: Vec<_> = driver.node_records().collect();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].processor.reference, "scale");
    assert_eq!(records[0].status, ExecutionStatus::Error);
    assert_eq!(records[0].error.as_ref().unwrap().kind, "InvalidParameter");

    let end = driver
        .events()
        .iter()
        .find_map(|e| match e {
            TraceEvent::PipelineEnd { summary, .. } => Some(summary),
            _ => None,
        })
        .unwrap();
    assert_eq!(end.status, RunStatus::Error);
    assert_eq!(end.nodes_executed, 0);
    assert!(driver.closed());
}

#[test]
fn processor_panic_still_flushes_and_closes_the_trace() {
    let registry = registry();
    let pipeline = decl("name: p\nnodes:\n  - processor: combust\n");

    let mut driver = MemoryTraceDriver::new();
    let err = Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Executor(_)));

    let record = driver.node_records().next().unwrap();
    assert_eq!(record.status, ExecutionStatus::Error);
    assert_eq!(record.error.as_ref().unwrap().kind, "ExecutorFailure");
    assert!(driver.closed());
}

#[test]
fn unknown_processor_fails_before_any_record() {
    let registry = registry();
    let pipeline = decl("name: p\nnodes:\n  - processor: nonexistent\n");

    let mut driver = MemoryTraceDriver::new();
    let err = Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap_err();

    assert!(matches!(err, OrchestratorError::Pipeline(_)));
    assert_eq!(driver.node_records().count(), 0);
    assert!(!driver
        .events()
        .iter()
        .any(|e| matches!(e, TraceEvent::PipelineStart { .. })));
    // The driver is still released.
    assert!(driver.closed());
}

#[test]
fn unknown_node_params_warn_but_do_not_block() {
    let registry = registry();
    let pipeline = decl(
        "name: p\nnodes:\n  - processor: passthrough\n    params: { mystery: 1 }\n",
    );

    let mut driver = MemoryTraceDriver::new();
    Orchestrator::new()
        .execute(
            &pipeline,
            &registry,
            Value::Null,
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap();

    let record = driver.node_records().next().unwrap();
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    let config_check = record
        .assertions
        .preconditions
        .iter()
        .find(|c| c.code == "config_valid")
        .unwrap();
    assert_eq!(config_check.result, CheckResult::Warn);
}

#[test]
fn each_node_publishes_on_its_semantic_channel() {
    let registry = registry();
    let pipeline = decl(
        r"
name: publishing
nodes:
  - processor: scale
    params: { factor: 10.0 }
  - processor: annotate
    params: { key: done }
",
    );

    let transport = MemoryTransport::new();
    let mut driver = MemoryTraceDriver::new();
    let mut orchestrator = Orchestrator::new().with_transport(transport.clone());
    let output = orchestrator
        .execute(
            &pipeline,
            &registry,
            json!(4.2),
            ExecutionContext::new(),
            Some(&mut driver),
        )
        .unwrap();
    assert_eq!(output.payload, json!(42.0));

    let records: Vec<_> = driver.node_records().collect();
    let published = transport.publications();
    assert_eq!(published.len(), records.len());
    for (publication, record) in published.iter().zip(&records) {
        assert_eq!(
            Some(&publication.channel),
            record.processor.semantic_id.as_ref()
        );
    }
    assert_eq!(published[0].payload, json!(42.0));
}

#[test]
fn run_space_sweep_seeds_each_context() {
    let registry = registry();
    let pipeline = decl("name: sweep\nnodes:\n  - processor: scale\n");
    let spec = RunSpaceSpec::from_yaml(
        r"
blocks:
  - mode: zip
    context:
      factor: [1.0, 2.0, 3.0]
",
    )
    .unwrap();

    let outcome = Orchestrator::new()
        .execute_run_space(&pipeline, &registry, &spec, Path::new("."), json!(10.0))
        .unwrap();

    assert_eq!(outcome.meta.expanded_runs, 3);
    let payloads: Vec<Value> = outcome.outputs.iter().map(|o| o.payload.clone()).collect();
    assert_eq!(payloads, vec![json!(10.0), json!(20.0), json!(30.0)]);
    assert_eq!(outcome.outputs[1].context.get("factor"), Some(&json!(2.0)));
}

#[test]
fn dry_run_expands_without_executing() {
    let registry = registry();
    let pipeline = decl("name: sweep\nnodes:\n  - processor: reject\n");
    let spec = RunSpaceSpec::from_yaml(
        "dry_run: true\nblocks:\n  - context: { factor: [1, 2] }\n",
    )
    .unwrap();

    let outcome = Orchestrator::new()
        .execute_run_space(&pipeline, &registry, &spec, Path::new("."), Value::Null)
        .unwrap();

    assert_eq!(outcome.meta.expanded_runs, 2);
    assert!(outcome.outputs.is_empty());
}
