//! Processor registry
//!
//! Dotted-path dynamic class resolution is replaced by an explicit registry
//! object mapping processor names to factories. The registry is owned by the
//! caller's dependency graph, constructed explicitly, and seeded with
//! built-ins through an idempotent [`ProcessorRegistry::initialize_defaults`].
//!
//! Resolution failure is a typed [`RegistryError::UnknownProcessor`], never a
//! panic from a generic lookup mechanism.

use crate::context::ExecutionContext;
use crate::error::{PipelineError, RegistryError};
use crate::processor::{DataKind, Processor, ProcessorError};
use semantiva_identity::Fingerprint;
use serde_json::Value;
use std::collections::BTreeMap;

/// Factory constructing a processor from a node's configured parameters
pub type ProcessorFactory =
    Box<dyn Fn(&BTreeMap<String, Value>) -> Result<Box<dyn Processor>, ProcessorError> + Send + Sync>;

/// Instantiation-free metadata about a registered processor
///
/// The orchestrator's identity phase resolves descriptors *without*
/// constructing processors, so identity is available even when construction
/// would later fail.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct ProcessorDescriptor {
    /// Registered name (the processor reference in declarations)
    pub name: String,
    /// Configurable parameter names
    pub parameter_names: Vec<String>,
    /// Parameters that have defaults, with their default values
    pub default_params: BTreeMap<String, Value>,
    /// Declared input payload kind
    pub input_type: DataKind,
    /// Declared output payload kind
    pub output_type: DataKind,
}

struct Entry {
    descriptor: ProcessorDescriptor,
    factory: ProcessorFactory,
}

/// Name → factory mapping with descriptor metadata
#[derive(Default)]
pub struct ProcessorRegistry {
    entries: BTreeMap<String, Entry>,
    defaults_initialized: bool,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("processors", &self.names())
            .field("defaults_initialized", &self.defaults_initialized)
            .finish()
    }
}

impl ProcessorRegistry {
    /// Create an empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor factory under `descriptor.name`
    ///
    /// Re-registering a name replaces the previous entry.
    pub fn register(&mut self, descriptor: ProcessorDescriptor, factory: ProcessorFactory) {
        tracing::debug!(processor = %descriptor.name, "registering processor");
        self.entries
            .insert(descriptor.name.clone(), Entry { descriptor, factory });
    }

    /// Seed the registry with built-in processors. Idempotent.
    pub fn initialize_defaults(&mut self) {
        if self.defaults_initialized {
            return;
        }
        self.register(
            ProcessorDescriptor {
                name: "passthrough".to_string(),
                parameter_names: Vec::new(),
                default_params: BTreeMap::new(),
                input_type: DataKind::Any,
                output_type: DataKind::Any,
            },
            Box::new(|_params| Ok(Box::new(builtin::Passthrough))),
        );
        self.register(
            ProcessorDescriptor {
                name: "scale".to_string(),
                parameter_names: vec!["factor".to_string()],
                default_params: BTreeMap::new(),
                input_type: DataKind::Float,
                output_type: DataKind::Float,
            },
            Box::new(|params| builtin::Scale::from_params(params).map(|p| Box::new(p) as Box<dyn Processor>)),
        );
        self.register(
            ProcessorDescriptor {
                name: "annotate".to_string(),
                parameter_names: vec!["key".to_string(), "value".to_string()],
                default_params: BTreeMap::from([("value".to_string(), Value::Null)]),
                input_type: DataKind::Any,
                output_type: DataKind::Any,
            },
            Box::new(|params| builtin::Annotate::from_params(params).map(|p| Box::new(p) as Box<dyn Processor>)),
        );
        self.defaults_initialized = true;
    }

    /// Resolve a processor's descriptor without instantiating it
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownProcessor`] listing registered names.
    pub fn descriptor(&self, name: &str) -> Result<&ProcessorDescriptor, RegistryError> {
        self.entries
            .get(name)
            .map(|e| &e.descriptor)
            .ok_or_else(|| RegistryError::UnknownProcessor {
                name: name.to_string(),
                available: self.names(),
            })
    }

    /// Construct a processor from configured parameters
    ///
    /// # Errors
    /// Returns an error if the name is unknown or the factory rejects the
    /// configuration.
    pub fn instantiate(
        &self,
        name: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Box<dyn Processor>, PipelineError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownProcessor {
                name: name.to_string(),
                available: self.names(),
            })?;
        Ok((entry.factory)(params)?)
    }

    /// Sorted registered names
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Content fingerprint over the registered name set
    ///
    /// Attached to environment pins: two runs with different registries are
    /// distinguishable even when the executed pipeline is the same.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        let joined = self.names().join("\n");
        Fingerprint::compute(joined.as_bytes())
    }
}

/// Built-in processors seeded by [`ProcessorRegistry::initialize_defaults`]
mod builtin {
    use super::{
        BTreeMap, DataKind, ExecutionContext, Processor, ProcessorError, Value,
    };

    /// Forwards the payload unchanged
    #[derive(Debug)]
    pub(super) struct Passthrough;

    impl Processor for Passthrough {
        fn input_type(&self) -> DataKind {
            DataKind::Any
        }

        fn output_type(&self) -> DataKind {
            DataKind::Any
        }

        fn process(
            &mut self,
            payload: Value,
            _ctx: &mut ExecutionContext,
        ) -> Result<Value, ProcessorError> {
            Ok(payload)
        }
    }

    /// Multiplies a numeric payload by a configured factor
    #[derive(Debug)]
    pub(super) struct Scale {
        factor: f64,
    }

    impl Scale {
        pub(super) fn from_params(
            params: &BTreeMap<String, Value>,
        ) -> Result<Self, ProcessorError> {
            let factor = params
                .get("factor")
                .ok_or_else(|| ProcessorError::MissingParameter {
                    name: "factor".to_string(),
                })?;
            let factor = factor
                .as_f64()
                .ok_or_else(|| ProcessorError::InvalidParameter {
                    name: "factor".to_string(),
                    reason: format!("expected a number, got {factor}"),
                })?;
            Ok(Self { factor })
        }
    }

    impl Processor for Scale {
        fn input_type(&self) -> DataKind {
            DataKind::Float
        }

        fn output_type(&self) -> DataKind {
            DataKind::Float
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["factor".to_string()]
        }

        fn process(
            &mut self,
            payload: Value,
            _ctx: &mut ExecutionContext,
        ) -> Result<Value, ProcessorError> {
            let x = payload.as_f64().ok_or_else(|| {
                ProcessorError::IncompatiblePayload(format!("expected number, got {payload}"))
            })?;
            Ok(serde_json::json!(x * self.factor))
        }
    }

    /// Writes a configured key/value into the context, payload untouched
    #[derive(Debug)]
    pub(super) struct Annotate {
        key: String,
        value: Value,
    }

    impl Annotate {
        pub(super) fn from_params(
            params: &BTreeMap<String, Value>,
        ) -> Result<Self, ProcessorError> {
            let key = params
                .get("key")
                .and_then(Value::as_str)
                .ok_or_else(|| ProcessorError::MissingParameter {
                    name: "key".to_string(),
                })?
                .to_string();
            Ok(Self {
                key,
                value: params.get("value").cloned().unwrap_or(Value::Null),
            })
        }
    }

    impl Processor for Annotate {
        fn input_type(&self) -> DataKind {
            DataKind::Any
        }

        fn output_type(&self) -> DataKind {
            DataKind::Any
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["key".to_string(), "value".to_string()]
        }

        fn default_params(&self) -> BTreeMap<String, Value> {
            BTreeMap::from([("value".to_string(), Value::Null)])
        }

        fn declared_writes(&self) -> Vec<String> {
            vec![self.key.clone()]
        }

        fn process(
            &mut self,
            payload: Value,
            ctx: &mut ExecutionContext,
        ) -> Result<Value, ProcessorError> {
            ctx.set(self.key.clone(), self.value.clone());
            Ok(payload)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ProcessorRegistry {
        let mut r = ProcessorRegistry::new();
        r.initialize_defaults();
        r
    }

    #[test]
    fn initialize_defaults_is_idempotent() {
        let mut r = registry();
        let before = r.names();
        r.initialize_defaults();
        assert_eq!(before, r.names());
    }

    #[test]
    fn unknown_processor_is_a_typed_error() {
        let r = registry();
        let err = r.descriptor("does.not.Exist").unwrap_err();
        let RegistryError::UnknownProcessor { name, available } = err;
        assert_eq!(name, "does.not.Exist");
        assert!(available.contains(&"scale".to_string()));
    }

    #[test]
    fn descriptor_resolves_without_instantiation() {
        let r = registry();
        let d = r.descriptor("scale").unwrap();
        assert_eq!(d.parameter_names, vec!["factor"]);
        assert!(d.default_params.is_empty());
    }

    #[test]
    fn instantiate_scale_and_run() {
        let r = registry();
        let params = BTreeMap::from([("factor".to_string(), json!(2.0))]);
        let mut p = r.instantiate("scale", &params).unwrap();
        let mut ctx = ExecutionContext::new();
        let out = p.process(json!(21.0), &mut ctx).unwrap();
        assert_eq!(out, json!(42.0));
    }

    #[test]
    fn scale_rejects_missing_factor() {
        let r = registry();
        let err = r
            .instantiate("scale", &BTreeMap::new())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Construction(ProcessorError::MissingParameter { .. })
        ));
    }

    #[test]
    fn annotate_declares_its_write() {
        let r = registry();
        let params = BTreeMap::from([
            ("key".to_string(), json!("mood")),
            ("value".to_string(), json!("good")),
        ]);
        let mut p = r.instantiate("annotate", &params).unwrap();
        assert_eq!(p.declared_writes(), vec!["mood"]);

        let mut ctx = ExecutionContext::new();
        p.process(Value::Null, &mut ctx).unwrap();
        assert_eq!(ctx.get("mood"), Some(&json!("good")));
    }

    #[test]
    fn fingerprint_tracks_registered_set() {
        let mut a = registry();
        let b = registry();
        assert_eq!(a.fingerprint(), b.fingerprint());

        a.register(
            ProcessorDescriptor {
                name: "extra".to_string(),
                parameter_names: Vec::new(),
                default_params: BTreeMap::new(),
                input_type: DataKind::Any,
                output_type: DataKind::Any,
            },
            Box::new(|_| Ok(Box::new(ProbeProcessor))),
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    struct ProbeProcessor;

    impl Processor for ProbeProcessor {
        fn input_type(&self) -> DataKind {
            DataKind::Any
        }

        fn output_type(&self) -> DataKind {
            DataKind::Any
        }

        fn process(
            &mut self,
            payload: Value,
            _ctx: &mut ExecutionContext,
        ) -> Result<Value, ProcessorError> {
            Ok(payload)
        }
    }
}
