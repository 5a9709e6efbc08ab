//! Raw pipeline declaration
//!
//! The YAML shape callers write. Declarations are data only — nothing here
//! resolves processors or computes identity.
//!
//! ```yaml
//! name: smoothing
//! nodes:
//!   - processor: scale
//!     params: { factor: 2.0 }
//!   - role: sink
//!     processor: annotate
//!     params: { key: done, value: true }
//! ```

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A declared pipeline: a name and an ordered node list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDecl {
    /// Pipeline name
    pub name: String,
    /// Nodes in execution order
    pub nodes: Vec<NodeDecl>,
}

impl PipelineDecl {
    /// Parse a declaration from YAML text
    ///
    /// # Errors
    /// Returns [`PipelineError::Declaration`] on malformed YAML.
    pub fn from_yaml(text: &str) -> Result<Self, PipelineError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// One declared node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDecl {
    /// Node role; defaults to `processor`
    #[serde(default = "default_role")]
    pub role: String,
    /// Processor reference (a name registered in the processor registry)
    pub processor: String,
    /// Shallow parameter map
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Port wiring
    #[serde(default)]
    pub ports: PortsDecl,
    /// Context keys this node reads, beyond what the processor declares
    #[serde(default)]
    pub input_context_keys: Vec<String>,
}

fn default_role() -> String {
    "processor".to_string()
}

/// Declared port wiring for one node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortsDecl {
    /// Name of the payload source feeding this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Name this node publishes its payload under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_minimal_declaration() {
        let decl = PipelineDecl::from_yaml(
            "name: demo\nnodes:\n  - processor: passthrough\n",
        )
        .unwrap();
        assert_eq!(decl.name, "demo");
        assert_eq!(decl.nodes.len(), 1);
        assert_eq!(decl.nodes[0].role, "processor");
        assert!(decl.nodes[0].params.is_empty());
    }

    #[test]
    fn parses_full_node_declaration() {
        let decl = PipelineDecl::from_yaml(
            r"
name: demo
nodes:
  - role: source
    processor: scale
    params:
      factor: 2.5
    ports:
      output: scaled
    input_context_keys: [gain]
",
        )
        .unwrap();
        let node = &decl.nodes[0];
        assert_eq!(node.role, "source");
        assert_eq!(node.params.get("factor"), Some(&json!(2.5)));
        assert_eq!(node.ports.output.as_deref(), Some("scaled"));
        assert_eq!(node.input_context_keys, vec!["gain"]);
    }

    #[test]
    fn rejects_malformed_yaml() {
        assert!(matches!(
            PipelineDecl::from_yaml("nodes: [not a node]"),
            Err(PipelineError::Declaration(_))
        ));
    }
}
