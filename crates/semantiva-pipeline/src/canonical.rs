//! Canonical pipeline specification
//!
//! The canonical spec is the hashing input for pipeline identity: a
//! structural, order- and whitespace-independent representation with a
//! deterministic UUID per node. Rebuilding from an unchanged declaration
//! yields byte-identical UUIDs and edges.

use crate::config::{NodeDecl, PipelineDecl, PortsDecl};
use crate::error::PipelineError;
use semantiva_identity::canonical_json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Fixed namespace for version-5 node UUIDs.
///
/// Changing this constant changes every node UUID ever computed; it is part
/// of the identity wire contract.
const NODE_UUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0x1a, 0x7f, 0x52, 0x9e, 0x3d, 0x4c, 0x08, 0xb5, 0x6e, 0x21, 0xd4, 0x8a, 0x90, 0x37,
    0xfe,
]);

/// Canonical, hashable pipeline graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalSpec {
    /// Pipeline name
    pub name: String,
    /// Canonical nodes in execution order
    pub nodes: Vec<CanonicalNode>,
    /// Linear chain edges `node[i] -> node[i+1]`
    pub edges: Vec<CanonicalEdge>,
}

/// One canonical node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalNode {
    /// Deterministic v5 UUID over `{role, processor, params, ports}`
    pub node_uuid: Uuid,
    /// Node role
    pub role: String,
    /// Processor reference
    pub processor: String,
    /// Shallow parameter map
    pub params: BTreeMap<String, Value>,
    /// Port wiring
    pub ports: Ports,
    /// Where this node's payload comes from: the upstream node's UUID for
    /// chained nodes, the declared input port for the first node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_from: Option<String>,
    /// Extra context keys the node declares it reads (not part of the UUID)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_context_keys: Vec<String>,
}

/// Canonical port wiring
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ports {
    /// Payload input port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Payload output port
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl From<&PortsDecl> for Ports {
    fn from(decl: &PortsDecl) -> Self {
        Self {
            input: decl.input.clone(),
            output: decl.output.clone(),
        }
    }
}

/// Directed edge between two canonical nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalEdge {
    /// Upstream node UUID
    pub from: Uuid,
    /// Downstream node UUID
    pub to: Uuid,
}

impl CanonicalSpec {
    /// Structural projection used for the structure-only semantic id:
    /// per node only `{name, node_uuid, payload_from}`, no parameter values.
    #[must_use]
    pub fn structural(&self) -> Value {
        let nodes: Vec<Value> = self
            .nodes
            .iter()
            .map(|n| {
                serde_json::json!({
                    "name": n.processor,
                    "node_uuid": n.node_uuid,
                    "payload_from": n.payload_from,
                })
            })
            .collect();
        serde_json::json!({ "name": self.name, "nodes": nodes })
    }

    /// Upstream-dependency map: each node's UUID paired with the UUIDs it
    /// depends on (at most one in the current linear topology).
    #[must_use]
    pub fn upstream_map(&self) -> BTreeMap<Uuid, Vec<Uuid>> {
        let mut map: BTreeMap<Uuid, Vec<Uuid>> =
            self.nodes.iter().map(|n| (n.node_uuid, Vec::new())).collect();
        for edge in &self.edges {
            if let Some(ups) = map.get_mut(&edge.to) {
                ups.push(edge.from);
            }
        }
        map
    }
}

/// Builds [`CanonicalSpec`] values from raw declarations
///
/// The builder is stateless and idempotent: the same declaration always
/// yields byte-identical output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalSpecBuilder;

impl CanonicalSpecBuilder {
    /// Create a builder
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Build the canonical spec for a declaration
    ///
    /// # Errors
    /// Returns [`PipelineError::EmptyPipeline`] for a declaration with no
    /// nodes, or an identity error if a node cannot be canonicalized.
    pub fn build(&self, decl: &PipelineDecl) -> Result<CanonicalSpec, PipelineError> {
        if decl.nodes.is_empty() {
            return Err(PipelineError::EmptyPipeline(decl.name.clone()));
        }

        let mut nodes = Vec::with_capacity(decl.nodes.len());
        for (index, node) in decl.nodes.iter().enumerate() {
            let ports = Ports::from(&node.ports);
            let node_uuid = Self::node_uuid(node, &ports)?;
            let payload_from = if index == 0 {
                ports.input.clone()
            } else {
                nodes
                    .last()
                    .map(|prev: &CanonicalNode| prev.node_uuid.to_string())
            };
            nodes.push(CanonicalNode {
                node_uuid,
                role: node.role.clone(),
                processor: node.processor.clone(),
                params: node.params.clone(),
                ports,
                payload_from,
                input_context_keys: node.input_context_keys.clone(),
            });
        }

        let edges = nodes
            .windows(2)
            .map(|pair| CanonicalEdge {
                from: pair[0].node_uuid,
                to: pair[1].node_uuid,
            })
            .collect();

        Ok(CanonicalSpec {
            name: decl.name.clone(),
            nodes,
            edges,
        })
    }

    /// Deterministic node UUID: v5 over the canonical JSON of the node's
    /// identity-bearing fields. Position, whitespace, and key ordering in the
    /// source declaration cannot influence it.
    fn node_uuid(node: &NodeDecl, ports: &Ports) -> Result<Uuid, PipelineError> {
        let identity_input = serde_json::json!({
            "role": node.role,
            "processor": node.processor,
            "params": node.params,
            "ports": ports,
        });
        let json = canonical_json(&identity_input)?;
        Ok(Uuid::new_v5(&NODE_UUID_NAMESPACE, json.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decl(yaml: &str) -> PipelineDecl {
        PipelineDecl::from_yaml(yaml).unwrap()
    }

    const CHAIN: &str = r"
name: demo
nodes:
  - processor: scale
    params: { factor: 2.0 }
  - processor: annotate
    params: { key: done }
";

    #[test]
    fn build_is_idempotent() {
        let d = decl(CHAIN);
        let builder = CanonicalSpecBuilder::new();
        let a = builder.build(&d).unwrap();
        let b = builder.build(&d).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn node_uuid_ignores_param_key_order() {
        let a = decl("name: p\nnodes:\n  - processor: x\n    params: {a: 1, b: 2}\n");
        let b = decl("name: p\nnodes:\n  - processor: x\n    params: {b: 2, a: 1}\n");
        let builder = CanonicalSpecBuilder::new();
        assert_eq!(
            builder.build(&a).unwrap().nodes[0].node_uuid,
            builder.build(&b).unwrap().nodes[0].node_uuid,
        );
    }

    #[test]
    fn node_uuid_is_position_independent() {
        let spec = CanonicalSpecBuilder::new().build(&decl(CHAIN)).unwrap();
        let solo = decl("name: other\nnodes:\n  - processor: annotate\n    params: { key: done }\n");
        let solo_spec = CanonicalSpecBuilder::new().build(&solo).unwrap();
        assert_eq!(spec.nodes[1].node_uuid, solo_spec.nodes[0].node_uuid);
    }

    #[test]
    fn node_uuid_is_sensitive_to_params() {
        let a = decl("name: p\nnodes:\n  - processor: x\n    params: {a: 1}\n");
        let b = decl("name: p\nnodes:\n  - processor: x\n    params: {a: 2}\n");
        let builder = CanonicalSpecBuilder::new();
        assert_ne!(
            builder.build(&a).unwrap().nodes[0].node_uuid,
            builder.build(&b).unwrap().nodes[0].node_uuid,
        );
    }

    #[test]
    fn edges_form_a_linear_chain() {
        let spec = CanonicalSpecBuilder::new().build(&decl(CHAIN)).unwrap();
        assert_eq!(spec.edges.len(), 1);
        assert_eq!(spec.edges[0].from, spec.nodes[0].node_uuid);
        assert_eq!(spec.edges[0].to, spec.nodes[1].node_uuid);
    }

    #[test]
    fn payload_from_chains_upstream_uuids() {
        let spec = CanonicalSpecBuilder::new().build(&decl(CHAIN)).unwrap();
        assert_eq!(spec.nodes[0].payload_from, None);
        assert_eq!(
            spec.nodes[1].payload_from,
            Some(spec.nodes[0].node_uuid.to_string())
        );
    }

    #[test]
    fn structural_projection_excludes_params() {
        let spec = CanonicalSpecBuilder::new().build(&decl(CHAIN)).unwrap();
        let structural = spec.structural();
        let rendered = structural.to_string();
        assert!(!rendered.contains("factor"));
        assert_eq!(structural["nodes"][0]["name"], json!("scale"));
    }

    #[test]
    fn upstream_map_reflects_edges() {
        let spec = CanonicalSpecBuilder::new().build(&decl(CHAIN)).unwrap();
        let map = spec.upstream_map();
        assert!(map[&spec.nodes[0].node_uuid].is_empty());
        assert_eq!(map[&spec.nodes[1].node_uuid], vec![spec.nodes[0].node_uuid]);
    }

    #[test]
    fn empty_pipeline_is_rejected() {
        let d = PipelineDecl { name: "empty".into(), nodes: Vec::new() };
        assert!(matches!(
            CanonicalSpecBuilder::new().build(&d),
            Err(PipelineError::EmptyPipeline(name)) if name == "empty"
        ));
    }
}
