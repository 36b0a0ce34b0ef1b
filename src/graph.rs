//! User-facing graph entities
//!
//! Nodes and edges carry arbitrary JSON data. A handful of keys are reserved
//! and lifted out of that data on creation: `x`, `y`, `mass` and `fixed` for
//! nodes, `length` for edges.
//!
//! # Branch format
//!
//! `graft` and `merge` take a declarative description:
//!
//! ```yaml
//! nodes:
//!   a: { mass: 2 }
//!   b: {}
//! edges:
//!   a:
//!     b: { length: 3 }
//!     c: {}
//! ```
//!
//! Edge endpoints missing from `nodes` are created on demand.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::EntityId;
use crate::vector::Vector;

/// Free-form node or edge attributes
pub type Data = Map<String, Value>;

pub const DEFAULT_MASS: f64 = 1.0;
pub const DEFAULT_LENGTH: f64 = 1.0;

const NODE_RESERVED: [&str; 4] = ["x", "y", "mass", "fixed"];

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: EntityId,
    pub name: String,
    pub data: Data,
    pub mass: f64,
    pub fixed: bool,
    /// Last position reported by the engine, or the requested start position
    pub position: Option<Vector>,
    /// Start coordinates from the creation data; either may be given alone
    start: (Option<f64>, Option<f64>),
}

impl Node {
    /// Build a node, consuming the reserved keys of `data`
    pub fn new(id: EntityId, name: impl Into<String>, mut data: Data) -> Self {
        let x = data.get("x").and_then(Value::as_f64);
        let y = data.get("y").and_then(Value::as_f64);
        let mass = data
            .get("mass")
            .and_then(Value::as_f64)
            .filter(|m| m.is_finite() && *m > 0.0)
            .unwrap_or(DEFAULT_MASS);
        let fixed = data.get("fixed").and_then(Value::as_bool).unwrap_or(false);
        strip_node_reserved(&mut data);

        Self {
            id,
            name: name.into(),
            data,
            mass,
            fixed,
            position: x.zip(y).map(Vector::from),
            start: (x, y),
        }
    }

    /// Start coordinates to hand to the engine; a missing axis is placed
    /// at random
    pub(crate) fn requested_coordinates(&self) -> (Option<f64>, Option<f64>) {
        self.start
    }
}

/// Drop the keys the engine owns from replacement node data
pub fn strip_node_reserved(data: &mut Data) {
    for key in NODE_RESERVED {
        data.remove(key);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub id: EntityId,
    pub source: EntityId,
    pub target: EntityId,
    /// Rest length of the backing spring
    pub length: f64,
    pub data: Data,
}

impl Edge {
    /// Build an edge, consuming `length` from `data`
    pub fn new(id: EntityId, source: EntityId, target: EntityId, mut data: Data) -> Self {
        let length = data
            .remove("length")
            .and_then(|v| v.as_f64())
            .filter(|l| l.is_finite() && *l >= 0.0)
            .unwrap_or(DEFAULT_LENGTH);

        Self {
            id,
            source,
            target,
            length,
            data,
        }
    }
}

/// A node given either by id or by name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef<'a> {
    Id(EntityId),
    Name(&'a str),
}

impl From<EntityId> for NodeRef<'_> {
    fn from(id: EntityId) -> Self {
        NodeRef::Id(id)
    }
}

impl<'a> From<&'a str> for NodeRef<'a> {
    fn from(name: &'a str) -> Self {
        NodeRef::Name(name)
    }
}

impl<'a> From<&'a String> for NodeRef<'a> {
    fn from(name: &'a String) -> Self {
        NodeRef::Name(name)
    }
}

impl<'a> From<&'a Node> for NodeRef<'a> {
    fn from(node: &'a Node) -> Self {
        NodeRef::Id(node.id)
    }
}

/// Declarative description of nodes and edges, keyed by node name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub nodes: BTreeMap<String, Data>,
    /// `source name -> target name -> edge data`
    pub edges: BTreeMap<String, BTreeMap<String, Data>>,
}

impl Branch {
    /// True if `name` appears as a node or as an edge endpoint
    pub fn mentions(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
            || self.edges.contains_key(name)
            || self.edges.values().any(|targets| targets.contains_key(name))
    }

    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .get(source)
            .is_some_and(|targets| targets.contains_key(target))
    }
}

/// Ids touched by a bulk update
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphDiff {
    pub added_nodes: Vec<EntityId>,
    pub added_edges: Vec<EntityId>,
    pub dropped_nodes: Vec<EntityId>,
    pub dropped_edges: Vec<EntityId>,
}

impl GraphDiff {
    pub fn is_empty(&self) -> bool {
        self.added_nodes.is_empty()
            && self.added_edges.is_empty()
            && self.dropped_nodes.is_empty()
            && self.dropped_edges.is_empty()
    }

    pub(crate) fn extend(&mut self, other: GraphDiff) {
        self.added_nodes.extend(other.added_nodes);
        self.added_edges.extend(other.added_edges);
        self.dropped_nodes.extend(other.dropped_nodes);
        self.dropped_edges.extend(other.dropped_edges);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Data {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn node_lifts_reserved_keys() {
        let node = Node::new(
            1,
            "a",
            data(json!({"x": 1.5, "y": -2, "mass": 3, "fixed": true, "color": "red"})),
        );

        assert_eq!(node.position, Some(Vector::new(1.5, -2.0)));
        assert_eq!(node.mass, 3.0);
        assert!(node.fixed);
        assert_eq!(node.data, data(json!({"color": "red"})));
    }

    #[test]
    fn node_defaults() {
        let node = Node::new(2, "b", data(json!({"mass": "heavy"})));
        assert_eq!(node.position, None);
        assert_eq!(node.mass, DEFAULT_MASS);
        assert!(!node.fixed);
        assert_eq!(node.requested_coordinates(), (None, None));
        assert!(node.data.is_empty());
    }

    #[test]
    fn single_start_coordinate_is_kept() {
        let node = Node::new(3, "c", data(json!({"x": 40})));
        assert_eq!(node.position, None);
        assert_eq!(node.requested_coordinates(), (Some(40.0), None));

        let node = Node::new(4, "d", data(json!({"y": -2.5})));
        assert_eq!(node.requested_coordinates(), (None, Some(-2.5)));
    }

    #[test]
    fn edge_lifts_length() {
        let edge = Edge::new(-1, 1, 2, data(json!({"length": 2.5, "weight": 7})));
        assert_eq!(edge.length, 2.5);
        assert_eq!(edge.data, data(json!({"weight": 7})));

        let edge = Edge::new(-2, 1, 2, Data::new());
        assert_eq!(edge.length, DEFAULT_LENGTH);
    }

    #[test]
    fn branch_from_yaml() {
        let branch: Branch = serde_yaml::from_str(
            "nodes:\n  a: {mass: 2}\nedges:\n  a:\n    b: {length: 3}\n",
        )
        .unwrap();

        assert!(branch.mentions("a"));
        assert!(branch.mentions("b"));
        assert!(!branch.mentions("c"));
        assert!(branch.has_edge("a", "b"));
        assert!(!branch.has_edge("b", "a"));
    }

    #[test]
    fn branch_sections_are_optional() {
        let branch: Branch = serde_json::from_str(r#"{"nodes": {"solo": {}}}"#).unwrap();
        assert_eq!(branch.nodes.len(), 1);
        assert!(branch.edges.is_empty());
    }
}
