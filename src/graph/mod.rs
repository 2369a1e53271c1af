//! Graph topology and entity identifiers.
//!
//! Node names are interned into [`NodeId`]s by a [`NodeRegistry`]; topology
//! lives in a `petgraph` [`DiGraphMap`] whose adjacency doubles as the
//! neighbor / reverse-neighbor maps the grounding engine walks.
//!
//! [`GraphSnapshot`] is the loader-facing input: ordered nodes and edges with
//! optional attribute-derived labels.

pub mod index;

use std::collections::HashMap;
use std::sync::Arc;

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::interval::Interval;
use crate::label::Label;

pub use index::PredicateIndex;

/// Result type for graph operations.
pub type GraphResult<T> = std::result::Result<T, GraphError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Interned node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node:{}", self.0)
    }
}

/// Ordered pair of nodes identifying an edge.
pub type EdgeKey = (NodeId, NodeId);

/// A reasoning target: a node or an edge. Each class has its own worlds and
/// its own predicate index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Entity {
    Node(NodeId),
    Edge(NodeId, NodeId),
}

impl Entity {
    pub fn edge((source, target): EdgeKey) -> Self {
        Self::Edge(source, target)
    }

    pub fn is_edge(&self) -> bool {
        matches!(self, Self::Edge(..))
    }
}

// ---------------------------------------------------------------------------
// Node registry
// ---------------------------------------------------------------------------

/// Bidirectional name ↔ [`NodeId`] table. Ids are never reused, so a deleted
/// node keeps its name for reporting.
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the id for `name`, allocating one if needed.
    pub fn intern(&mut self, name: &str) -> GraphResult<NodeId> {
        if let Some(&id) = self.ids.get(name) {
            return Ok(id);
        }
        let raw = u32::try_from(self.names.len()).map_err(|_| GraphError::Exhausted {
            count: self.names.len(),
        })?;
        let id = NodeId(raw);
        let name: Arc<str> = Arc::from(name);
        self.names.push(name.clone());
        self.ids.insert(name, id);
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    /// Name of an interned node. Ids always come from this registry.
    pub fn name(&self, id: NodeId) -> &str {
        self.names
            .get(id.0 as usize)
            .map(|n| n.as_ref())
            .unwrap_or("<unknown>")
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Topology
// ---------------------------------------------------------------------------

/// Directed graph of interned nodes.
///
/// `version` increments on every structural change so callers can detect
/// topology edits cheaply.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    registry: NodeRegistry,
    topology: DiGraphMap<NodeId, ()>,
    version: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node by name. Idempotent; returns the node id.
    pub fn add_node(&mut self, name: &str) -> GraphResult<NodeId> {
        let id = self.registry.intern(name)?;
        if !self.topology.contains_node(id) {
            self.topology.add_node(id);
            self.version += 1;
        }
        Ok(id)
    }

    /// Add an edge between two existing nodes. Returns `false` if it existed.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId) -> GraphResult<bool> {
        self.require_node(source)?;
        self.require_node(target)?;
        if self.topology.contains_edge(source, target) {
            return Ok(false);
        }
        self.topology.add_edge(source, target, ());
        self.version += 1;
        Ok(true)
    }

    /// Remove a node and every incident edge. Returns the removed edges.
    pub fn remove_node(&mut self, node: NodeId) -> GraphResult<Vec<EdgeKey>> {
        self.require_node(node)?;
        let mut incident: Vec<EdgeKey> = self
            .topology
            .neighbors_directed(node, Direction::Outgoing)
            .map(|t| (node, t))
            .collect();
        incident.extend(
            self.topology
                .neighbors_directed(node, Direction::Incoming)
                .filter(|&s| s != node)
                .map(|s| (s, node)),
        );
        self.topology.remove_node(node);
        self.version += 1;
        Ok(incident)
    }

    pub fn remove_edge(&mut self, source: NodeId, target: NodeId) -> GraphResult<()> {
        if self.topology.remove_edge(source, target).is_none() {
            return Err(GraphError::EdgeNotFound {
                source_name: self.name(source).to_string(),
                target_name: self.name(target).to_string(),
            });
        }
        self.version += 1;
        Ok(())
    }

    /// Every name ever interned, including nodes since deleted.
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.registry
            .lookup(name)
            .filter(|id| self.topology.contains_node(*id))
    }

    /// Resolve a node name, failing if it is not in the graph.
    pub fn require(&self, name: &str) -> GraphResult<NodeId> {
        self.node_id(name).ok_or_else(|| GraphError::NodeNotFound {
            name: name.to_string(),
        })
    }

    fn require_node(&self, id: NodeId) -> GraphResult<()> {
        if self.topology.contains_node(id) {
            Ok(())
        } else {
            Err(GraphError::NodeNotFound {
                name: self.name(id).to_string(),
            })
        }
    }

    pub fn name(&self, id: NodeId) -> &str {
        self.registry.name(id)
    }

    /// Human-readable entity: `A` or `(A, B)`.
    pub fn describe(&self, entity: Entity) -> String {
        match entity {
            Entity::Node(n) => self.name(n).to_string(),
            Entity::Edge(s, t) => format!("({}, {})", self.name(s), self.name(t)),
        }
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.topology.contains_node(id)
    }

    pub fn contains_edge(&self, source: NodeId, target: NodeId) -> bool {
        self.topology.contains_edge(source, target)
    }

    pub fn contains(&self, entity: Entity) -> bool {
        match entity {
            Entity::Node(n) => self.contains_node(n),
            Entity::Edge(s, t) => self.contains_edge(s, t),
        }
    }

    /// Successors of `node`.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.neighbors_directed(node, Direction::Outgoing)
    }

    /// Predecessors of `node`.
    pub fn reverse_neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.neighbors_directed(node, Direction::Incoming)
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.topology.nodes()
    }

    pub fn edges(&self) -> impl Iterator<Item = EdgeKey> + '_ {
        self.topology.all_edges().map(|(s, t, _)| (s, t))
    }

    pub fn node_count(&self) -> usize {
        self.topology.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.topology.edge_count()
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

// ---------------------------------------------------------------------------
// Loader input
// ---------------------------------------------------------------------------

/// A node as supplied by a graph loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    /// Attribute-derived labels that seed the node's world.
    #[serde(default)]
    pub labels: Vec<(Label, Interval)>,
}

/// An edge as supplied by a graph loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub labels: Vec<(Label, Interval)>,
}

/// Ordered node and edge lists handed over by a graph loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a bare node.
    pub fn node(mut self, name: impl Into<String>) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            labels: Vec::new(),
        });
        self
    }

    /// Add a node carrying one attribute label.
    pub fn labeled_node(
        mut self,
        name: impl Into<String>,
        label: impl Into<Label>,
        bound: Interval,
    ) -> Self {
        self.nodes.push(NodeSpec {
            name: name.into(),
            labels: vec![(label.into(), bound)],
        });
        self
    }

    /// Add a bare edge; endpoints are created on load if missing.
    pub fn edge(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.edges.push(EdgeSpec {
            source: source.into(),
            target: target.into(),
            labels: Vec::new(),
        });
        self
    }

    /// Add an edge carrying one attribute label.
    pub fn labeled_edge(
        mut self,
        source: impl Into<String>,
        target: impl Into<String>,
        label: impl Into<Label>,
        bound: Interval,
    ) -> Self {
        self.edges.push(EdgeSpec {
            source: source.into(),
            target: target.into(),
            labels: vec![(label.into(), bound)],
        });
        self
    }
}
