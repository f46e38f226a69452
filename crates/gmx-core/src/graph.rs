//! Topology graph primitives shared by the validator, importer and exporter.
//!
//! A [`TopologyGraph`] is an undirected multigraph over integer node ids.
//! Edges are either switching devices (which carry an open flag) or
//! zero-impedance internal connections (which do not). Each node optionally
//! maps to the coarse bus number that claims it in the tabular format.
//!
//! Connectivity uses union-find with path compression
//! (`petgraph::unionfind`); component output is fully ordered so that every
//! consumer iterates nodes in the same sequence.

use std::collections::BTreeMap;

use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};

use crate::{BusNum, NodeId};

/// Edge payload of the topology graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    /// Switching device edge. Open/closed does not affect structural
    /// connectivity checks, only the materialized switch state.
    Switch { open: bool },
    /// Always-closed zero-impedance connection.
    InternalConnection,
}

/// One undirected edge between two topology nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub a: NodeId,
    pub b: NodeId,
    pub kind: EdgeKind,
}

/// Undirected multigraph over node ids with a node→coarse-bus map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopologyGraph {
    nodes: BTreeMap<NodeId, Option<BusNum>>,
    edges: Vec<TopologyEdge>,
}

/// Connected components of a [`TopologyGraph`], ordered by smallest member.
#[derive(Debug, Clone)]
pub struct ComponentSet {
    members: Vec<Vec<NodeId>>,
    index: BTreeMap<NodeId, usize>,
}

impl ComponentSet {
    /// Components, each sorted ascending, ordered by their smallest node id.
    pub fn components(&self) -> &[Vec<NodeId>] {
        &self.members
    }

    /// Index of the component containing `node`, if the node is in the graph.
    pub fn component_of(&self, node: NodeId) -> Option<usize> {
        self.index.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with its owning coarse bus (if declared). Re-adding
    /// a node keeps the first non-empty bus assignment.
    pub fn add_node(&mut self, node: NodeId, bus: Option<BusNum>) {
        let entry = self.nodes.entry(node).or_insert(None);
        if entry.is_none() {
            *entry = bus;
        }
    }

    /// Add a switching-device edge. Missing endpoints are registered with
    /// no bus assignment.
    pub fn add_switch(&mut self, a: NodeId, b: NodeId, open: bool) {
        self.add_node(a, None);
        self.add_node(b, None);
        self.edges.push(TopologyEdge {
            a,
            b,
            kind: EdgeKind::Switch { open },
        });
    }

    /// Add an internal-connection edge.
    pub fn add_internal_connection(&mut self, a: NodeId, b: NodeId) {
        self.add_node(a, None);
        self.add_node(b, None);
        self.edges.push(TopologyEdge {
            a,
            b,
            kind: EdgeKind::InternalConnection,
        });
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Coarse bus claiming `node`, if any.
    pub fn bus_of(&self, node: NodeId) -> Option<BusNum> {
        self.nodes.get(&node).copied().flatten()
    }

    /// Node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[TopologyEdge] {
        &self.edges
    }

    /// Number of switch edges incident to `node` (parallel edges counted).
    pub fn switch_degree(&self, node: NodeId) -> usize {
        self.edges
            .iter()
            .filter(|e| {
                matches!(e.kind, EdgeKind::Switch { .. }) && (e.a == node || e.b == node)
            })
            .count()
    }

    /// Components over switch edges only (open state ignored).
    pub fn switch_components(&self) -> ComponentSet {
        self.components_where(|kind| matches!(kind, EdgeKind::Switch { .. }))
    }

    /// Components over internal-connection edges only.
    pub fn connection_components(&self) -> ComponentSet {
        self.components_where(|kind| matches!(kind, EdgeKind::InternalConnection))
    }

    /// Components over every edge kind.
    pub fn all_components(&self) -> ComponentSet {
        self.components_where(|_| true)
    }

    fn components_where(&self, keep: impl Fn(&EdgeKind) -> bool) -> ComponentSet {
        // Dense renumbering for the union-find, in ascending node-id order
        // so component output is deterministic.
        let dense: BTreeMap<NodeId, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(i, &n)| (n, i))
            .collect();
        let mut uf = UnionFind::<usize>::new(dense.len());
        for edge in &self.edges {
            if keep(&edge.kind) {
                uf.union(dense[&edge.a], dense[&edge.b]);
            }
        }

        let mut by_root: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for (&node, &i) in &dense {
            by_root.entry(uf.find(i)).or_default().push(node);
        }

        let mut members: Vec<Vec<NodeId>> = by_root.into_values().collect();
        for component in &mut members {
            component.sort_unstable();
        }
        members.sort_by_key(|component| component[0]);

        let mut index = BTreeMap::new();
        for (i, component) in members.iter().enumerate() {
            for &node in component {
                index.insert(node, i);
            }
        }
        ComponentSet { members, index }
    }

    /// Render the graph as a DOT string for external visualization.
    pub fn to_dot(&self) -> String {
        let mut buffer = String::new();
        buffer.push_str("graph substation {\n");
        for (&node, bus) in &self.nodes {
            let label = match bus {
                Some(bus) => format!("{} (bus {})", node.value(), bus.value()),
                None => format!("{}", node.value()),
            };
            buffer.push_str(&format!("  n{} [label=\"{}\"];\n", node.value(), label));
        }
        for edge in &self.edges {
            let style = match edge.kind {
                EdgeKind::Switch { open: false } => "",
                EdgeKind::Switch { open: true } => " [style=dashed]",
                EdgeKind::InternalConnection => " [style=dotted]",
            };
            buffer.push_str(&format!(
                "  n{} -- n{}{};\n",
                edge.a.value(),
                edge.b.value(),
                style
            ));
        }
        buffer.push('}');
        buffer
    }
}
