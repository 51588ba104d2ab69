//! petgraph view of one agent's graph plus edge-group classification.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use super::types::{Agent, Edge, EdgeSource, END, START};

/// Shape of the outgoing edges of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// Unconditional; every target runs.
    Plain,
    /// Conditions evaluated in order, one default fallback.
    Conditional,
    /// A single edge dispatching once per list item.
    FanOut,
}

/// All edges sharing one source, in declaration order.
#[derive(Debug, Clone)]
pub struct EdgeGroup<'a> {
    pub source: &'a EdgeSource,
    pub edges: Vec<&'a Edge>,
}

impl<'a> EdgeGroup<'a> {
    /// `None` when the group mixes shapes (or holds more than one fan-out edge).
    pub fn kind(&self) -> Option<GroupKind> {
        let conditional = self.edges.iter().any(|e| e.is_conditional());
        let fan_out = self.edges.iter().filter(|e| e.fan_out.is_some()).count();
        let plain = self.edges.iter().any(|e| e.is_plain());

        match (conditional, fan_out, plain) {
            (true, 0, false) => Some(GroupKind::Conditional),
            (false, 1, false) if self.edges.len() == 1 => Some(GroupKind::FanOut),
            (false, 0, true) => Some(GroupKind::Plain),
            _ => None,
        }
    }

    pub fn defaults(&self) -> impl Iterator<Item = &&'a Edge> {
        self.edges.iter().filter(|e| e.default)
    }

    /// Name of the routing function generated for this group.
    pub fn router_name(&self) -> String {
        match self.source {
            EdgeSource::Start => "route_start".to_string(),
            EdgeSource::Node(id) => format!("route_{id}"),
        }
    }
}

/// Group edges by source, groups ordered by first appearance.
pub fn edge_groups(edges: &[Edge]) -> Vec<EdgeGroup<'_>> {
    let mut groups: Vec<EdgeGroup<'_>> = Vec::new();
    let mut index: HashMap<&EdgeSource, usize> = HashMap::new();
    for edge in edges {
        match index.get(&edge.source) {
            Some(&i) => groups[i].edges.push(edge),
            None => {
                index.insert(&edge.source, groups.len());
                groups.push(EdgeGroup {
                    source: &edge.source,
                    edges: vec![edge],
                });
            }
        }
    }
    groups
}

/// Directed graph over node ids plus the two sentinels.
pub struct AgentGraph {
    pub graph: DiGraph<String, ()>,
    pub node_indices: HashMap<String, NodeIndex>,
}

impl AgentGraph {
    /// Edges naming an unknown endpoint are skipped; reference checks report them.
    pub fn build(agent: &Agent) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for id in [START, END]
            .into_iter()
            .chain(agent.nodes.iter().map(|n| n.id()))
        {
            let idx = graph.add_node(id.to_string());
            node_indices.insert(id.to_string(), idx);
        }

        for edge in &agent.edges {
            let source = node_indices.get(edge.source.as_str());
            let target = node_indices.get(edge.target.as_str());
            if let (Some(&s), Some(&t)) = (source, target) {
                graph.add_edge(s, t, ());
            }
        }

        AgentGraph {
            graph,
            node_indices,
        }
    }

    /// Ids visited by a breadth-first walk from the entry sentinel.
    pub fn reachable_from_start(&self) -> HashSet<&str> {
        let mut reachable = HashSet::new();
        let Some(&start) = self.node_indices.get(START) else {
            return reachable;
        };
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(nx) = bfs.next(&self.graph) {
            reachable.insert(self.graph[nx].as_str());
        }
        reachable
    }
}
