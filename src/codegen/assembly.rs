//! `StateGraph` construction and compilation.

use super::literals::py_str;
use super::routing::{py_target, tool_loop_destinations, tool_loop_router};
use super::writer::CodeWriter;
use crate::ir::{Agent, EdgeGroup, EdgeSource, GroupKind};

fn py_source(source: &EdgeSource) -> String {
    match source {
        EdgeSource::Start => "START".to_string(),
        EdgeSource::Node(id) => py_str(id),
    }
}

pub fn emit_graph(agent: &Agent, groups: &[EdgeGroup<'_>], w: &mut CodeWriter) {
    w.line("graph_builder = StateGraph(AgentState)");
    w.blank();

    w.line("# Add all nodes");
    for node in &agent.nodes {
        let id = node.id();
        w.line(&format!("graph_builder.add_node({}, {id})", py_str(id)));
        if node.has_tool_loop() {
            w.line(&format!(
                "graph_builder.add_node({}, {id}_tools)",
                py_str(&format!("{id}_tools"))
            ));
        }
    }
    w.blank();

    w.line("# Add edges");
    for group in groups {
        // Tool-calling nodes leave through their loop router.
        if let EdgeSource::Node(id) = group.source {
            if agent.node(id).is_some_and(|n| n.has_tool_loop()) {
                continue;
            }
        }
        let source = py_source(group.source);
        match group.kind() {
            Some(GroupKind::Conditional) => {
                w.line(&format!(
                    "graph_builder.add_conditional_edges({source}, {})",
                    group.router_name()
                ));
            }
            Some(GroupKind::FanOut) => {
                let targets: Vec<String> = group.edges.iter().map(|e| py_target(&e.target)).collect();
                w.line(&format!(
                    "graph_builder.add_conditional_edges({source}, {}, [{}])",
                    group.router_name(),
                    targets.join(", ")
                ));
            }
            Some(GroupKind::Plain) | None => {
                for edge in &group.edges {
                    w.line(&format!(
                        "graph_builder.add_edge({source}, {})",
                        py_target(&edge.target)
                    ));
                }
            }
        }
    }

    let loops: Vec<&str> = agent
        .nodes
        .iter()
        .filter(|n| n.has_tool_loop())
        .map(|n| n.id())
        .collect();
    if !loops.is_empty() {
        w.blank();
        w.line("# Tool-calling loops");
        for id in loops {
            let exit = groups
                .iter()
                .find(|g| matches!(g.source, EdgeSource::Node(src) if src == id));
            w.line(&format!(
                "graph_builder.add_conditional_edges({}, {}, [{}])",
                py_str(id),
                tool_loop_router(id),
                tool_loop_destinations(id, exit).join(", ")
            ));
            w.line(&format!(
                "graph_builder.add_edge({}, {})",
                py_str(&format!("{id}_tools")),
                py_str(id)
            ));
        }
    }

    w.blank();
    w.line("# Compile");
    w.line("graph = graph_builder.compile()");
}
