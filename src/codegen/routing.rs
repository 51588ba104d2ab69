//! Routing functions for conditional groups, fan-out groups and tool loops.

use super::literals::py_str;
use super::writer::CodeWriter;
use crate::ir::{Agent, EdgeGroup, EdgeSource, EdgeTarget, GroupKind};

/// Python expression for an edge target.
pub fn py_target(target: &EdgeTarget) -> String {
    match target {
        EdgeTarget::End => "END".to_string(),
        EdgeTarget::Node(id) => py_str(id),
    }
}

/// Name of the router that drives a tool-calling loop.
pub fn tool_loop_router(node_id: &str) -> String {
    format!("route_{node_id}_tool_calls")
}

/// Every router the graph needs, each followed by a two-line gap.
pub fn emit_routers(agent: &Agent, groups: &[EdgeGroup<'_>], w: &mut CodeWriter) {
    for group in groups {
        match group.kind() {
            Some(GroupKind::Conditional) => emit_conditional(group, w),
            Some(GroupKind::FanOut) => emit_fan_out(group, w),
            Some(GroupKind::Plain) | None => continue,
        }
        w.gap();
    }

    for node in agent.nodes.iter().filter(|n| n.has_tool_loop()) {
        let exit = groups
            .iter()
            .find(|g| matches!(g.source, EdgeSource::Node(id) if id == node.id()));
        emit_tool_loop(node.id(), exit, w);
        w.gap();
    }
}

fn emit_conditional(group: &EdgeGroup<'_>, w: &mut CodeWriter) {
    w.block_open(&format!("def {}(state: AgentState)", group.router_name()));
    for edge in &group.edges {
        let Some(condition) = edge.condition.as_deref() else {
            continue;
        };
        let condition = condition.trim();
        if condition.contains('\n') {
            w.block_open(&format!("if ({condition})"));
        } else {
            w.block_open(&format!("if {condition}"));
        }
        w.line(&format!("return {}", py_target(&edge.target)));
        w.block_close();
    }
    if let Some(default) = group.defaults().next() {
        w.line(&format!("return {}", py_target(&default.target)));
    }
    w.block_close();
}

fn emit_fan_out(group: &EdgeGroup<'_>, w: &mut CodeWriter) {
    let Some((edge, fan_out)) = group
        .edges
        .first()
        .and_then(|e| e.fan_out.as_ref().map(|f| (*e, f)))
    else {
        return;
    };
    w.block_open(&format!("def {}(state: AgentState)", group.router_name()));
    w.line(&format!("items = state.get({}, [])", py_str(&fan_out.items_field)));
    w.block_open("if not items");
    w.line("return []");
    w.block_close();
    w.bracketed(
        "return [",
        [
            format!(
                "Send({}, {{**state, {}: item}})",
                py_target(&edge.target),
                py_str(&fan_out.item_var)
            ),
            "for item in items".to_string(),
        ],
        "]",
    );
    w.block_close();
}

/// Loop back through the companion tool node while the model asks for tools,
/// then leave the way the node's own edges say.
fn emit_tool_loop(node_id: &str, exit: Option<&EdgeGroup<'_>>, w: &mut CodeWriter) {
    w.block_open(&format!("def {}(state: AgentState)", tool_loop_router(node_id)));
    w.line("last_message = state[\"messages\"][-1]");
    w.block_open("if getattr(last_message, \"tool_calls\", None)");
    w.line(&format!("return {}", py_str(&format!("{node_id}_tools"))));
    w.block_close();

    match exit.map(|g| (g, g.kind())) {
        Some((group, Some(GroupKind::Plain))) if group.edges.len() == 1 => {
            w.line(&format!("return {}", py_target(&group.edges[0].target)));
        }
        Some((group, Some(GroupKind::Plain))) => {
            let targets: Vec<String> = group.edges.iter().map(|e| py_target(&e.target)).collect();
            w.line(&format!("return [{}]", targets.join(", ")));
        }
        Some((group, Some(GroupKind::Conditional | GroupKind::FanOut))) => {
            w.line(&format!("return {}(state)", group.router_name()));
        }
        _ => w.line("return END"),
    }
    w.block_close();
}

/// Destinations a tool-loop router can return, for `add_conditional_edges`.
pub fn tool_loop_destinations(node_id: &str, exit: Option<&EdgeGroup<'_>>) -> Vec<String> {
    let mut out = vec![py_str(&format!("{node_id}_tools"))];
    match exit {
        Some(group) => {
            for edge in &group.edges {
                let target = py_target(&edge.target);
                if !out.contains(&target) {
                    out.push(target);
                }
            }
        }
        None => out.push("END".to_string()),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, FanOut, edge_groups};

    fn edge(from: &str, to: Option<&str>) -> Edge {
        Edge::new(
            EdgeSource::Node(from.into()),
            to.map_or(EdgeTarget::End, |t| EdgeTarget::Node(t.into())),
        )
    }

    #[test]
    fn conditional_router_puts_default_last() {
        let mut fallback = edge("review", Some("revise"));
        fallback.default = true;
        let mut publish = edge("review", None);
        publish.condition = Some("state.get('score', 0) >= 0.8".into());
        let edges = vec![fallback, publish];
        let groups = edge_groups(&edges);

        let mut w = CodeWriter::new();
        emit_conditional(&groups[0], &mut w);
        assert_eq!(
            w.finish(),
            "def route_review(state: AgentState):\n\
             \x20   if state.get('score', 0) >= 0.8:\n\
             \x20       return END\n\
             \x20   return \"revise\"\n"
        );
    }

    #[test]
    fn fan_out_router_sends_per_item() {
        let mut split = edge("split", Some("summarise"));
        split.fan_out = Some(FanOut {
            items_field: "docs".into(),
            item_var: "doc".into(),
        });
        let edges = vec![split];
        let groups = edge_groups(&edges);

        let mut w = CodeWriter::new();
        emit_fan_out(&groups[0], &mut w);
        assert_eq!(
            w.finish(),
            "def route_split(state: AgentState):\n\
             \x20   items = state.get(\"docs\", [])\n\
             \x20   if not items:\n\
             \x20       return []\n\
             \x20   return [\n\
             \x20       Send(\"summarise\", {**state, \"doc\": item})\n\
             \x20       for item in items\n\
             \x20   ]\n"
        );
    }

    #[test]
    fn tool_loop_exits_through_plain_edge() {
        let edges = vec![edge("agent", Some("report"))];
        let groups = edge_groups(&edges);
        let mut w = CodeWriter::new();
        emit_tool_loop("agent", groups.first(), &mut w);
        let out = w.finish();
        assert!(out.starts_with("def route_agent_tool_calls(state: AgentState):\n"));
        assert!(out.contains("        return \"agent_tools\"\n"));
        assert!(out.ends_with("    return \"report\"\n"));
        assert_eq!(
            tool_loop_destinations("agent", groups.first()),
            vec!["\"agent_tools\"", "\"report\""]
        );
    }

    #[test]
    fn tool_loop_delegates_to_conditional_router() {
        let mut done = edge("agent", None);
        done.condition = Some("state.get('done')".into());
        let mut again = edge("agent", Some("agent"));
        again.default = true;
        let edges = vec![done, again];
        let groups = edge_groups(&edges);
        let mut w = CodeWriter::new();
        emit_tool_loop("agent", groups.first(), &mut w);
        assert!(w.finish().ends_with("    return route_agent(state)\n"));
    }
}
