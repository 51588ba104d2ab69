//! Edge and graph-wide rules (E301–E315, E501–E503) plus the advisory
//! warnings W301/W302.

use std::collections::{HashMap, HashSet};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::ir::template::{self, Segment};
use crate::ir::*;
use crate::parse::Element;

use super::Report;
use super::expr;
use super::node_rules::DeclaredNodes;

// =============================================================================
// EDGE REFERENCES
// =============================================================================

/// Build the edge list, checking each edge on its own in declaration order.
pub fn validate_edges(
    graph: &Element,
    nodes: &DeclaredNodes,
    state: &[StateField],
    report: &mut Report<'_>,
) -> Vec<Edge> {
    graph
        .children_named("edge")
        .filter_map(|el| validate_edge(el, nodes, state, report))
        .collect()
}

fn validate_edge(
    el: &Element,
    nodes: &DeclaredNodes,
    state: &[StateField],
    report: &mut Report<'_>,
) -> Option<Edge> {
    let from = el.attr_or("source", "");
    let source = if from == START {
        EdgeSource::Start
    } else if nodes.contains(from) {
        EdgeSource::Node(from.into())
    } else {
        report.push(DiagnosticKind::UnknownEdgeSource { from: from.into() }, el.line);
        return None;
    };

    let to = el.attr_or("target", "");
    let target = if to == END {
        EdgeTarget::End
    } else if nodes.contains(to) {
        EdgeTarget::Node(to.into())
    } else {
        report.push(DiagnosticKind::UnknownEdgeTarget { target: to.into() }, el.line);
        return None;
    };

    let default = el.flag("default", false);
    let condition = el
        .child("condition")
        .map(|c| c.text.clone())
        .filter(|c| !c.is_empty());
    if default && condition.is_some() {
        report.push(
            DiagnosticKind::DefaultWithCondition {
                from: from.into(),
                to: to.into(),
            },
            el.line,
        );
        return None;
    }

    let fan_out = if el.attr("type") == Some("map") {
        let Some(config) = el.child("map_config") else {
            report.push(
                DiagnosticKind::MissingBlock {
                    block: "map_config".into(),
                },
                el.line,
            );
            return None;
        };
        let items_field = config.attr_or("items_field", "");
        if !state.iter().any(|f| f.name == items_field && f.ty.is_list()) {
            report.push(
                DiagnosticKind::FanOutType {
                    field: items_field.into(),
                },
                config.line.or(el.line),
            );
            return None;
        }
        Some(FanOut {
            items_field: items_field.into(),
            item_var: config.attr_or("item_var", "item").into(),
        })
    } else {
        None
    };

    Some(Edge {
        source,
        target,
        default,
        condition,
        fan_out,
        line: el.line,
    })
}

// =============================================================================
// GRAPH-WIDE CHECKS
// =============================================================================

/// Entry, grouping, defaults, expressions, reachability and coverage. Every
/// check runs; findings are appended in that order.
pub fn check_graph(agent: &Agent, lines: &HashMap<String, Option<u32>>, report: &mut Report<'_>) {
    check_entry(agent, report);
    check_groups(agent, report);
    check_conditions(agent, report);
    check_interpolations(agent, report);
    check_reachability(agent, lines, report);
    check_coverage(agent, lines, report);
}

fn check_entry(agent: &Agent, report: &mut Report<'_>) {
    if !agent.edges.iter().any(|e| e.source == EdgeSource::Start) {
        report.push(DiagnosticKind::NoEntryPoint, None);
    }
}

fn check_groups(agent: &Agent, report: &mut Report<'_>) {
    for group in edge_groups(&agent.edges) {
        let line = group.edges[0].line;
        let from = group.source.as_str().to_string();
        match group.kind() {
            None => report.push(DiagnosticKind::MixedEdgeTypes { from }, line),
            Some(GroupKind::Conditional) => match group.defaults().count() {
                0 => report.push(DiagnosticKind::MissingDefault { from }, line),
                1 => {}
                count => report.push(DiagnosticKind::MultipleDefaults { from, count }, line),
            },
            Some(GroupKind::Plain | GroupKind::FanOut) => {}
        }
    }
}

fn check_conditions(agent: &Agent, report: &mut Report<'_>) {
    for edge in &agent.edges {
        if let Some(condition) = &edge.condition {
            if let Err(kind) = expr::check_condition(condition) {
                report.push(kind, edge.line);
            }
        }
    }
}

/// Placeholders: prompts read state fields, URLs take `env:` references and
/// path parameters, header values take `env:` references only.
fn check_interpolations(agent: &Agent, report: &mut Report<'_>) {
    for node in &agent.nodes {
        if let Node::Llm(llm) = node {
            check_template(&llm.system_prompt, report, |seg| match seg {
                Segment::Env(_) => Some("environment references are not available in prompts".into()),
                _ => None,
            });
        }
    }

    for tool in &agent.tools {
        let Tool::ApiCall(api) = tool else { continue };
        check_template(&api.url, report, |seg| match seg {
            Segment::Field(name)
                if !api
                    .parameters
                    .iter()
                    .any(|p| p.location == ParamLocation::Path && p.map_to == name) =>
            {
                Some(format!("no path parameter maps to `{name}`"))
            }
            _ => None,
        });
        for header in &api.headers {
            check_template(&header.value, report, |seg| match seg {
                Segment::Field(_) => Some("header values only accept `env:` references".into()),
                _ => None,
            });
        }
    }
}

fn check_template(
    text: &str,
    report: &mut Report<'_>,
    reject: impl Fn(Segment<'_>) -> Option<String>,
) {
    let reason = match template::segments(text) {
        Err(e) => Some(e.to_string()),
        Ok(segments) => segments.into_iter().find_map(reject),
    };
    if let Some(reason) = reason {
        report.push(
            DiagnosticKind::InterpolationSyntax {
                text: text.to_string(),
                reason,
            },
            None,
        );
    }
}

fn check_reachability(
    agent: &Agent,
    lines: &HashMap<String, Option<u32>>,
    report: &mut Report<'_>,
) {
    let graph = AgentGraph::build(agent);
    let reachable = graph.reachable_from_start();
    for node in &agent.nodes {
        if !reachable.contains(node.id()) {
            report.push(
                DiagnosticKind::UnreachableNode {
                    node: node.id().into(),
                },
                lines.get(node.id()).copied().flatten(),
            );
        }
    }
}

fn check_coverage(agent: &Agent, lines: &HashMap<String, Option<u32>>, report: &mut Report<'_>) {
    let sources: HashSet<&str> = agent.edges.iter().map(|e| e.source.as_str()).collect();
    for node in &agent.nodes {
        if !sources.contains(node.id()) {
            report.push(
                DiagnosticKind::DeadEndNode {
                    node: node.id().into(),
                },
                lines.get(node.id()).copied().flatten(),
            );
        }
    }
}

// =============================================================================
// ADVISORIES
// =============================================================================

/// Non-fatal findings for an agent that passed every fatal check.
pub fn advisories(agent: &Agent, lines: &HashMap<String, Option<u32>>, file: &str) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    parallel_writes(agent, lines, file, &mut warnings);
    unused_required_fields(agent, file, &mut warnings);
    warnings
}

/// Several plain edges from one source run concurrently; any overwrite
/// field may be written by more than one branch.
fn parallel_writes(
    agent: &Agent,
    lines: &HashMap<String, Option<u32>>,
    file: &str,
    warnings: &mut Vec<Diagnostic>,
) {
    for group in edge_groups(&agent.edges) {
        if group.edges.len() < 2 || group.kind() != Some(GroupKind::Plain) {
            continue;
        }
        let line = lines
            .get(group.source.as_str())
            .copied()
            .flatten()
            .or(group.edges[0].line);
        for field in agent.state.iter().filter(|f| f.reducer == Reducer::Overwrite) {
            warnings.push(
                Diagnostic::new(
                    DiagnosticKind::ParallelWrite {
                        node: group.source.as_str().into(),
                        field: field.name.clone(),
                    },
                    file,
                )
                .at(line),
            );
        }
    }
}

fn unused_required_fields(agent: &Agent, file: &str, warnings: &mut Vec<Diagnostic>) {
    // Script nodes receive the whole state.
    if agent.nodes.iter().any(|n| matches!(n, Node::Script(_))) {
        return;
    }
    let used = referenced_fields(agent);
    for field in agent.state.iter().filter(|f| f.required) {
        if !used.contains(field.name.as_str()) {
            warnings.push(
                Diagnostic::new(
                    DiagnosticKind::UnusedField {
                        field: field.name.clone(),
                    },
                    file,
                )
                .at(field.line),
            );
        }
    }
}

/// Every field name some part of the agent reads or writes by name.
fn referenced_fields(agent: &Agent) -> HashSet<&str> {
    let mut used = HashSet::new();

    for node in &agent.nodes {
        match node {
            Node::Llm(n) => {
                used.extend(template::field_refs(&n.system_prompt));
                used.extend(n.output_schema.iter().map(|f| f.name.as_str()));
            }
            Node::Action(n) => {
                if let Some(tool) = agent.tool(&n.tool_ref) {
                    used.extend(tool.param_names());
                }
            }
            Node::Script(_) => {}
            Node::Subgraph(n) => {
                used.extend(n.input_map.iter().map(|m| m.source.as_str()));
                used.extend(n.output_map.iter().map(|m| m.target.as_str()));
            }
        }
    }

    for tool in &agent.tools {
        if let Tool::ApiCall(api) = tool {
            used.extend(api.returns.iter().map(|r| r.state_field.as_str()));
        }
    }

    for edge in &agent.edges {
        if let Some(condition) = &edge.condition {
            if let Ok(parsed) = expr::parse(condition) {
                for lit in parsed.string_literals() {
                    if let Some(field) = agent.field(lit) {
                        used.insert(field.name.as_str());
                    }
                }
            }
        }
        if let Some(fan_out) = &edge.fan_out {
            used.insert(fan_out.items_field.as_str());
        }
    }

    used
}
