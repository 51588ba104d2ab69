//! Cross-document resolution: agent names, subgraph references and field
//! mappings, reference cycles.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};

use crate::error::{Diagnostic, DiagnosticKind};
use crate::ir::Agent;

/// Check the agents of one project against each other. Runs only after every
/// agent passed its own validation.
pub fn resolve_project(agents: &[Agent]) -> Result<(), Vec<Diagnostic>> {
    let by_name = unique_names(agents)?;
    check_references(agents, &by_name)?;
    check_cycles(agents, &by_name)?;
    tracing::debug!(agents = agents.len(), "project references resolved");
    Ok(())
}

fn unique_names(agents: &[Agent]) -> Result<HashMap<&str, &Agent>, Vec<Diagnostic>> {
    let mut by_name: HashMap<&str, &Agent> = HashMap::new();
    let mut errors = Vec::new();
    for agent in agents {
        if let Some(first) = by_name.get(agent.name.as_str()) {
            errors.push(Diagnostic::new(
                DiagnosticKind::DuplicateAgentName {
                    name: agent.name.clone(),
                    first_file: first.file.clone(),
                },
                &agent.file,
            ));
            continue;
        }
        by_name.insert(&agent.name, agent);
    }
    if errors.is_empty() {
        Ok(by_name)
    } else {
        Err(errors)
    }
}

fn check_references(agents: &[Agent], by_name: &HashMap<&str, &Agent>) -> Result<(), Vec<Diagnostic>> {
    let mut errors = Vec::new();
    for agent in agents {
        for node in agent.subgraphs() {
            let Some(child) = by_name.get(node.agent_ref.as_str()) else {
                errors.push(Diagnostic::new(
                    DiagnosticKind::UnknownAgentRef {
                        agent: node.agent_ref.clone(),
                    },
                    &agent.file,
                ));
                continue;
            };
            for mapping in &node.input_map {
                if child.field(&mapping.target).is_none() {
                    errors.push(Diagnostic::new(
                        DiagnosticKind::InputMapTarget {
                            target: mapping.target.clone(),
                            agent: child.name.clone(),
                        },
                        &agent.file,
                    ));
                }
            }
            for mapping in &node.output_map {
                if child.field(&mapping.source).is_none() {
                    errors.push(Diagnostic::new(
                        DiagnosticKind::OutputMapSource {
                            field: mapping.source.clone(),
                            agent: child.name.clone(),
                        },
                        &agent.file,
                    ));
                }
            }
        }
    }
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

/// Depth-first search with an explicit stack. The first cycle met, walking
/// agents and their subgraph nodes in declaration order, is reported with
/// its full path.
fn check_cycles(agents: &[Agent], by_name: &HashMap<&str, &Agent>) -> Result<(), Vec<Diagnostic>> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();
    for name in agents.iter().map(|a| a.name.as_str()) {
        index.insert(name, graph.add_node(name));
    }
    for agent in agents {
        for node in agent.subgraphs() {
            if let (Some(&from), Some(&to)) = (
                index.get(agent.name.as_str()),
                index.get(node.agent_ref.as_str()),
            ) {
                graph.add_edge(from, to, ());
            }
        }
    }

    // petgraph yields neighbours newest-first.
    let successors = |n: NodeIndex| -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = graph.neighbors(n).collect();
        out.reverse();
        out
    };

    let mut marks = vec![Mark::Unvisited; graph.node_count()];
    for root in graph.node_indices() {
        if marks[root.index()] != Mark::Unvisited {
            continue;
        }
        let mut path: Vec<NodeIndex> = vec![root];
        let mut stack: Vec<(Vec<NodeIndex>, usize)> = vec![(successors(root), 0)];
        marks[root.index()] = Mark::OnPath;

        while let Some((succ, next)) = stack.last_mut() {
            let Some(&n) = succ.get(*next) else {
                if let Some(done) = path.pop() {
                    marks[done.index()] = Mark::Done;
                }
                stack.pop();
                continue;
            };
            *next += 1;
            match marks[n.index()] {
                Mark::OnPath => {
                    let start = path.iter().position(|&p| p == n).unwrap_or(0);
                    let cycle: Vec<String> = path[start..]
                        .iter()
                        .chain(std::iter::once(&n))
                        .map(|&i| graph[i].to_string())
                        .collect();
                    let file = by_name
                        .get(cycle[0].as_str())
                        .map(|a| a.file.as_str())
                        .unwrap_or("");
                    return Err(vec![Diagnostic::new(
                        DiagnosticKind::CircularReference { path: cycle },
                        file,
                    )]);
                }
                Mark::Unvisited => {
                    marks[n.index()] = Mark::OnPath;
                    path.push(n);
                    stack.push((successors(n), 0));
                }
                Mark::Done => {}
            }
        }
    }
    Ok(())
}
