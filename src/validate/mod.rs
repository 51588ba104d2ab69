//! Validation phase: `Element` tree → IR.
//!
//! Checks run in a fixed order so the first reported diagnostic is always the
//! first violated check: structure, declarations (uniqueness, types,
//! references), edge references, then the graph-wide checks. A failing stage
//! stops the pipeline; every diagnostic within a stage is kept.

pub mod cross;
pub mod expr;
pub mod graph_rules;
pub mod node_rules;
pub mod scripts;
pub mod state_rules;
pub mod structural;

use std::str::FromStr;

use serde::Serialize;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::ir::{Agent, Project};
use crate::parse::Element;
use scripts::ScriptResolver;

pub use cross::resolve_project;

/// A successfully validated agent plus its advisory diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedAgent {
    pub agent: Agent,
    pub warnings: Vec<Diagnostic>,
}

/// Validate a `_project.ajml` document.
pub fn validate_project(root: &Element, file: &str) -> Result<Project, Vec<Diagnostic>> {
    let mut report = Report::new(file);
    let project = structural::validate_project_root(root, &mut report);
    report.finish()?;
    match project {
        Some(project) => Ok(project),
        None => Err(report.diagnostics),
    }
}

/// Validate one agent document on its own. References to sibling agents are
/// resolved later by [`cross::resolve_project`].
pub fn validate_agent(
    root: &Element,
    file: &str,
    scripts: &dyn ScriptResolver,
) -> Result<ValidatedAgent, Vec<Diagnostic>> {
    let mut report = Report::new(file);

    // 1. Structure
    let Some(shell) = structural::validate_agent_root(root, &mut report) else {
        return Err(report.diagnostics);
    };

    // 2. Declarations
    let state = state_rules::validate_state(shell.state, &mut report);
    let tools = node_rules::validate_tools(shell.tools, &state, scripts, &mut report);
    let nodes = node_rules::validate_nodes(shell.graph, &state, &tools, scripts, &mut report);
    report.finish()?;

    // 3. Edge references
    let edges = graph_rules::validate_edges(shell.graph, &nodes, &state, &mut report);
    report.finish()?;

    let agent = Agent {
        name: shell.name,
        version: shell.version,
        description: shell.description,
        llm: shell.llm,
        state,
        tools,
        nodes: nodes.nodes,
        edges,
        file: file.to_string(),
    };

    // 4. Graph-wide checks
    graph_rules::check_graph(&agent, &nodes.lines, &mut report);
    report.finish()?;

    let warnings = graph_rules::advisories(&agent, &nodes.lines, file);
    for w in &warnings {
        tracing::warn!(code = w.code(), agent = %agent.name, "{}", w.kind);
    }
    tracing::debug!(
        agent = %agent.name,
        fields = agent.state.len(),
        tools = agent.tools.len(),
        nodes = agent.nodes.len(),
        edges = agent.edges.len(),
        warnings = warnings.len(),
        "agent validated"
    );

    Ok(ValidatedAgent { agent, warnings })
}

/// Fatal diagnostics collected for one document, in check order.
pub struct Report<'f> {
    file: &'f str,
    pub diagnostics: Vec<Diagnostic>,
}

impl<'f> Report<'f> {
    pub fn new(file: &'f str) -> Self {
        Report {
            file,
            diagnostics: Vec::new(),
        }
    }

    pub fn file(&self) -> &'f str {
        self.file
    }

    pub fn push(&mut self, kind: DiagnosticKind, line: Option<u32>) {
        self.diagnostics
            .push(Diagnostic::new(kind, self.file).at(line));
    }

    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// End of a stage: hand back everything found so far, if anything.
    pub fn finish(&mut self) -> Result<(), Vec<Diagnostic>> {
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(std::mem::take(&mut self.diagnostics))
        }
    }
}

/// An identifying attribute (`name`, `id`) that must be present and non-empty.
pub(crate) fn required_attr<'e>(
    el: &'e Element,
    name: &str,
    report: &mut Report<'_>,
) -> Option<&'e str> {
    match el.attr(name) {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            report.push(
                DiagnosticKind::MalformedDocument {
                    reason: format!("`<{}>` requires a non-empty `{}` attribute", el.tag, name),
                },
                el.line,
            );
            None
        }
    }
}

/// Numeric attribute with a default when absent.
pub(crate) fn number_attr<T: FromStr>(
    el: &Element,
    name: &str,
    default: T,
    report: &mut Report<'_>,
) -> T {
    let Some(raw) = el.attr(name) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) => v,
        Err(_) => {
            report.push(
                DiagnosticKind::MalformedDocument {
                    reason: format!(
                        "attribute `{}` on `<{}>` must be a number, found '{}'",
                        name, el.tag, raw
                    ),
                },
                el.line,
            );
            default
        }
    }
}

/// Comma-separated list with blanks dropped.
pub(crate) fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .collect()
}
