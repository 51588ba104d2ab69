//! Codegen pass: validated Agent → LangGraph Python module.
//!
//! Public API: `codegen(agent, project) -> CodegenOutput`

mod assembly;
mod imports;
mod literals;
mod nodes;
mod routing;
mod state;
mod tools;
mod writer;

use serde::Serialize;

use crate::ir::{Agent, LlmConfig, Project, edge_groups};
use writer::CodeWriter;

/// A generated file with its path and content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

/// The complete output of the codegen pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodegenOutput {
    pub files: Vec<GeneratedFile>,
}

/// Name of the module generated for an agent; subgraph nodes import it by
/// this name.
pub fn module_file_name(agent: &str) -> String {
    format!("compiled_{agent}.py")
}

/// Generate the Python module for one validated agent. Cross-document
/// references must already be resolved.
pub fn codegen(agent: &Agent, project: &Project) -> CodegenOutput {
    let content = gen_agent_module(agent, project.llm_for(agent));
    tracing::debug!(agent = %agent.name, bytes = content.len(), "codegen done");
    CodegenOutput {
        files: vec![GeneratedFile {
            path: module_file_name(&agent.name),
            content,
        }],
    }
}

fn gen_agent_module(agent: &Agent, llm: &LlmConfig) -> String {
    let mut w = CodeWriter::new();

    // 1. IMPORTS
    let import_set = imports::collect_imports(agent, llm);
    imports::emit_imports(&import_set, &mut w);
    w.gap();

    // 2. API TOOL SUPPORT
    if import_set.httpx {
        tools::emit_api_support(&mut w);
        w.gap();
    }

    // 3. STATE + LLM
    state::emit_state(&agent.state, &mut w);
    w.gap();
    state::emit_llm(llm, &mut w);
    w.gap();

    // 4. TOOLS
    for tool in &agent.tools {
        tools::emit_tool(tool, &mut w);
        w.gap();
    }

    // 5. NODES
    for node in &agent.nodes {
        nodes::emit_node(node, agent, &mut w);
        w.gap();
    }

    // 6. ROUTERS
    let groups = edge_groups(&agent.edges);
    routing::emit_routers(agent, &groups, &mut w);

    // 7. GRAPH
    assembly::emit_graph(agent, &groups, &mut w);

    w.finish()
}
