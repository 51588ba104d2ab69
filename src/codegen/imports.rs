//! Scan the agent to determine which imports are needed and emit them.

use std::collections::BTreeSet;

use super::writer::CodeWriter;
use crate::ir::*;

/// Tracks which modules and symbols the generated module needs.
#[derive(Debug, Default)]
pub struct ImportSet {
    // standard library
    pub importlib: bool,
    pub logging: bool,
    pub operator: bool,
    pub os: bool,
    pub literal: bool,

    // third party
    pub httpx: bool,
    pub tool_decorator: bool,
    pub pydantic: bool,
    pub tool_node: bool,
    pub send: bool,
    pub tenacity: BTreeSet<&'static str>,
    /// `(module, class)` of the chat model.
    pub provider: Option<(&'static str, &'static str)>,

    /// Agents referenced by subgraph nodes.
    pub subgraphs: BTreeSet<String>,
}

/// LangChain chat model class for a provider, as `(module, class)`.
pub fn provider_import(provider: Provider) -> (&'static str, &'static str) {
    match provider {
        Provider::Openai => ("langchain_openai", "ChatOpenAI"),
        Provider::Anthropic => ("langchain_anthropic", "ChatAnthropic"),
        Provider::Google => ("langchain_google_genai", "ChatGoogleGenerativeAI"),
        Provider::Mistral => ("langchain_mistralai", "ChatMistralAI"),
        Provider::Groq => ("langchain_groq", "ChatGroq"),
        Provider::Ollama => ("langchain_ollama", "ChatOllama"),
        Provider::AzureOpenai => ("langchain_openai", "AzureChatOpenAI"),
        Provider::Bedrock => ("langchain_aws", "ChatBedrock"),
    }
}

/// Scan the agent and collect all needed imports.
pub fn collect_imports(agent: &Agent, llm: &LlmConfig) -> ImportSet {
    let mut imports = ImportSet {
        provider: llm.provider.map(provider_import),
        ..ImportSet::default()
    };

    imports.operator = agent.state.iter().any(|f| {
        matches!(
            f.reducer,
            Reducer::Append | Reducer::Add | Reducer::Concat
        )
    });

    for tool in &agent.tools {
        imports.tool_decorator = true;
        imports.pydantic = true;
        match tool {
            Tool::ApiCall(api) => {
                imports.httpx = true;
                imports.logging = true;
                imports.os = true;
                if api.max_retries > 0 {
                    imports.tenacity.extend([
                        "retry",
                        "retry_if_exception",
                        "stop_after_attempt",
                    ]);
                    imports.tenacity.insert(match api.backoff {
                        Backoff::Exponential => "wait_exponential",
                        Backoff::Fixed => "wait_fixed",
                    });
                }
            }
            Tool::LocalScript(_) | Tool::ScriptTool(_) => imports.importlib = true,
        }
    }

    for node in &agent.nodes {
        match node {
            Node::Llm(llm_node) if !llm_node.tool_binds.is_empty() => imports.tool_node = true,
            Node::Llm(llm_node) if !llm_node.output_schema.is_empty() => {
                imports.pydantic = true;
                if llm_node
                    .output_schema
                    .iter()
                    .any(|f| f.ty == "enum" && !f.values.is_empty())
                {
                    imports.literal = true;
                }
            }
            Node::Llm(_) | Node::Action(_) => {}
            Node::Script(_) => imports.importlib = true,
            Node::Subgraph(sub) => {
                imports.subgraphs.insert(sub.agent_ref.clone());
            }
        }
    }

    imports.send = agent.edges.iter().any(|e| e.fan_out.is_some());

    imports
}

/// Emit the import block: standard library, third party, then sibling
/// compiled agents.
pub fn emit_imports(imports: &ImportSet, w: &mut CodeWriter) {
    // standard library
    for (needed, module) in [
        (imports.importlib, "importlib"),
        (imports.logging, "logging"),
        (imports.operator, "operator"),
        (imports.os, "os"),
    ] {
        if needed {
            w.line(&format!("import {module}"));
        }
    }
    if imports.literal {
        w.line("from typing import Annotated, Literal, TypedDict");
    } else {
        w.line("from typing import Annotated, TypedDict");
    }
    w.blank();

    // third party
    if imports.httpx {
        w.line("import httpx");
    }
    let mut from_lines: Vec<String> = vec![
        "from langchain_core.messages import AIMessage, SystemMessage".into(),
        "from langgraph.graph import END, START, StateGraph".into(),
        "from langgraph.graph.message import add_messages".into(),
    ];
    if imports.tool_decorator {
        from_lines.push("from langchain_core.tools import tool".into());
    }
    if imports.pydantic {
        from_lines.push("from pydantic import BaseModel, Field".into());
    }
    if imports.tool_node {
        from_lines.push("from langgraph.prebuilt import ToolNode".into());
    }
    if imports.send {
        from_lines.push("from langgraph.constants import Send".into());
    }
    if !imports.tenacity.is_empty() {
        let parts: Vec<&str> = imports.tenacity.iter().copied().collect();
        from_lines.push(format!("from tenacity import {}", parts.join(", ")));
    }
    if let Some((module, class)) = imports.provider {
        from_lines.push(format!("from {module} import {class}"));
    }
    from_lines.sort();
    from_lines.dedup();
    for line in &from_lines {
        w.line(line);
    }

    // compiled sibling agents
    if !imports.subgraphs.is_empty() {
        w.blank();
        for agent in &imports.subgraphs {
            w.line(&format!("from compiled_{agent} import graph as {agent}_graph"));
        }
    }
}
