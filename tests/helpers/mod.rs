#![allow(dead_code)]

use ajml_compiler::{
    CompileOptions, CompiledProject, Diagnostic, KnownScripts, ProjectSources, SourceFile,
    check_agent, compile_project,
};

// =============================================================================
// Document builders
// =============================================================================

pub const PROJECT_DOC: &str = r#"<project name="demo" ajml_version="2.0">
  <config>
    <llm provider="openai" model="gpt-4o" max_retries="2"/>
  </config>
</project>"#;

/// Assembles an agent document block by block.
#[derive(Debug, Clone)]
pub struct AgentDoc {
    name: String,
    state: Vec<String>,
    tools: Vec<String>,
    graph: Vec<String>,
}

impl AgentDoc {
    pub fn new(name: &str) -> Self {
        AgentDoc {
            name: name.into(),
            state: Vec::new(),
            tools: Vec::new(),
            graph: Vec::new(),
        }
    }

    pub fn field(mut self, xml: impl Into<String>) -> Self {
        self.state.push(xml.into());
        self
    }

    pub fn tool(mut self, xml: impl Into<String>) -> Self {
        self.tools.push(xml.into());
        self
    }

    /// A node or an edge, kept in the order given.
    pub fn graph(mut self, xml: impl Into<String>) -> Self {
        self.graph.push(xml.into());
        self
    }

    pub fn render(&self) -> String {
        let mut out = format!("<agent name=\"{}\" version=\"1.0\">\n  <state>\n", self.name);
        for f in &self.state {
            out.push_str(&format!("    {f}\n"));
        }
        out.push_str("  </state>\n");
        if !self.tools.is_empty() {
            out.push_str("  <tools>\n");
            for t in &self.tools {
                out.push_str(&format!("    {t}\n"));
            }
            out.push_str("  </tools>\n");
        }
        out.push_str("  <graph>\n");
        for g in &self.graph {
            out.push_str(&format!("    {g}\n"));
        }
        out.push_str("  </graph>\n</agent>\n");
        out
    }

    pub fn source(&self) -> SourceFile {
        SourceFile::new(format!("agents/{}.ajml", self.name), self.render())
    }
}

pub fn field(name: &str, ty: &str) -> String {
    format!(r#"<field name="{name}" type="{ty}"/>"#)
}

pub fn required_field(name: &str, ty: &str) -> String {
    format!(r#"<field name="{name}" type="{ty}" required="true"/>"#)
}

pub fn llm_node(id: &str, prompt: &str) -> String {
    format!(r#"<node id="{id}" type="llm"><system_prompt>{prompt}</system_prompt></node>"#)
}

pub fn edge(source: &str, target: &str) -> String {
    format!(r#"<edge source="{source}" target="{target}"/>"#)
}

pub fn cond_edge(source: &str, target: &str, condition: &str) -> String {
    format!(r#"<edge source="{source}" target="{target}"><condition>{condition}</condition></edge>"#)
}

pub fn default_edge(source: &str, target: &str) -> String {
    format!(r#"<edge source="{source}" target="{target}" default="true"/>"#)
}

pub fn map_edge(source: &str, target: &str, items: &str, var: &str) -> String {
    format!(
        r#"<edge source="{source}" target="{target}" type="map"><map_config items_field="{items}" item_var="{var}"/></edge>"#
    )
}

/// One required field read by one LLM node on a straight line.
pub fn minimal_agent(name: &str) -> AgentDoc {
    AgentDoc::new(name)
        .field(required_field("question", "string"))
        .graph(llm_node("answer", "Answer the question: ${question}"))
        .graph(edge("__START__", "answer"))
        .graph(edge("answer", "__END__"))
}

// =============================================================================
// Pipeline shortcuts
// =============================================================================

pub fn project_sources(agents: &[&AgentDoc]) -> ProjectSources {
    ProjectSources {
        project: Some(SourceFile::new("agents/_project.ajml", PROJECT_DOC)),
        agents: agents.iter().map(|a| a.source()).collect(),
    }
}

pub fn compile(agents: &[&AgentDoc], options: CompileOptions) -> Result<CompiledProject, Vec<Diagnostic>> {
    compile_project(&project_sources(agents), &options, &KnownScripts::default())
}

/// Codes of the fatal diagnostics for one agent, in reported order.
pub fn error_codes(doc: &AgentDoc) -> Vec<&'static str> {
    error_codes_with(doc, &KnownScripts::default())
}

pub fn error_codes_with(doc: &AgentDoc, scripts: &KnownScripts) -> Vec<&'static str> {
    match check_agent(&doc.source(), scripts) {
        Ok(_) => Vec::new(),
        Err(errors) => errors.iter().map(|d| d.code()).collect(),
    }
}

/// Advisories of an agent that passes validation.
pub fn warnings(doc: &AgentDoc) -> Vec<Diagnostic> {
    match check_agent(&doc.source(), &KnownScripts::default()) {
        Ok(validated) => validated.warnings,
        Err(errors) => panic!("agent should validate, got {errors:?}"),
    }
}

/// The generated module of a single-agent project.
pub fn python(doc: &AgentDoc) -> String {
    let compiled = compile(&[doc], CompileOptions::default())
        .unwrap_or_else(|e| panic!("compile failed: {e:?}"));
    compiled.agents[0].files[0].content.clone()
}
