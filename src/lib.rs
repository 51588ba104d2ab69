//! AJML compiler: validates agent workflow documents and generates LangGraph
//! Python modules from them.
//!
//! Pipeline: `parse` (text → element tree) → `validate` (tree → IR, one
//! document at a time) → `validate::cross` (references between agents) →
//! `codegen` (IR → Python).

pub mod codegen;
pub mod error;
pub mod ir;
pub mod parse;
pub mod validate;
pub mod wasm;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use codegen::{CodegenOutput, GeneratedFile};
pub use error::{Diagnostic, DiagnosticKind};
use ir::{Agent, Project};
use validate::ValidatedAgent;
pub use validate::scripts::{FsScriptResolver, KnownScripts, ScriptResolver};

/// Where the project document lives, relative to the project directory.
pub const PROJECT_FILE: &str = "agents/_project.ajml";

/// Compiler behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Advisory diagnostics fail the compile.
    pub strict: bool,
}

/// One document and the path it is reported under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub text: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        SourceFile {
            path: path.into(),
            text: text.into(),
        }
    }
}

/// Every document of one project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSources {
    pub project: Option<SourceFile>,
    pub agents: Vec<SourceFile>,
}

impl ProjectSources {
    /// Read `<dir>/agents/_project.ajml` and every other `*.ajml` beside it,
    /// agents sorted by file name.
    pub fn read_dir(dir: &Path) -> std::io::Result<ProjectSources> {
        let agents_dir = dir.join("agents");
        let project_path = dir.join(PROJECT_FILE);
        let project = if project_path.is_file() {
            Some(SourceFile::new(
                PROJECT_FILE,
                std::fs::read_to_string(&project_path)?,
            ))
        } else {
            None
        };

        let mut names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&agents_dir)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if name.ends_with(".ajml") && name != "_project.ajml" {
                names.push(name);
            }
        }
        names.sort();

        let agents = names
            .into_iter()
            .map(|name| {
                let text = std::fs::read_to_string(agents_dir.join(&name))?;
                Ok(SourceFile::new(format!("agents/{name}"), text))
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        Ok(ProjectSources { project, agents })
    }
}

/// One compiled agent: its IR, generated files and advisories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledAgent {
    pub agent: Agent,
    pub files: Vec<GeneratedFile>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledProject {
    pub project: Project,
    pub agents: Vec<CompiledAgent>,
}

impl CompiledProject {
    pub fn files(&self) -> impl Iterator<Item = &GeneratedFile> {
        self.agents.iter().flat_map(|a| a.files.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.agents.iter().flat_map(|a| a.warnings.iter())
    }
}

/// Parse and validate the project document.
pub fn load_project(source: &SourceFile) -> Result<Project, Vec<Diagnostic>> {
    let root = parse::parse_document(&source.text, &source.path).map_err(|d| vec![d])?;
    validate::validate_project(&root, &source.path)
}

/// Parse and validate one agent document on its own.
pub fn check_agent(
    source: &SourceFile,
    scripts: &dyn ScriptResolver,
) -> Result<ValidatedAgent, Vec<Diagnostic>> {
    let root = parse::parse_document(&source.text, &source.path).map_err(|d| vec![d])?;
    validate::validate_agent(&root, &source.path, scripts)
}

fn strict_gate(warnings: &[Diagnostic], options: &CompileOptions) -> Result<(), Vec<Diagnostic>> {
    if options.strict && !warnings.is_empty() {
        Err(warnings.to_vec())
    } else {
        Ok(())
    }
}

/// Compile a single agent document. Subgraph references are not resolved;
/// use [`compile_project`] when the agent calls other agents.
pub fn compile_agent(
    source: &SourceFile,
    project: &Project,
    options: &CompileOptions,
    scripts: &dyn ScriptResolver,
) -> Result<CompiledAgent, Vec<Diagnostic>> {
    let ValidatedAgent { agent, warnings } = check_agent(source, scripts)?;
    strict_gate(&warnings, options)?;
    let output = codegen::codegen(&agent, project);
    Ok(CompiledAgent {
        agent,
        files: output.files,
        warnings,
    })
}

/// Compile every agent of a project. Each agent document is validated on its
/// own first; fatal diagnostics of all documents are reported together, in
/// source order. Cross-document checks run only once every document passed.
pub fn compile_project(
    sources: &ProjectSources,
    options: &CompileOptions,
    scripts: &dyn ScriptResolver,
) -> Result<CompiledProject, Vec<Diagnostic>> {
    let Some(project_source) = &sources.project else {
        return Err(vec![Diagnostic::new(
            DiagnosticKind::MissingProject,
            PROJECT_FILE,
        )]);
    };
    let project = load_project(project_source)?;

    let mut validated = Vec::with_capacity(sources.agents.len());
    let mut errors = Vec::new();
    for source in &sources.agents {
        match check_agent(source, scripts) {
            Ok(v) => validated.push(v),
            Err(mut diagnostics) => errors.append(&mut diagnostics),
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    let (agents, warnings): (Vec<Agent>, Vec<Vec<Diagnostic>>) = validated
        .into_iter()
        .map(|v| (v.agent, v.warnings))
        .unzip();
    validate::resolve_project(&agents)?;

    let all_warnings: Vec<Diagnostic> = warnings.iter().flatten().cloned().collect();
    strict_gate(&all_warnings, options)?;

    let compiled: Vec<CompiledAgent> = agents
        .into_iter()
        .zip(warnings)
        .map(|(agent, warnings)| {
            let output = codegen::codegen(&agent, &project);
            CompiledAgent {
                agent,
                files: output.files,
                warnings,
            }
        })
        .collect();

    tracing::debug!(
        project = %project.name,
        agents = compiled.len(),
        warnings = all_warnings.len(),
        "project compiled"
    );
    Ok(CompiledProject {
        project,
        agents: compiled,
    })
}
