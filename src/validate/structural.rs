//! Root-level rules: root tag and name, required blocks, version and LLM
//! provider configuration.

use crate::error::DiagnosticKind;
use crate::ir::{EnvVar, LlmConfig, Project, Provider, SUPPORTED_AJML_VERSION, ServerConfig};
use crate::parse::Element;

use super::{Report, number_attr};

/// The pieces of an agent document the later stages walk.
pub struct AgentShell<'e> {
    pub name: String,
    pub version: String,
    pub description: String,
    pub llm: Option<LlmConfig>,
    pub state: &'e Element,
    pub tools: Option<&'e Element>,
    pub graph: &'e Element,
}

/// Build the `Project` from a project document. `None` only when `report`
/// holds the reason.
pub fn validate_project_root(root: &Element, report: &mut Report<'_>) -> Option<Project> {
    let name = root.attr("name").unwrap_or("").trim();
    if root.tag != "project" || name.is_empty() {
        report.push(
            DiagnosticKind::RootMismatch {
                expected: "project".into(),
            },
            root.line,
        );
        return None;
    }

    let version = root.attr("ajml_version").unwrap_or("");
    if version != SUPPORTED_AJML_VERSION {
        report.push(
            DiagnosticKind::InvalidVersion {
                found: version.to_string(),
            },
            root.line,
        );
        return None;
    }

    let mut project = Project::new(name);
    project.file = report.file().to_string();

    let Some(config) = root.child("config") else {
        return Some(project);
    };

    if let Some(llm) = config.child("llm") {
        project.llm = llm_config(llm, report)?;
    }

    if let Some(server) = config.child("server") {
        let auth_env = server
            .attr("auth_env")
            .filter(|v| !v.is_empty())
            .map(String::from);
        project.server = ServerConfig {
            cors_origins: server.attr_or("cors_origins", "*").to_string(),
            docs_public: server.flag("docs_public", auth_env.is_none()),
            auth_env,
            host: server.attr_or("host", "0.0.0.0").to_string(),
            port: number_attr(server, "port", 8000, report),
        };
    }

    if let Some(env) = config.child("env") {
        project.env_vars = env
            .children_named("var")
            .map(|var| EnvVar {
                name: var.attr_or("name", "").to_string(),
                required: var.flag("required", false),
                default: var.attr("default").map(String::from),
            })
            .collect();
    }

    Some(project)
}

/// Check the agent root and locate its blocks. `None` only when `report`
/// holds the reason.
pub fn validate_agent_root<'e>(root: &'e Element, report: &mut Report<'_>) -> Option<AgentShell<'e>> {
    let name = root.attr("name").unwrap_or("").trim();
    if root.tag != "agent" || name.is_empty() {
        report.push(
            DiagnosticKind::RootMismatch {
                expected: "agent".into(),
            },
            root.line,
        );
        return None;
    }

    let mut blocks = Vec::with_capacity(2);
    for block in ["state", "graph"] {
        match root.child(block) {
            Some(el) => blocks.push(el),
            None => {
                report.push(
                    DiagnosticKind::MissingBlock {
                        block: block.into(),
                    },
                    root.line,
                );
                return None;
            }
        }
    }

    let llm = match root.child("config").and_then(|c| c.child("llm")) {
        Some(llm) => Some(llm_config(llm, report)?),
        None => None,
    };

    Some(AgentShell {
        name: name.to_string(),
        version: root.attr_or("version", "1.0").to_string(),
        description: root.attr_or("description", "").to_string(),
        llm,
        state: blocks[0],
        tools: root.child("tools"),
        graph: blocks[1],
    })
}

/// An `<llm>` element. An absent or empty provider is allowed and leaves
/// codegen to emit a placeholder.
fn llm_config(el: &Element, report: &mut Report<'_>) -> Option<LlmConfig> {
    let provider = match el.attr("provider").unwrap_or("") {
        "" => None,
        raw => match Provider::parse(raw) {
            Some(p) => Some(p),
            None => {
                report.push(
                    DiagnosticKind::UnknownProvider {
                        provider: raw.to_string(),
                        supported: Provider::supported_list(),
                    },
                    el.line,
                );
                return None;
            }
        },
    };
    Some(LlmConfig {
        provider,
        model: el.attr_or("model", "").to_string(),
        max_retries: number_attr(el, "max_retries", 2, report),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(attrs: &[(&str, &str)]) -> Element {
        attrs
            .iter()
            .fold(Element::new("project"), |e, (k, v)| e.with_attr(k, v))
    }

    #[test]
    fn project_defaults() {
        let root = project(&[("name", "demo"), ("ajml_version", "2.0")]);
        let mut report = Report::new("_project.ajml");
        let p = validate_project_root(&root, &mut report).unwrap();
        assert!(report.is_clean());
        assert_eq!(p.llm.max_retries, 2);
        assert_eq!(p.llm.provider, None);
        assert_eq!(p.server.port, 8000);
        assert_eq!(p.server.cors_origins, "*");
        assert!(p.server.docs_public);
    }

    #[test]
    fn docs_public_follows_auth_env() {
        let root = project(&[("name", "demo"), ("ajml_version", "2.0")]).with_child(
            Element::new("config")
                .with_child(Element::new("server").with_attr("auth_env", "API_TOKEN")),
        );
        let mut report = Report::new("_project.ajml");
        let p = validate_project_root(&root, &mut report).unwrap();
        assert_eq!(p.server.auth_env.as_deref(), Some("API_TOKEN"));
        assert!(!p.server.docs_public);
    }

    #[test]
    fn wrong_version_is_e004() {
        let root = project(&[("name", "demo"), ("ajml_version", "1.0")]);
        let mut report = Report::new("_project.ajml");
        assert!(validate_project_root(&root, &mut report).is_none());
        assert_eq!(report.diagnostics[0].code(), "E004");
    }

    #[test]
    fn missing_graph_block_is_e002() {
        let root = Element::new("agent")
            .with_attr("name", "a")
            .with_child(Element::new("state"));
        let mut report = Report::new("a.ajml");
        assert!(validate_agent_root(&root, &mut report).is_none());
        assert_eq!(
            report.diagnostics[0].kind,
            DiagnosticKind::MissingBlock {
                block: "graph".into()
            }
        );
    }

    #[test]
    fn agent_provider_override_checked() {
        let root = Element::new("agent")
            .with_attr("name", "a")
            .with_child(Element::new("state"))
            .with_child(Element::new("graph"))
            .with_child(
                Element::new("config").with_child(Element::new("llm").with_attr("provider", "cohere")),
            );
        let mut report = Report::new("a.ajml");
        assert!(validate_agent_root(&root, &mut report).is_none());
        assert_eq!(report.diagnostics[0].code(), "E401");
    }
}
