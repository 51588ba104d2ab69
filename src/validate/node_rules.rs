//! Tool and node declarations: ids, variant types, tool references, script
//! files and action parameters.

use std::collections::{HashMap, HashSet};

use crate::error::DiagnosticKind;
use crate::ir::template;
use crate::ir::*;
use crate::parse::Element;

use super::scripts::ScriptResolver;
use super::{Report, number_attr, required_attr, split_list};

/// Nodes in declaration order plus the source line of each, for later
/// graph diagnostics.
#[derive(Debug, Default)]
pub struct DeclaredNodes {
    pub nodes: Vec<Node>,
    pub lines: HashMap<String, Option<u32>>,
}

impl DeclaredNodes {
    pub fn contains(&self, id: &str) -> bool {
        self.lines.contains_key(id)
    }
}

// =============================================================================
// TOOLS
// =============================================================================

pub fn validate_tools(
    tools: Option<&Element>,
    state: &[StateField],
    scripts: &dyn ScriptResolver,
    report: &mut Report<'_>,
) -> Vec<Tool> {
    let Some(tools) = tools else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for el in tools.children_named("tool") {
        let Some(id) = required_attr(el, "id", report) else {
            continue;
        };
        if is_reserved(id) {
            report.push(
                DiagnosticKind::ReservedWord {
                    word: id.into(),
                    role: "tool ID".into(),
                },
                el.line,
            );
            continue;
        }
        if !is_python_name(id) {
            report.push(
                DiagnosticKind::InvalidIdentifier {
                    name: id.into(),
                    role: "tool ID".into(),
                },
                el.line,
            );
            continue;
        }
        if !seen.insert(id.to_string()) {
            report.push(DiagnosticKind::DuplicateToolId { id: id.into() }, el.line);
            continue;
        }

        let tool = match el.attr_or("type", "") {
            "api_call" => api_call_tool(el, id, report)
                .filter(|api| api_state_refs(api, state, el.line, report))
                .map(Tool::ApiCall),
            "local_script" => {
                let path = el.attr_or("path", "");
                script_exists(path, el, scripts, report).then(|| {
                    Tool::LocalScript(LocalScriptTool {
                        id: id.into(),
                        path: path.into(),
                        description: el.attr_or("description", "").into(),
                    })
                })
            }
            "script_tool" => {
                let src = el.attr_or("src", "");
                script_exists(src, el, scripts, report).then(|| {
                    Tool::ScriptTool(ScriptTool {
                        id: id.into(),
                        src: src.into(),
                        description: el.attr_or("description", "").into(),
                        parameters: params(el)
                            .map(|p| ScriptParam {
                                name: p.attr_or("name", "").into(),
                                ty: p.attr_or("type", "").into(),
                                description: p.attr_or("description", "").into(),
                            })
                            .collect(),
                    })
                })
            }
            other => {
                report.push(
                    DiagnosticKind::InvalidToolType {
                        found: other.into(),
                    },
                    el.line,
                );
                None
            }
        };
        out.extend(tool);
    }
    out
}

fn params(tool: &Element) -> impl Iterator<Item = &Element> {
    tool.child("parameters")
        .into_iter()
        .flat_map(|p| p.children_named("param"))
}

fn api_call_tool(el: &Element, id: &str, report: &mut Report<'_>) -> Option<ApiCallTool> {
    let endpoint = el.child("endpoint");
    let backoff = match el.attr_or("backoff", "exponential") {
        "exponential" => Backoff::Exponential,
        "fixed" => Backoff::Fixed,
        other => {
            report.push(
                DiagnosticKind::MalformedDocument {
                    reason: format!("`backoff` must be `exponential` or `fixed`, found '{other}'"),
                },
                el.line,
            );
            return None;
        }
    };

    let mut retry_status_codes = Vec::new();
    for code in split_list(el.attr_or("retry_status_codes", "429, 500, 502, 503, 504")) {
        match code.parse::<u16>() {
            Ok(c) => retry_status_codes.push(c),
            Err(_) => {
                report.push(
                    DiagnosticKind::MalformedDocument {
                        reason: format!("retry status code '{code}' is not a number"),
                    },
                    el.line,
                );
                return None;
            }
        }
    }

    let parameters = params(el)
        .map(|p| {
            let name = p.attr_or("name", "");
            ApiParam {
                name: name.into(),
                ty: p.attr_or("type", "").into(),
                map_to: p.attr("map_to").filter(|m| !m.is_empty()).unwrap_or(name).into(),
                location: match p.attr_or("in", "") {
                    "query" => ParamLocation::Query,
                    "path" => ParamLocation::Path,
                    "body" => ParamLocation::Body,
                    _ => ParamLocation::Unplaced,
                },
                description: p.attr_or("description", "").into(),
            }
        })
        .collect();

    Some(ApiCallTool {
        id: id.into(),
        description: el.attr_or("description", "").into(),
        method: endpoint
            .map(|e| e.attr_or("method", "GET"))
            .unwrap_or("GET")
            .to_ascii_uppercase(),
        url: endpoint.map(|e| e.attr_or("url", "")).unwrap_or("").into(),
        headers: el
            .child("headers")
            .into_iter()
            .flat_map(|h| h.children_named("header"))
            .map(|h| Header {
                name: h.attr_or("name", "").into(),
                value: h.attr_or("value", "").into(),
            })
            .collect(),
        parameters,
        body: el.child("body").map(|b| RequestBody {
            format: b.attr_or("format", "json").into(),
            fields: b
                .children_named("field")
                .map(|f| BodyField {
                    name: f.attr_or("name", "").into(),
                    ty: f.attr_or("type", "").into(),
                    from_state: f.attr_or("from_state", "").into(),
                })
                .collect(),
        }),
        returns: el
            .child("returns")
            .into_iter()
            .flat_map(|r| r.children_named("map"))
            .map(|m| ReturnMapping {
                api_field: m.attr_or("api_field", "").into(),
                state_field: m.attr_or("state_field", "").into(),
            })
            .collect(),
        max_retries: number_attr(el, "max_retries", 0, report),
        timeout: number_attr(el, "timeout", 30.0, report),
        retry_status_codes,
        backoff,
        backoff_base: number_attr(el, "backoff_base", 1.0, report),
    })
}

/// Returned values and body fields must land on declared state fields.
fn api_state_refs(
    api: &ApiCallTool,
    state: &[StateField],
    line: Option<u32>,
    report: &mut Report<'_>,
) -> bool {
    let returns = api.returns.iter().map(|r| r.state_field.as_str());
    let body = api
        .body
        .iter()
        .flat_map(|b| &b.fields)
        .map(|f| f.from_state.as_str());
    let site = format!("Tool `{}`", api.id);
    let mut ok = true;
    for field in returns.chain(body) {
        ok &= state_ref(field, &site, state, &[], line, report);
    }
    ok
}

fn state_ref(
    field: &str,
    site: &str,
    state: &[StateField],
    extra: &[&str],
    line: Option<u32>,
    report: &mut Report<'_>,
) -> bool {
    if state.iter().any(|f| f.name == field) || extra.contains(&field) {
        return true;
    }
    report.push(
        DiagnosticKind::UnknownStateField {
            field: field.into(),
            site: site.into(),
        },
        line,
    );
    false
}

fn script_exists(
    path: &str,
    el: &Element,
    scripts: &dyn ScriptResolver,
    report: &mut Report<'_>,
) -> bool {
    if scripts.exists(path) {
        return true;
    }
    report.push(DiagnosticKind::ScriptNotFound { path: path.into() }, el.line);
    false
}

// =============================================================================
// NODES
// =============================================================================

pub fn validate_nodes(
    graph: &Element,
    state: &[StateField],
    tools: &[Tool],
    scripts: &dyn ScriptResolver,
    report: &mut Report<'_>,
) -> DeclaredNodes {
    let mut declared = DeclaredNodes::default();
    // Fan-out targets also see the item variable of their map edge.
    let item_vars: Vec<&str> = graph
        .children_named("edge")
        .filter_map(|e| e.child("map_config"))
        .filter_map(|m| m.attr("item_var"))
        .collect();

    for el in graph.children_named("node") {
        let Some(id) = required_attr(el, "id", report) else {
            continue;
        };
        if is_reserved(id) {
            report.push(
                DiagnosticKind::ReservedWord {
                    word: id.into(),
                    role: "node ID".into(),
                },
                el.line,
            );
            continue;
        }
        if !is_python_name(id) {
            report.push(
                DiagnosticKind::InvalidIdentifier {
                    name: id.into(),
                    role: "node ID".into(),
                },
                el.line,
            );
            continue;
        }
        if declared.contains(id) {
            report.push(DiagnosticKind::DuplicateNodeId { id: id.into() }, el.line);
            continue;
        }
        declared.lines.insert(id.to_string(), el.line);

        let node = match el.attr_or("type", "") {
            "llm" => llm_node(el, id, tools, report)
                .filter(|llm| prompt_refs(llm, state, &item_vars, el.line, report))
                .map(Node::Llm),
            "action" => action_node(el, id, state, tools, report).map(Node::Action),
            "script" => {
                let path = el.attr_or("path", "");
                script_exists(path, el, scripts, report).then(|| {
                    Node::Script(ScriptNode {
                        id: id.into(),
                        path: path.into(),
                    })
                })
            }
            "subgraph" => subgraph_node(el, id, state, report).map(Node::Subgraph),
            other => {
                report.push(
                    DiagnosticKind::InvalidNodeType {
                        found: other.into(),
                    },
                    el.line,
                );
                None
            }
        };
        declared.nodes.extend(node);
    }

    tracing::debug!(count = declared.nodes.len(), "nodes declared");
    declared
}

fn llm_node(el: &Element, id: &str, tools: &[Tool], report: &mut Report<'_>) -> Option<LlmNode> {
    let mut tool_binds = Vec::new();
    for bind in el.children_named("tool_bind") {
        let tool = bind.attr_or("ref", "");
        if !tools.iter().any(|t| t.id() == tool) {
            report.push(DiagnosticKind::UnknownTool { tool: tool.into() }, bind.line);
            return None;
        }
        tool_binds.push(tool.to_string());
    }

    let output_schema = el
        .child("output_schema")
        .into_iter()
        .flat_map(|s| s.children_named("field"))
        .map(|f| OutputField {
            name: f.attr_or("name", "").into(),
            ty: f.attr_or("type", "string").into(),
            description: f.attr_or("description", "").into(),
            values: split_list(f.attr_or("values", "")),
        })
        .collect();

    Some(LlmNode {
        id: id.into(),
        system_prompt: el
            .child("system_prompt")
            .map(|p| p.text.clone())
            .unwrap_or_default(),
        output_schema,
        tool_binds,
    })
}

/// Malformed placeholders are left to the interpolation check.
fn prompt_refs(
    llm: &LlmNode,
    state: &[StateField],
    item_vars: &[&str],
    line: Option<u32>,
    report: &mut Report<'_>,
) -> bool {
    let site = format!("Prompt of node `{}`", llm.id);
    let mut ok = true;
    for field in template::field_refs(&llm.system_prompt) {
        ok &= state_ref(field, &site, state, item_vars, line, report);
    }
    ok
}

fn action_node(
    el: &Element,
    id: &str,
    state: &[StateField],
    tools: &[Tool],
    report: &mut Report<'_>,
) -> Option<ActionNode> {
    let tool_ref = el.attr_or("tool_ref", "");
    let Some(tool) = tools.iter().find(|t| t.id() == tool_ref) else {
        report.push(
            DiagnosticKind::UnknownTool {
                tool: tool_ref.into(),
            },
            el.line,
        );
        return None;
    };

    // Action nodes call their tool with `state.get(param)` for every declared parameter.
    for param in tool.param_names() {
        if !state.iter().any(|f| f.name == param) {
            report.push(
                DiagnosticKind::ActionParamNotInState {
                    node: id.into(),
                    param: param.into(),
                },
                el.line,
            );
            return None;
        }
    }

    Some(ActionNode {
        id: id.into(),
        tool_ref: tool_ref.into(),
    })
}

/// Input sources and output targets are this agent's own fields; the child
/// side is checked once every agent is known.
fn subgraph_node(
    el: &Element,
    id: &str,
    state: &[StateField],
    report: &mut Report<'_>,
) -> Option<SubgraphNode> {
    let node = SubgraphNode {
        id: id.into(),
        agent_ref: el.attr_or("agent_ref", "").into(),
        input_map: mappings(el, "input_map"),
        output_map: mappings(el, "output_map"),
    };
    let inputs = node
        .input_map
        .iter()
        .map(|m| (m.source.as_str(), format!("Input map of node `{id}`")));
    let outputs = node
        .output_map
        .iter()
        .map(|m| (m.target.as_str(), format!("Output map of node `{id}`")));
    let mut ok = true;
    for (field, site) in inputs.chain(outputs) {
        ok &= state_ref(field, &site, state, &[], el.line, report);
    }
    ok.then_some(node)
}

fn mappings(el: &Element, block: &str) -> Vec<FieldMapping> {
    el.child(block)
        .into_iter()
        .flat_map(|b| b.children_named("map"))
        .map(|m| FieldMapping {
            source: m.attr_or("source", "").into(),
            target: m.attr_or("target", "").into(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::scripts::KnownScripts;

    fn tool(id: &str, ty: &str) -> Element {
        Element::new("tool").with_attr("id", id).with_attr("type", ty)
    }

    fn node(id: &str, ty: &str) -> Element {
        Element::new("node").with_attr("id", id).with_attr("type", ty)
    }

    fn string_field(name: &str) -> StateField {
        StateField {
            name: name.into(),
            ty: FieldType::Simple(SimpleType::String),
            required: false,
            default: None,
            reducer: Reducer::Overwrite,
            expose: true,
            line: None,
        }
    }

    #[test]
    fn api_call_defaults() {
        let tools = Element::new("tools").with_child(
            tool("lookup", "api_call").with_child(
                Element::new("endpoint").with_attr("url", "https://api.example.com/x"),
            ),
        );
        let mut report = Report::new("t.ajml");
        let out = validate_tools(Some(&tools), &[], &KnownScripts::default(), &mut report);
        assert!(report.is_clean());
        let Tool::ApiCall(api) = &out[0] else {
            panic!("expected api_call");
        };
        assert_eq!(api.method, "GET");
        assert_eq!(api.max_retries, 0);
        assert_eq!(api.timeout, 30.0);
        assert_eq!(api.retry_status_codes, vec![429, 500, 502, 503, 504]);
        assert_eq!(api.backoff, Backoff::Exponential);
        assert_eq!(api.backoff_base, 1.0);
    }

    #[test]
    fn tool_rules() {
        let tools = Element::new("tools")
            .with_child(tool("__root__", "api_call"))
            .with_child(tool("t", "api_call"))
            .with_child(tool("t", "api_call"))
            .with_child(tool("u", "grpc"))
            .with_child(tool("v", "local_script").with_attr("path", "missing.py"))
            .with_child(tool("w", "script_tool").with_attr("src", "present.py"));
        let mut report = Report::new("t.ajml");
        let out = validate_tools(Some(&tools), &[], &KnownScripts::new(["present.py"]), &mut report);
        let codes: Vec<&str> = report.diagnostics.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["E104", "E102", "E106", "E308"]);
        let ids: Vec<&str> = out.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["t", "w"]);
    }

    #[test]
    fn node_rules() {
        let tools = vec![Tool::ScriptTool(ScriptTool {
            id: "score".into(),
            src: "score.py".into(),
            description: String::new(),
            parameters: vec![ScriptParam {
                name: "text".into(),
                ty: "string".into(),
                description: String::new(),
            }],
        })];
        let graph = Element::new("graph")
            .with_child(node("__END__", "llm"))
            .with_child(node("a", "llm"))
            .with_child(node("a", "llm"))
            .with_child(node("b", "router"))
            .with_child(node("c", "action").with_attr("tool_ref", "nope"))
            .with_child(node("d", "llm").with_child(Element::new("tool_bind").with_attr("ref", "nope")))
            .with_child(node("e", "script").with_attr("path", "gone.py"))
            .with_child(node("f", "action").with_attr("tool_ref", "score"));
        let mut report = Report::new("t.ajml");
        validate_nodes(&graph, &[], &tools, &KnownScripts::default(), &mut report);
        let codes: Vec<&str> = report.diagnostics.iter().map(|d| d.code()).collect();
        assert_eq!(codes, vec!["E104", "E101", "E105", "E307", "E307", "E308", "E316"]);
    }

    #[test]
    fn action_params_in_state_pass() {
        let tools = vec![Tool::ScriptTool(ScriptTool {
            id: "score".into(),
            src: "score.py".into(),
            description: String::new(),
            parameters: vec![ScriptParam {
                name: "text".into(),
                ty: "string".into(),
                description: String::new(),
            }],
        })];
        let graph = Element::new("graph").with_child(node("f", "action").with_attr("tool_ref", "score"));
        let mut report = Report::new("t.ajml");
        let declared = validate_nodes(
            &graph,
            &[string_field("text")],
            &tools,
            &KnownScripts::default(),
            &mut report,
        );
        assert!(report.is_clean());
        assert_eq!(declared.nodes.len(), 1);
        assert!(declared.contains("f"));
    }
}
