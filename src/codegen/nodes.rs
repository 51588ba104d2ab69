//! Node functions, one per declared node.

use super::literals::{pascal_case, py_str, py_template, py_type_name, script_module};
use super::writer::CodeWriter;
use crate::ir::{ActionNode, Agent, LlmNode, Node, ScriptNode, SubgraphNode};

pub fn emit_node(node: &Node, agent: &Agent, w: &mut CodeWriter) {
    match node {
        Node::Llm(n) => emit_llm_node(n, w),
        Node::Action(n) => emit_action_node(n, agent, w),
        Node::Script(n) => emit_script_node(n, w),
        Node::Subgraph(n) => emit_subgraph_node(n, w),
    }
}

fn state_lookup(field: &str) -> String {
    format!("state.get('{field}', '')")
}

/// `system_content = ...`, one f-string per prompt line.
fn emit_system_prompt(prompt: &str, w: &mut CodeWriter) {
    let lines: Vec<&str> = prompt.split('\n').collect();
    if lines.len() <= 1 {
        w.line(&format!("system_content = {}", py_template(prompt, state_lookup)));
        return;
    }
    w.line("system_content = (");
    w.indent();
    for (i, line) in lines.iter().enumerate() {
        let text = if i + 1 < lines.len() {
            format!("{line}\n")
        } else {
            line.to_string()
        };
        w.line(&py_template(&text, state_lookup));
    }
    w.dedent();
    w.line(")");
}

fn emit_filtered_updates(w: &mut CodeWriter) {
    w.line("# Filter to known state fields only");
    w.line("updates = {}");
    w.block_open("for key, value in result.items()");
    w.block_open("if key in AgentState.__annotations__");
    w.line("updates[key] = value");
    w.block_close();
    w.block_close();
    w.line("return updates");
}

fn emit_llm_node(node: &LlmNode, w: &mut CodeWriter) {
    let structured = !node.output_schema.is_empty() && node.tool_binds.is_empty();
    let schema_class = format!("{}Output", pascal_case(&node.id));

    if structured {
        w.block_open(&format!("class {schema_class}(BaseModel)"));
        for field in &node.output_schema {
            let ty = if field.ty == "enum" && !field.values.is_empty() {
                let values: Vec<String> = field.values.iter().map(|v| py_str(v)).collect();
                format!("Literal[{}]", values.join(", "))
            } else {
                py_type_name(&field.ty).to_string()
            };
            if field.description.is_empty() {
                w.line(&format!("{}: {ty}", field.name));
            } else {
                w.line(&format!(
                    "{}: {ty} = Field(description={})",
                    field.name,
                    py_str(&field.description)
                ));
            }
        }
        w.block_close();
        w.gap();
    }

    w.block_open(&format!("def {}(state: AgentState)", node.id));
    emit_system_prompt(&node.system_prompt, w);
    w.line("messages = [SystemMessage(content=system_content)] + state[\"messages\"]");
    w.blank();

    let tools = node.tool_binds.join(", ");
    if structured {
        w.line(&format!("structured_llm = llm.with_structured_output({schema_class})"));
        w.line("result = structured_llm.invoke(messages)");
        w.blank();
        w.line("updates = {}");
        w.line("result_dict = result.model_dump()");
        w.block_open("for key, value in result_dict.items()");
        w.block_open("if key in AgentState.__annotations__");
        w.line("updates[key] = value");
        w.block_close();
        w.block_close();
        w.blank();
        w.line("updates[\"messages\"] = [AIMessage(content=str(result_dict))]");
        w.line("return updates");
    } else if !node.tool_binds.is_empty() {
        w.line(&format!("bound_llm = llm.bind_tools([{tools}])"));
        w.line("response = bound_llm.invoke(messages)");
        w.blank();
        w.line("return {\"messages\": [response]}");
    } else {
        w.line("response = llm.invoke(messages)");
        w.blank();
        w.line("return {\"messages\": [response]}");
    }
    w.block_close();

    if !node.tool_binds.is_empty() {
        w.gap();
        w.bracketed(
            &format!("{}_tools = ToolNode(", node.id),
            [format!("[{tools}],"), "handle_tool_errors=True,".to_string()],
            ")",
        );
    }
}

fn emit_action_node(node: &ActionNode, agent: &Agent, w: &mut CodeWriter) {
    let params = agent
        .tool(&node.tool_ref)
        .map(|t| t.param_names())
        .unwrap_or_default();
    let args: Vec<String> = params
        .iter()
        .map(|p| format!("{}: state.get({})", py_str(p), py_str(p)))
        .collect();

    w.block_open(&format!("def {}(state: AgentState)", node.id));
    w.line(&format!("result = {}.invoke({{{}}})", node.tool_ref, args.join(", ")));
    emit_filtered_updates(w);
    w.block_close();
}

fn emit_script_node(node: &ScriptNode, w: &mut CodeWriter) {
    w.line(&format!("# Script node: {} ({})", node.id, node.path));
    w.line(&format!(
        "_{}_module = importlib.import_module({})",
        node.id,
        py_str(&script_module(&node.path))
    ));
    w.gap();
    w.block_open(&format!("def {}(state: AgentState)", node.id));
    w.line(&format!("result = _{}_module.run(dict(state))", node.id));
    emit_filtered_updates(w);
    w.block_close();
}

fn emit_subgraph_node(node: &SubgraphNode, w: &mut CodeWriter) {
    w.block_open(&format!("def {}(state: AgentState)", node.id));
    w.bracketed(
        "child_input = {",
        std::iter::once("\"messages\": state[\"messages\"],".to_string()).chain(
            node.input_map
                .iter()
                .map(|m| format!("{}: state.get({}),", py_str(&m.target), py_str(&m.source))),
        ),
        "}",
    );
    w.line(&format!("child_result = {}_graph.invoke(child_input)", node.agent_ref));
    w.blank();
    w.line("updates = {}");
    for mapping in &node.output_map {
        w.line(&format!(
            "updates[{}] = child_result.get({})",
            py_str(&mapping.target),
            py_str(&mapping.source)
        ));
    }
    w.line("return updates");
    w.block_close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldMapping, OutputField};

    fn render(node: &Node) -> String {
        let agent = Agent {
            name: "t".into(),
            version: "1.0".into(),
            description: String::new(),
            llm: None,
            state: vec![],
            tools: vec![],
            nodes: vec![],
            edges: vec![],
            file: "t.ajml".into(),
        };
        let mut w = CodeWriter::new();
        emit_node(node, &agent, &mut w);
        w.finish()
    }

    fn llm(prompt: &str) -> LlmNode {
        LlmNode {
            id: "writer".into(),
            system_prompt: prompt.into(),
            output_schema: vec![],
            tool_binds: vec![],
        }
    }

    #[test]
    fn plain_llm_node() {
        let out = render(&Node::Llm(llm("Write about ${topic}.")));
        assert_eq!(
            out,
            "def writer(state: AgentState):\n\
             \x20   system_content = f\"Write about {state.get('topic', '')}.\"\n\
             \x20   messages = [SystemMessage(content=system_content)] + state[\"messages\"]\n\
             \n\
             \x20   response = llm.invoke(messages)\n\
             \n\
             \x20   return {\"messages\": [response]}\n"
        );
    }

    #[test]
    fn multiline_prompt_splits_per_line() {
        let out = render(&Node::Llm(llm("You are terse.\nTopic: ${topic}")));
        assert!(out.contains(
            "    system_content = (\n\
             \x20       \"You are terse.\\n\"\n\
             \x20       f\"Topic: {state.get('topic', '')}\"\n\
             \x20   )\n"
        ));
    }

    #[test]
    fn structured_output_uses_literal_for_enums() {
        let mut node = llm("Classify.");
        node.id = "classify_ticket".into();
        node.output_schema = vec![
            OutputField {
                name: "category".into(),
                ty: "enum".into(),
                description: "Ticket category".into(),
                values: vec!["bug".into(), "feature".into()],
            },
            OutputField {
                name: "confidence".into(),
                ty: "float".into(),
                description: String::new(),
                values: vec![],
            },
        ];
        let out = render(&Node::Llm(node));
        assert!(out.starts_with(
            "class ClassifyTicketOutput(BaseModel):\n\
             \x20   category: Literal[\"bug\", \"feature\"] = Field(description=\"Ticket category\")\n\
             \x20   confidence: float\n"
        ));
        assert!(out.contains("structured_llm = llm.with_structured_output(ClassifyTicketOutput)"));
        assert!(out.contains("updates[\"messages\"] = [AIMessage(content=str(result_dict))]"));
    }

    #[test]
    fn tool_bound_llm_gets_tool_node() {
        let mut node = llm("Research.");
        node.tool_binds = vec!["search".into(), "fetch".into()];
        let out = render(&Node::Llm(node));
        assert!(out.contains("    bound_llm = llm.bind_tools([search, fetch])\n"));
        assert!(out.ends_with(
            "writer_tools = ToolNode(\n    [search, fetch],\n    handle_tool_errors=True,\n)\n"
        ));
    }

    #[test]
    fn script_node_runs_module_and_filters() {
        let out = render(&Node::Script(ScriptNode {
            id: "clean".into(),
            path: "clean.py".into(),
        }));
        assert!(out.contains("_clean_module = importlib.import_module(\"tools.clean\")\n"));
        assert!(out.contains("    result = _clean_module.run(dict(state))\n"));
        assert!(out.contains("        if key in AgentState.__annotations__:\n"));
    }

    #[test]
    fn subgraph_node_maps_both_ways() {
        let out = render(&Node::Subgraph(SubgraphNode {
            id: "research".into(),
            agent_ref: "researcher".into(),
            input_map: vec![FieldMapping {
                source: "subject".into(),
                target: "topic".into(),
            }],
            output_map: vec![FieldMapping {
                source: "summary".into(),
                target: "notes".into(),
            }],
        }));
        assert!(out.contains("        \"topic\": state.get(\"subject\"),\n"));
        assert!(out.contains("    child_result = researcher_graph.invoke(child_input)\n"));
        assert!(out.contains("    updates[\"notes\"] = child_result.get(\"summary\")\n"));
    }
}
