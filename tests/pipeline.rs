mod helpers;

use ajml_compiler::ir::Provider;
use ajml_compiler::{
    CompileOptions, DiagnosticKind, KnownScripts, ProjectSources, SourceFile, compile_agent,
    compile_project, load_project,
};
use helpers::*;

const PROJECT: &str = include_str!("fixtures/briefing/_project.ajml");
const RESEARCH: &str = include_str!("fixtures/briefing/research.ajml");
const SUMMARISER: &str = include_str!("fixtures/briefing/summariser.ajml");

fn briefing() -> ProjectSources {
    ProjectSources {
        project: Some(SourceFile::new("agents/_project.ajml", PROJECT)),
        agents: vec![
            SourceFile::new("agents/research.ajml", RESEARCH),
            SourceFile::new("agents/summariser.ajml", SUMMARISER),
        ],
    }
}

fn briefing_scripts() -> KnownScripts {
    KnownScripts::new(["cite.py"])
}

fn research_module() -> String {
    let compiled = compile_project(&briefing(), &CompileOptions::default(), &briefing_scripts())
        .unwrap_or_else(|e| panic!("briefing should compile: {e:?}"));
    compiled.agents[0].files[0].content.clone()
}

// =============================================================================
// Whole project
// =============================================================================

#[test]
fn briefing_project_compiles_cleanly() {
    let compiled = compile_project(&briefing(), &CompileOptions::default(), &briefing_scripts())
        .unwrap_or_else(|e| panic!("briefing should compile: {e:?}"));

    let paths: Vec<&str> = compiled.files().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["compiled_research.py", "compiled_summariser.py"]);
    assert_eq!(compiled.warnings().count(), 0);

    assert_eq!(compiled.project.name, "briefing");
    assert_eq!(compiled.project.server.port, 8080);
    assert_eq!(compiled.project.server.auth_env.as_deref(), Some("BRIEFING_TOKEN"));
    assert!(!compiled.project.server.docs_public);
    assert_eq!(compiled.project.env_vars.len(), 3);
    assert_eq!(compiled.project.env_vars[2].default.as_deref(), Some("info"));

    let research = &compiled.agents[0].agent;
    assert_eq!(research.version, "1.2");
    assert_eq!(research.nodes.len(), 5);
    assert_eq!(research.edges.len(), 7);
}

#[test]
fn missing_cite_script_stops_the_project() {
    let errors = compile_project(&briefing(), &CompileOptions::default(), &KnownScripts::default())
        .unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code(), "E308");
    assert_eq!(errors[0].file, "agents/research.ajml");
}

#[test]
fn agent_llm_overrides_project_default() {
    let py = research_module();
    assert!(py.contains("from langchain_anthropic import ChatAnthropic\n"));
    assert!(py.contains("llm = ChatAnthropic(model=\"claude-3-5-sonnet-latest\", max_retries=3)\n"));
    assert!(!py.contains("ChatOpenAI"));

    let compiled = compile_project(&briefing(), &CompileOptions::default(), &briefing_scripts())
        .unwrap_or_else(|e| panic!("{e:?}"));
    let summariser = &compiled.agents[1].files[0].content;
    assert!(summariser.contains("llm = ChatOpenAI(model=\"gpt-4o-mini\", max_retries=2)\n"));
}

#[test]
fn state_class_carries_reducers() {
    let py = research_module();
    assert!(py.contains(
        "class AgentState(TypedDict):\n\
         \x20   messages: Annotated[list, add_messages]\n\
         \x20   topic: str\n\
         \x20   sources: Annotated[list[dict], operator.add]\n\
         \x20   summaries: Annotated[list[str], operator.add]\n"
    ));
    assert!(py.contains("import operator\n"));
}

#[test]
fn api_tool_resolves_env_and_query_params() {
    let py = research_module();
    assert!(py.contains("@tool(\"search_web\", args_schema=SearchWebInput)\n"));
    assert!(py.contains("    stop=stop_after_attempt(3),\n"));
    assert!(py.contains("    wait=wait_exponential(multiplier=0.5, min=0.5, max=60.0),\n"));
    assert!(py.contains("    url = f\"https://{os.getenv('SEARCH_HOST', '')}/v1/search\"\n"));
    assert!(py.contains(
        "        \"Authorization\": f\"Bearer {os.getenv('SEARCH_API_KEY', '')}\",\n"
    ));
    assert!(py.contains("        \"q\": topic,\n"));
    assert!(py.contains(
        "    response = httpx.request(\"GET\", url, headers=headers, params=params, timeout=15.0)\n"
    ));
    assert!(py.contains("    if response.status_code in (429, 503):\n"));
    assert!(py.contains(
        "    retry=retry_if_exception(lambda e: isinstance(e, httpx.TimeoutException) or \
         (isinstance(e, httpx.HTTPStatusError) and e.response.status_code in (429, 503))),\n"
    ));
    assert!(py.contains(
        "from tenacity import retry, retry_if_exception, stop_after_attempt, wait_exponential\n"
    ));
    assert!(py.contains("    sources = data.get(\"data\", {}).get(\"results\")\n"));
}

#[test]
fn fan_out_sends_each_source() {
    let py = research_module();
    assert!(py.contains("def route_gather(state: AgentState):\n"));
    assert!(py.contains("        Send(\"digest\", {**state, \"source\": item})\n"));
    assert!(py.contains("graph_builder.add_conditional_edges(\"gather\", route_gather, [\"digest\"])\n"));
    assert!(py.contains("from langgraph.constants import Send\n"));
}

#[test]
fn review_routes_on_its_structured_output() {
    let py = research_module();
    assert!(py.contains("class ReviewOutput(BaseModel):\n"));
    assert!(py.contains("    verdict: Literal[\"publish\", \"revise\"]\n"));
    assert!(py.contains(
        "    system_content = f\"Grade the draft for {state.get('topic', '')}. Reply with a score & a verdict.\"\n"
    ));
    assert!(py.contains(
        "def route_review(state: AgentState):\n\
         \x20   if state.get('verdict') == 'publish' and state.get('score', 0) >= 0.8:\n\
         \x20       return \"condense\"\n\
         \x20   return \"write\"\n"
    ));
    assert!(py.contains("graph_builder.add_conditional_edges(\"review\", route_review)\n"));
}

#[test]
fn tool_bound_writer_loops_through_its_tools() {
    let py = research_module();
    assert!(py.contains("import importlib\n"));
    assert!(py.contains("    bound_llm = llm.bind_tools([cite])\n"));
    assert!(py.contains("write_tools = ToolNode(\n    [cite],\n    handle_tool_errors=True,\n)\n"));
    assert!(py.contains("def route_write_tool_calls(state: AgentState):\n"));
    assert!(py.contains(
        "graph_builder.add_conditional_edges(\"write\", route_write_tool_calls, [\"write_tools\", \"review\"])\n"
    ));
    assert!(py.contains("graph_builder.add_edge(\"write_tools\", \"write\")\n"));
    assert!(!py.contains("graph_builder.add_edge(\"write\", \"review\")"));
}

#[test]
fn subgraph_imports_the_sibling_module() {
    let py = research_module();
    assert!(py.contains("from compiled_summariser import graph as summariser_graph\n"));
    assert!(py.contains("        \"text\": state.get(\"draft\"),\n"));
    assert!(py.contains("    updates[\"brief\"] = child_result.get(\"summary\")\n"));
    assert!(py.contains("graph_builder.add_edge(\"condense\", END)\n"));
}

// =============================================================================
// Single agents
// =============================================================================

#[test]
fn minimal_agent_is_one_function_and_no_router() {
    let doc = minimal_agent("helper");
    assert!(warnings(&doc).is_empty());

    let py = python(&doc);
    assert_eq!(py.matches("\ndef ").count(), 1);
    assert!(!py.contains("def route_"));
    insta::assert_snapshot!(py, @r#"
    from typing import Annotated, TypedDict

    from langchain_core.messages import AIMessage, SystemMessage
    from langchain_openai import ChatOpenAI
    from langgraph.graph import END, START, StateGraph
    from langgraph.graph.message import add_messages


    class AgentState(TypedDict):
        messages: Annotated[list, add_messages]
        question: str


    llm = ChatOpenAI(model="gpt-4o", max_retries=2)


    def answer(state: AgentState):
        system_content = f"Answer the question: {state.get('question', '')}"
        messages = [SystemMessage(content=system_content)] + state["messages"]

        response = llm.invoke(messages)

        return {"messages": [response]}


    graph_builder = StateGraph(AgentState)

    # Add all nodes
    graph_builder.add_node("answer", answer)

    # Add edges
    graph_builder.add_edge(START, "answer")
    graph_builder.add_edge("answer", END)

    # Compile
    graph = graph_builder.compile()
    "#);
}

#[test]
fn compile_agent_without_project_sources() {
    let project = load_project(&SourceFile::new("agents/_project.ajml", PROJECT_DOC))
        .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(project.llm.provider, Some(Provider::Openai));

    let compiled = compile_agent(
        &minimal_agent("solo").source(),
        &project,
        &CompileOptions::default(),
        &KnownScripts::default(),
    )
    .unwrap_or_else(|e| panic!("{e:?}"));
    assert_eq!(compiled.files[0].path, "compiled_solo.py");
    assert_eq!(compiled.agent.name, "solo");
}

#[test]
fn parallel_branches_warn_once_per_overwrite_field() {
    let doc = AgentDoc::new("fork")
        .field(field("result", "string"))
        .field(r#"<field name="notes" type="list[string]" reducer="append"/>"#)
        .graph(llm_node("split", "Plan the work."))
        .graph(llm_node("a", "Do part one."))
        .graph(llm_node("b", "Do part two."))
        .graph(llm_node("join", "Merge the parts."))
        .graph(edge("__START__", "split"))
        .graph(edge("split", "a"))
        .graph(edge("split", "b"))
        .graph(edge("a", "join"))
        .graph(edge("b", "join"))
        .graph(edge("join", "__END__"));

    let found = warnings(&doc);
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].kind,
        DiagnosticKind::ParallelWrite {
            node: "split".into(),
            field: "result".into(),
        }
    );
    assert!(!found[0].is_fatal());

    // Advisories still compile unless strict.
    let py = python(&doc);
    assert!(py.contains("graph_builder.add_edge(\"split\", \"a\")\n"));
    assert!(py.contains("graph_builder.add_edge(\"split\", \"b\")\n"));

    let strict = CompileOptions { strict: true };
    let errors = compile(&[&doc], strict).unwrap_err();
    let codes: Vec<&str> = errors.iter().map(|d| d.code()).collect();
    assert_eq!(codes, vec!["W301"]);
}

#[test]
fn read_dir_finds_project_and_agents() {
    let dir = std::env::temp_dir().join(format!("ajml-read-dir-{}", std::process::id()));
    let agents = dir.join("agents");
    std::fs::create_dir_all(&agents).unwrap();
    std::fs::write(agents.join("_project.ajml"), PROJECT).unwrap();
    std::fs::write(agents.join("summariser.ajml"), SUMMARISER).unwrap();
    std::fs::write(agents.join("research.ajml"), RESEARCH).unwrap();
    std::fs::write(agents.join("notes.txt"), "ignored").unwrap();

    let sources = ProjectSources::read_dir(&dir).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!(
        sources.project.as_ref().map(|p| p.path.as_str()),
        Some("agents/_project.ajml")
    );
    let paths: Vec<&str> = sources.agents.iter().map(|a| a.path.as_str()).collect();
    assert_eq!(paths, vec!["agents/research.ajml", "agents/summariser.ajml"]);

    assert!(compile_project(&sources, &CompileOptions::default(), &briefing_scripts()).is_ok());
}
