//! `AgentState` TypedDict and the chat model binding.

use super::imports::provider_import;
use super::literals::{py_str, py_type};
use super::writer::CodeWriter;
use crate::ir::{LlmConfig, Reducer, StateField};

pub fn emit_state(fields: &[StateField], w: &mut CodeWriter) {
    w.block_open("class AgentState(TypedDict)");
    w.line("messages: Annotated[list, add_messages]");
    for field in fields {
        let ty = py_type(&field.ty);
        let annotation = match field.reducer {
            Reducer::Overwrite => ty.to_string(),
            Reducer::Append | Reducer::Add => format!("Annotated[{ty}, operator.add]"),
            Reducer::Concat => format!("Annotated[{ty}, operator.concat]"),
            Reducer::Merge => format!("Annotated[{ty}, lambda a, b: {{**a, **b}}]"),
        };
        w.line(&format!("{}: {annotation}", field.name));
    }
    w.block_close();
}

pub fn emit_llm(llm: &LlmConfig, w: &mut CodeWriter) {
    match llm.provider {
        Some(provider) => {
            let (_, class) = provider_import(provider);
            w.line(&format!(
                "llm = {class}(model={}, max_retries={})",
                py_str(&llm.model),
                llm.max_retries
            ));
        }
        None => {
            w.line("# No LLM provider configured; set one in _project.ajml or bind llm here");
            w.line("llm = None");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{FieldType, Provider, ScalarType, SimpleType};

    fn field(name: &str, ty: FieldType, reducer: Reducer) -> StateField {
        StateField {
            name: name.into(),
            ty,
            required: false,
            default: None,
            reducer,
            expose: true,
            line: None,
        }
    }

    #[test]
    fn reducers_become_annotations() {
        let mut w = CodeWriter::new();
        emit_state(
            &[
                field("query", FieldType::Simple(SimpleType::String), Reducer::Overwrite),
                field("hits", FieldType::List(ScalarType::Dict), Reducer::Append),
                field("count", FieldType::Simple(SimpleType::Int), Reducer::Add),
                field("log", FieldType::Simple(SimpleType::String), Reducer::Concat),
                field("meta", FieldType::Dict(ScalarType::Any), Reducer::Merge),
            ],
            &mut w,
        );
        assert_eq!(
            w.finish(),
            "class AgentState(TypedDict):\n\
             \x20   messages: Annotated[list, add_messages]\n\
             \x20   query: str\n\
             \x20   hits: Annotated[list[dict], operator.add]\n\
             \x20   count: Annotated[int, operator.add]\n\
             \x20   log: Annotated[str, operator.concat]\n\
             \x20   meta: Annotated[dict, lambda a, b: {**a, **b}]\n"
        );
    }

    #[test]
    fn llm_binding_uses_provider_class() {
        let mut w = CodeWriter::new();
        emit_llm(
            &LlmConfig {
                provider: Some(Provider::Openai),
                model: "gpt-4o".into(),
                max_retries: 3,
            },
            &mut w,
        );
        assert_eq!(w.finish(), "llm = ChatOpenAI(model=\"gpt-4o\", max_retries=3)\n");
    }

    #[test]
    fn missing_provider_leaves_placeholder() {
        let mut w = CodeWriter::new();
        emit_llm(&LlmConfig::default(), &mut w);
        let out = w.finish();
        assert!(out.starts_with("# No LLM provider configured"));
        assert!(out.ends_with("llm = None\n"));
    }
}
