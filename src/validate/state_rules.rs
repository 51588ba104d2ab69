//! State field rules: reserved names, uniqueness, type catalogue, reducers,
//! enum value sets, required/default exclusivity.

use std::collections::HashSet;

use crate::error::DiagnosticKind;
use crate::ir::{FieldType, MESSAGES_FIELD, Reducer, StateField, is_python_name, is_reserved};
use crate::parse::Element;

use super::{Report, required_attr, split_list};

/// Validate every `<field>` of the state block, in declaration order.
pub fn validate_state(state: &Element, report: &mut Report<'_>) -> Vec<StateField> {
    let mut seen = HashSet::new();
    state
        .children_named("field")
        .filter_map(|el| validate_field(el, &mut seen, report))
        .collect()
}

fn validate_field(
    el: &Element,
    seen: &mut HashSet<String>,
    report: &mut Report<'_>,
) -> Option<StateField> {
    let name = required_attr(el, "name", report)?;

    if name == MESSAGES_FIELD {
        report.push(DiagnosticKind::MessagesField, el.line);
        return None;
    }
    if is_reserved(name) {
        report.push(
            DiagnosticKind::ReservedWord {
                word: name.into(),
                role: "field name".into(),
            },
            el.line,
        );
        return None;
    }
    if !is_python_name(name) {
        report.push(
            DiagnosticKind::InvalidIdentifier {
                name: name.into(),
                role: "field name".into(),
            },
            el.line,
        );
        return None;
    }
    if !seen.insert(name.to_string()) {
        report.push(DiagnosticKind::DuplicateField { name: name.into() }, el.line);
        return None;
    }

    let type_str = el.attr_or("type", "");
    let Some(mut ty) = FieldType::parse(type_str) else {
        report.push(
            DiagnosticKind::InvalidFieldType {
                field: name.into(),
                found: type_str.into(),
            },
            el.line,
        );
        return None;
    };

    let required = el.flag("required", false);
    let default = el.attr("default").map(String::from);
    if required && default.is_some() {
        report.push(
            DiagnosticKind::RequiredWithDefault { field: name.into() },
            el.line,
        );
        return None;
    }

    // An illegal reducer is always an error; it never falls back to overwrite.
    let reducer_str = el.attr_or("reducer", "overwrite");
    let base = ty.base();
    let reducer = match Reducer::parse(reducer_str) {
        Some(r) if base.allowed_reducers().contains(&r) => r,
        _ => {
            report.push(
                DiagnosticKind::InvalidReducer {
                    field: name.into(),
                    reducer: reducer_str.into(),
                    ty: type_str.into(),
                    allowed: base.allowed_list(),
                },
                el.line,
            );
            return None;
        }
    };

    if let FieldType::Enum(values) = &mut ty {
        *values = split_list(el.attr_or("values", ""));
        if values.is_empty() {
            report.push(
                DiagnosticKind::EnumWithoutValues { field: name.into() },
                el.line,
            );
            return None;
        }
        // An empty default means "unset" and is always allowed.
        if let Some(d) = default.as_deref().filter(|d| !d.is_empty()) {
            if !values.iter().any(|v| v == d) {
                report.push(
                    DiagnosticKind::EnumDefault {
                        field: name.into(),
                        default: d.into(),
                        values: values.join(", "),
                    },
                    el.line,
                );
                return None;
            }
        }
    }

    Some(StateField {
        name: name.to_string(),
        ty,
        required,
        default,
        reducer,
        expose: el.flag("expose", true),
        line: el.line,
    })
}
