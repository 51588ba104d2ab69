//! Python literal and type rendering shared by the emitters.

use std::fmt::Write as _;

use crate::ir::template::{self, Segment};
use crate::ir::{FieldType, ScalarType, SimpleType};

/// Double-quoted Python string literal.
pub fn py_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Python float literal; non-finite values collapse to `0.0`.
pub fn py_float(v: f64) -> String {
    if v.is_finite() {
        format!("{v:?}")
    } else {
        "0.0".to_string()
    }
}

/// Triple-quoted docstring body.
pub fn py_docstring(s: &str) -> String {
    let mut body = s.replace('\\', "\\\\").replace("\"\"\"", "\\\"\\\"\\\"");
    if body.ends_with('"') {
        body.pop();
        body.push_str("\\\"");
    }
    format!("\"\"\"{body}\"\"\"")
}

/// Annotation for a state field.
pub fn py_type(ty: &FieldType) -> &'static str {
    match ty {
        FieldType::Simple(SimpleType::String) | FieldType::Enum(_) => "str",
        FieldType::Simple(SimpleType::Int) => "int",
        FieldType::Simple(SimpleType::Float) => "float",
        FieldType::Simple(SimpleType::Bool) => "bool",
        FieldType::Simple(SimpleType::List) => "list",
        FieldType::Simple(SimpleType::Dict) | FieldType::Dict(ScalarType::Any) => "dict",
        FieldType::List(ScalarType::String) => "list[str]",
        FieldType::List(ScalarType::Int) => "list[int]",
        FieldType::List(ScalarType::Float) => "list[float]",
        FieldType::List(ScalarType::Dict | ScalarType::Any) => "list[dict]",
        FieldType::Dict(ScalarType::String) => "dict[str, str]",
        FieldType::Dict(ScalarType::Int) => "dict[str, int]",
        FieldType::Dict(ScalarType::Float | ScalarType::Dict) => "dict",
    }
}

/// Annotation for a tool parameter or output field written as a type name.
/// Unknown names fall back to `str`.
pub fn py_type_name(name: &str) -> &'static str {
    FieldType::parse(name).as_ref().map(py_type).unwrap_or("str")
}

/// `lookup_user` → `LookupUser`
pub fn pascal_case(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect()
}

/// Dotted module path for a script under `tools/`: `net/fetch.py` → `tools.net.fetch`.
pub fn script_module(path: &str) -> String {
    let stem = path.strip_suffix(".py").unwrap_or(path);
    format!("tools.{}", stem.replace('/', "."))
}

/// Render a `${...}` template as a Python expression. `field` renders one
/// `${name}` placeholder; `${env:VAR}` reads the process environment. Text
/// without placeholders comes back as a plain string literal.
pub fn py_template(text: &str, field: impl Fn(&str) -> String) -> String {
    let segs = template::segments(text).unwrap_or_else(|_| vec![Segment::Text(text)]);
    if segs.iter().all(|s| matches!(s, Segment::Text(_))) {
        return py_str(text);
    }
    let mut body = String::new();
    for seg in segs {
        match seg {
            Segment::Text(t) => escape_fstring_text(t, &mut body),
            Segment::Field(name) => {
                let _ = write!(body, "{{{}}}", field(name));
            }
            Segment::Env(var) => {
                let _ = write!(body, "{{os.getenv('{var}', '')}}");
            }
        }
    }
    format!("f\"{body}\"")
}

fn escape_fstring_text(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literals_escape_quotes() {
        assert_eq!(py_str("say \"hi\"\n"), "\"say \\\"hi\\\"\\n\"");
    }

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(py_float(30.0), "30.0");
        assert_eq!(py_float(1.5), "1.5");
        assert_eq!(py_float(f64::NAN), "0.0");
    }

    #[test]
    fn template_with_fields_becomes_fstring() {
        let out = py_template("Topic: {x} ${topic} \"q\"", |f| format!("state.get('{f}', '')"));
        assert_eq!(out, "f\"Topic: {{x}} {state.get('topic', '')} \\\"q\\\"\"");
    }

    #[test]
    fn template_with_env_reads_environment() {
        let out = py_template("Bearer ${env:TOKEN}", |f| f.to_string());
        assert_eq!(out, "f\"Bearer {os.getenv('TOKEN', '')}\"");
    }

    #[test]
    fn plain_template_is_plain_string() {
        assert_eq!(py_template("no braces {here}", |f| f.to_string()), "\"no braces {here}\"");
    }

    #[test]
    fn type_names_map_to_python() {
        assert_eq!(py_type_name("list[string]"), "list[str]");
        assert_eq!(py_type_name("dict[int]"), "dict[str, int]");
        assert_eq!(py_type_name("enum"), "str");
        assert_eq!(py_type_name("mystery"), "str");
    }

    #[test]
    fn names_and_modules() {
        assert_eq!(pascal_case("lookup_user"), "LookupUser");
        assert_eq!(pascal_case("fetchURL"), "Fetchurl");
        assert_eq!(script_module("net/fetch.py"), "tools.net.fetch");
    }
}
