//! Tool wrappers: HTTP calls with retry, and delegates to scripts under `tools/`.

use super::literals::{pascal_case, py_docstring, py_float, py_str, py_template, py_type_name, script_module};
use super::writer::CodeWriter;
use crate::ir::{ApiCallTool, Backoff, LocalScriptTool, ParamLocation, ScriptTool, Tool};

/// Module-level logger and error type used by every API tool.
pub fn emit_api_support(w: &mut CodeWriter) {
    w.line("logger = logging.getLogger(__name__)");
    w.gap();
    w.block_open("class ToolExecutionError(Exception)");
    w.line("pass");
    w.block_close();
}

pub fn emit_tool(tool: &Tool, w: &mut CodeWriter) {
    match tool {
        Tool::ApiCall(t) => emit_api_tool(t, w),
        Tool::LocalScript(t) => emit_local_script_tool(t, w),
        Tool::ScriptTool(t) => emit_script_tool(t, w),
    }
}

/// `(name, type, description)` of one input-model field.
type ParamSpec<'a> = (&'a str, &'a str, &'a str);

fn emit_input_model(class: &str, params: &[ParamSpec<'_>], w: &mut CodeWriter) {
    w.block_open(&format!("class {class}(BaseModel)"));
    if params.is_empty() {
        w.line("pass");
    }
    for (name, ty, description) in params {
        let ty = py_type_name(ty);
        if description.is_empty() {
            w.line(&format!("{name}: {ty}"));
        } else {
            w.line(&format!("{name}: {ty} = Field(description={})", py_str(description)));
        }
    }
    w.block_close();
}

fn signature(params: &[ParamSpec<'_>]) -> String {
    params
        .iter()
        .map(|(name, ty, _)| format!("{name}: {}", py_type_name(ty)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Python tuple literal of status codes; one code keeps its trailing comma.
fn status_tuple(codes: &[u16]) -> String {
    let codes: Vec<String> = codes.iter().map(u16::to_string).collect();
    if codes.len() == 1 {
        format!("({},)", codes[0])
    } else {
        format!("({})", codes.join(", "))
    }
}

/// Timeouts always retry; status errors only for the configured codes.
fn retry_predicate(codes: &[u16]) -> String {
    let timeout = "isinstance(e, httpx.TimeoutException)";
    if codes.is_empty() {
        return format!("lambda e: {timeout}");
    }
    format!(
        "lambda e: {timeout} or (isinstance(e, httpx.HTTPStatusError) and e.response.status_code in {})",
        status_tuple(codes)
    )
}

fn emit_api_tool(tool: &ApiCallTool, w: &mut CodeWriter) {
    let class = format!("{}Input", pascal_case(&tool.id));
    let params: Vec<ParamSpec<'_>> = tool
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.ty.as_str(), p.description.as_str()))
        .collect();
    emit_input_model(&class, &params, w);
    w.gap();

    w.line(&format!("@tool({}, args_schema={class})", py_str(&tool.id)));
    if tool.max_retries > 0 {
        let base = py_float(tool.backoff_base);
        let wait = match tool.backoff {
            Backoff::Exponential => format!("wait_exponential(multiplier={base}, min={base}, max=60.0)"),
            Backoff::Fixed => format!("wait_fixed({base})"),
        };
        w.bracketed(
            "@retry(",
            [
                format!("stop=stop_after_attempt({}),", tool.max_retries + 1),
                format!("wait={wait},"),
                format!("retry=retry_if_exception({}),", retry_predicate(&tool.retry_status_codes)),
            ],
            ")",
        );
    }
    w.block_open(&format!("def {}({}) -> dict", tool.id, signature(&params)));
    let description = if tool.description.is_empty() {
        format!("Calls the {} API.", tool.id)
    } else {
        tool.description.clone()
    };
    w.line(&py_docstring(&description));

    // URL placeholders name the API side of a path parameter.
    let url = py_template(&tool.url, |placeholder| {
        tool.parameters
            .iter()
            .find(|p| p.location == ParamLocation::Path && p.map_to == placeholder)
            .map(|p| p.name.clone())
            .unwrap_or_else(|| placeholder.to_string())
    });
    w.line(&format!("url = {url}"));

    let mut call_args = vec![py_str(&tool.method), "url".to_string()];
    if !tool.headers.is_empty() {
        w.bracketed(
            "headers = {",
            tool.headers
                .iter()
                .map(|h| format!("{}: {},", py_str(&h.name), py_template(&h.value, str::to_string))),
            "}",
        );
        call_args.push("headers=headers".into());
    }

    let query: Vec<String> = tool
        .parameters
        .iter()
        .filter(|p| p.location == ParamLocation::Query)
        .map(|p| format!("{}: {},", py_str(&p.map_to), p.name))
        .collect();
    if !query.is_empty() {
        w.bracketed("params = {", query, "}");
        call_args.push("params=params".into());
    }

    let mut body: Vec<String> = Vec::new();
    if let Some(request_body) = &tool.body {
        for field in &request_body.fields {
            let value = if tool.parameters.iter().any(|p| p.name == field.from_state) {
                field.from_state.as_str()
            } else {
                "None"
            };
            body.push(format!("{}: {value},", py_str(&field.name)));
        }
    }
    body.extend(
        tool.parameters
            .iter()
            .filter(|p| p.location == ParamLocation::Body)
            .map(|p| format!("{}: {},", py_str(&p.map_to), p.name)),
    );
    if !body.is_empty() {
        w.bracketed("json_body = {", body, "}");
        call_args.push("json=json_body".into());
    }
    call_args.push(format!("timeout={}", py_float(tool.timeout)));
    w.line(&format!("response = httpx.request({})", call_args.join(", ")));
    w.blank();

    if tool.max_retries > 0 && !tool.retry_status_codes.is_empty() {
        w.line("# Raise for retryable status codes");
        w.block_open(&format!(
            "if response.status_code in {}",
            status_tuple(&tool.retry_status_codes)
        ));
        w.line("response.raise_for_status()");
        w.block_close();
    }
    w.line("# Raise for other non-2xx codes");
    w.line("response.raise_for_status()");
    w.blank();

    w.line("content_type = response.headers.get(\"content-type\", \"\")");
    w.block_open("if \"application/json\" not in content_type");
    w.bracketed(
        "raise ToolExecutionError(",
        [
            "f\"Expected JSON response, got {content_type}: \"",
            "f\"{response.text[:200]}\"",
        ],
        ")",
    );
    w.block_close();
    w.blank();
    w.line("data = response.json()");

    if tool.returns.is_empty() {
        w.line("return data");
        w.block_close();
        return;
    }

    w.blank();
    w.line("# Map response fields to state");
    for mapping in &tool.returns {
        let parts: Vec<&str> = mapping.api_field.split('.').collect();
        let mut access = String::from("data");
        for (i, part) in parts.iter().enumerate() {
            if i + 1 < parts.len() {
                access.push_str(&format!(".get({}, {{}})", py_str(part)));
            } else {
                access.push_str(&format!(".get({})", py_str(part)));
            }
        }
        let var = &mapping.state_field;
        w.line(&format!("{var} = {access}"));
        w.block_open(&format!("if {var} is None"));
        w.line(&format!(
            "logger.warning({})",
            py_str(&format!(
                "{}: API field '{}' not found in response",
                tool.id, mapping.api_field
            ))
        ));
        w.block_close();
    }
    w.blank();
    let entries: Vec<String> = tool
        .returns
        .iter()
        .map(|r| format!("{}: {}", py_str(&r.state_field), r.state_field))
        .collect();
    w.line(&format!("return {{{}}}", entries.join(", ")));
    w.block_close();
}

fn emit_module_handle(id: &str, path: &str, w: &mut CodeWriter) {
    w.line(&format!(
        "_{id}_module = importlib.import_module({})",
        py_str(&script_module(path))
    ));
}

fn emit_local_script_tool(tool: &LocalScriptTool, w: &mut CodeWriter) {
    let class = format!("{}Input", pascal_case(&tool.id));
    w.line(&format!("# Tool: {} (local_script: {})", tool.id, tool.path));
    emit_module_handle(&tool.id, &tool.path, w);
    w.gap();

    w.block_open(&format!("class {class}(BaseModel)"));
    w.line("model_config = {\"extra\": \"allow\"}");
    w.block_close();
    w.gap();

    w.line(&format!("@tool({}, args_schema={class})", py_str(&tool.id)));
    w.block_open(&format!("def {}(**kwargs) -> dict", tool.id));
    let description = if tool.description.is_empty() {
        format!("Runs {}", tool.path)
    } else {
        tool.description.clone()
    };
    w.line(&py_docstring(&description));
    w.line(&format!("return _{}_module.run(**kwargs)", tool.id));
    w.block_close();
}

fn emit_script_tool(tool: &ScriptTool, w: &mut CodeWriter) {
    let class = format!("{}Input", pascal_case(&tool.id));
    let params: Vec<ParamSpec<'_>> = tool
        .parameters
        .iter()
        .map(|p| (p.name.as_str(), p.ty.as_str(), p.description.as_str()))
        .collect();

    w.line(&format!("# Tool: {} (script_tool: {})", tool.id, tool.src));
    emit_module_handle(&tool.id, &tool.src, w);
    w.gap();

    emit_input_model(&class, &params, w);
    w.gap();

    w.line(&format!("@tool({}, args_schema={class})", py_str(&tool.id)));
    w.block_open(&format!("def {}({}) -> dict", tool.id, signature(&params)));
    let description = if tool.description.is_empty() {
        format!("Runs {}", tool.src)
    } else {
        tool.description.clone()
    };
    w.line(&py_docstring(&description));
    let kwargs: Vec<String> = params.iter().map(|(name, _, _)| format!("{name}={name}")).collect();
    w.line(&format!("return _{}_module.run({})", tool.id, kwargs.join(", ")));
    w.block_close();
}
