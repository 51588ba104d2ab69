//! WASM entry points for browser use.
//!
//! Script existence cannot be probed from the browser, so callers pass the
//! list of files under `tools/` as a JSON array of relative paths.

use wasm_bindgen::prelude::*;

use crate::error::{Diagnostic, DiagnosticKind};
use crate::{CompileOptions, KnownScripts, ProjectSources, SourceFile};

/// Validate one agent document on its own.
/// Returns a JSON array of diagnostics; empty means valid. Advisories are
/// included with `severity: "warning"`.
#[wasm_bindgen]
pub fn validate_agent_document(text: &str, path: &str, scripts_json: &str) -> JsValue {
    let result = validate_agent_document_inner(text, path, scripts_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn validate_agent_document_inner(text: &str, path: &str, scripts_json: &str) -> Vec<DiagnosticDto> {
    let scripts = match known_scripts(scripts_json) {
        Ok(s) => s,
        Err(d) => return vec![DiagnosticDto::from(d)],
    };
    match crate::check_agent(&SourceFile::new(path, text), &scripts) {
        Ok(validated) => validated.warnings.into_iter().map(DiagnosticDto::from).collect(),
        Err(errors) => errors.into_iter().map(DiagnosticDto::from).collect(),
    }
}

/// Full pipeline over a project: `{ project: {path, text}, agents: [...] }`.
/// Returns a JSON object with either `files` (success) or `errors` (failure).
#[wasm_bindgen]
pub fn compile_project_documents(sources_json: &str, options_json: &str, scripts_json: &str) -> JsValue {
    let result = compile_project_documents_inner(sources_json, options_json, scripts_json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn compile_project_documents_inner(
    sources_json: &str,
    options_json: &str,
    scripts_json: &str,
) -> CompileResult {
    let sources = match serde_json::from_str::<ProjectSources>(sources_json) {
        Ok(s) => s,
        Err(e) => return CompileResult::errors(request_error("sources", &e)),
    };
    // An empty options string means the defaults.
    let options = if options_json.trim().is_empty() {
        CompileOptions::default()
    } else {
        match serde_json::from_str::<CompileOptions>(options_json) {
            Ok(o) => o,
            Err(e) => return CompileResult::errors(request_error("options", &e)),
        }
    };
    let scripts = match known_scripts(scripts_json) {
        Ok(s) => s,
        Err(d) => return CompileResult::errors(d),
    };

    match crate::compile_project(&sources, &options, &scripts) {
        Ok(compiled) => CompileResult::Success {
            files: compiled
                .files()
                .map(|f| FileDto {
                    path: f.path.clone(),
                    content: f.content.clone(),
                })
                .collect(),
            warnings: compiled.warnings().cloned().map(DiagnosticDto::from).collect(),
        },
        Err(errors) => CompileResult::Errors {
            errors: errors.into_iter().map(DiagnosticDto::from).collect(),
        },
    }
}

fn known_scripts(scripts_json: &str) -> Result<KnownScripts, Diagnostic> {
    if scripts_json.trim().is_empty() {
        return Ok(KnownScripts::default());
    }
    serde_json::from_str::<Vec<String>>(scripts_json)
        .map(KnownScripts::new)
        .map_err(|e| request_error("scripts", &e))
}

fn request_error(what: &str, e: &serde_json::Error) -> Diagnostic {
    Diagnostic::new(
        DiagnosticKind::MalformedDocument {
            reason: format!("invalid {what} JSON: {e}"),
        },
        "",
    )
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct DiagnosticDto {
    code: String,
    category: String,
    severity: String,
    message: String,
    file: String,
    line: Option<u32>,
}

impl From<Diagnostic> for DiagnosticDto {
    fn from(d: Diagnostic) -> Self {
        DiagnosticDto {
            code: d.code().to_string(),
            category: d.kind.category().to_string(),
            severity: if d.is_fatal() { "error" } else { "warning" }.to_string(),
            message: d.message(),
            file: d.file,
            line: d.line,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct FileDto {
    path: String,
    content: String,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status")]
enum CompileResult {
    #[serde(rename = "success")]
    Success {
        files: Vec<FileDto>,
        warnings: Vec<DiagnosticDto>,
    },
    #[serde(rename = "errors")]
    Errors { errors: Vec<DiagnosticDto> },
}

impl CompileResult {
    fn errors(d: Diagnostic) -> Self {
        CompileResult::Errors {
            errors: vec![DiagnosticDto::from(d)],
        }
    }
}
