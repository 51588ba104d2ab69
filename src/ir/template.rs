//! `${...}` placeholder templates used by system prompts, endpoint URLs and
//! header values.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    /// `${name}`: a state field (prompts) or a path parameter (URLs).
    Field(&'a str),
    /// `${env:NAME}`
    Env(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("placeholder is never closed")]
    Unterminated,
    #[error("`{0}` is not an identifier or `env:` reference")]
    BadName(String),
}

/// Split `text` into literal text and placeholders.
pub fn segments(text: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut out = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("${") {
        if open > 0 {
            out.push(Segment::Text(&rest[..open]));
        }
        let after = &rest[open + 2..];
        let close = after.find('}').ok_or(TemplateError::Unterminated)?;
        let inner = &after[..close];
        let segment = match inner.strip_prefix("env:") {
            Some(var) if is_identifier(var) => Segment::Env(var),
            None if is_identifier(inner) => Segment::Field(inner),
            _ => return Err(TemplateError::BadName(inner.to_string())),
        };
        out.push(segment);
        rest = &after[close + 1..];
    }
    if !rest.is_empty() {
        out.push(Segment::Text(rest));
    }
    Ok(out)
}

/// Field placeholders in `text`, ignoring a malformed template.
pub fn field_refs(text: &str) -> Vec<&str> {
    segments(text)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| match s {
            Segment::Field(name) => Some(name),
            _ => None,
        })
        .collect()
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
