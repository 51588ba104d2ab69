//! Lexical pre-pass: escape markup-significant characters inside
//! `<condition>` and `<system_prompt>` bodies so authors can write
//! comparisons and angle brackets there without CDATA.

use std::sync::LazyLock;

use regex::{Captures, Regex};

static CONDITION_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(<condition>)(.*?)(</condition>)").expect("static regex")
});

static PROMPT_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(<system_prompt>)(.*?)(</system_prompt>)").expect("static regex")
});

const ENTITY_TAILS: [&str; 6] = ["amp;", "lt;", "gt;", "apos;", "quot;", "#"];

/// Escape the bodies of every condition and system prompt in `raw`.
pub fn sanitise(raw: &str) -> String {
    let mut out = raw.to_string();
    for re in [&*CONDITION_BODY, &*PROMPT_BODY] {
        out = re
            .replace_all(&out, |caps: &Captures| {
                format!("{}{}{}", &caps[1], escape_content(&caps[2]), &caps[3])
            })
            .into_owned();
    }
    out
}

/// Escape a bare `&` (not already an entity), `<` (unless it opens a closing
/// tag) and every `>`.
fn escape_content(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        let rest = &text[i + c.len_utf8()..];
        match c {
            '&' if ENTITY_TAILS.iter().any(|t| rest.starts_with(t)) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '<' if rest.starts_with('/') => out.push('<'),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}
