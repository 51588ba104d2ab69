//! Parse phase: raw AJML text → owned `Element` tree.

pub mod document;
pub mod escape;

pub use document::Element;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Diagnostic, DiagnosticKind};

/// Sanitise and read one AJML document. `file` is only used for diagnostics.
pub fn parse_document(raw: &str, file: &str) -> Result<Element, Diagnostic> {
    let sanitised = escape::sanitise(raw);
    let malformed = |reason: String| {
        Diagnostic::new(DiagnosticKind::MalformedDocument { reason }, file)
    };

    let mut reader = Reader::from_str(&sanitised);
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(e.to_string()).at(Some(line_at(&sanitised, reader.buffer_position() as usize))))?;
        match event {
            Event::Start(e) => {
                let line = tag_line(&sanitised, reader.buffer_position() as usize);
                stack.push(open_element(&e, line).map_err(&malformed)?);
            }
            Event::Empty(e) => {
                let line = tag_line(&sanitised, reader.buffer_position() as usize);
                let element = open_element(&e, line).map_err(&malformed)?;
                attach(element, &mut stack, &mut root)
                    .map_err(|reason| malformed(reason).at(Some(line)))?;
            }
            Event::End(_) => {
                if let Some(mut element) = stack.pop() {
                    element.text = element.text.trim().to_string();
                    let line = element.line;
                    attach(element, &mut stack, &mut root)
                        .map_err(|reason| malformed(reason).at(line))?;
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|e| malformed(e.to_string()))?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(malformed(format!("element `<{}>` is never closed", open.tag)).at(open.line));
    }
    let root = root.ok_or_else(|| malformed("document has no root element".into()))?;
    tracing::debug!(file, root = %root.tag, "document parsed");
    Ok(root)
}

fn open_element(e: &BytesStart<'_>, line: u32) -> Result<Element, String> {
    let mut element = Element::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    element.line = Some(line);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| err.to_string())?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value().map_err(|err| err.to_string())?;
        element.attrs.push((key, value.into_owned()));
    }
    Ok(element)
}

fn attach(
    element: Element,
    stack: &mut [Element],
    root: &mut Option<Element>,
) -> Result<(), String> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if let Some(first) = root {
        return Err(format!(
            "unexpected second top-level element `<{}>` after `<{}>`",
            element.tag, first.tag
        ));
    }
    *root = Some(element);
    Ok(())
}

/// Line of the tag that ends at byte offset `end`.
fn tag_line(source: &str, end: usize) -> u32 {
    let start = source.get(..end).and_then(|s| s.rfind('<')).unwrap_or(0);
    line_at(source, start)
}

fn line_at(source: &str, offset: usize) -> u32 {
    let upto = source.get(..offset).unwrap_or(source);
    upto.bytes().filter(|b| *b == b'\n').count() as u32 + 1
}
