//! LSP Hover Module
//!
//! Plain-text hover for SLiM scripts: the signature of a function, method or
//! callback, the type of a property, and the inferred class of identifiers
//! the tracking engine has seen.

use slimlsp::callbacks::pseudo_parameters;
use slimlsp::docs::{lookup_member, MemberLookup};
use slimlsp::lexer::ScrubbedSource;
use slimlsp::resolver::{infer_type_from_expression, resolve_class_name};
use slimlsp::types::{byte_offset, Range};
use slimlsp::{DocumentationProvider, Mode, TrackingState};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{Hover, HoverContents, HoverParams, MarkupContent, MarkupKind};

use crate::cursor::{member_dot, receiver_before, word_at};
use crate::performance::TimingGuard;
use crate::Backend;

/// Hover text and the byte span of the word it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Handle hover requests
pub async fn handle_hover(backend: &Backend, params: HoverParams) -> Result<Option<Hover>> {
    let _timer = TimingGuard::new(&backend.perf_tracker, "lsp.server.hover");
    backend.perf_tracker.increment("lsp.server.hover.calls", 1);

    let uri = params.text_document_position_params.text_document.uri;
    let position = params.text_document_position_params.position;
    let Some(document) = backend.documents.get(&uri) else {
        return Err(tower_lsp::jsonrpc::Error::invalid_request());
    };

    let analyzer = backend.analyzer();
    let tracking = analyzer.tracking_cached(
        &backend.cache,
        &uri,
        document.version,
        &document.text,
        document.mode,
    );
    let source = ScrubbedSource::new(&document.text);
    let line = position.line as usize;
    let line_text = source.line(line);
    let byte = byte_offset(line_text, position.character);

    Ok(
        hover_at(analyzer.docs(), document.mode, &tracking, &source, line, byte).map(|info| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::PlainText,
                value: info.text,
            }),
            range: Some(Range::from_bytes(line, line_text, info.start, info.end).into()),
        }),
    )
}

/// Hover for the word at `byte` of line `line`, if there is anything to say.
pub fn hover_at(
    docs: &dyn DocumentationProvider,
    mode: Mode,
    tracking: &TrackingState,
    source: &ScrubbedSource,
    line: usize,
    byte: usize,
) -> Option<HoverInfo> {
    let cleaned = source.cleaned(line);
    let (start, end) = word_at(cleaned, byte)?;
    let word = &cleaned[start..end];
    if word.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let called = cleaned[end..].trim_start().starts_with('(');

    let text = match member_dot(cleaned, start) {
        Some(dot) => {
            let receiver = receiver_before(cleaned, dot)?;
            member_hover(docs, mode, tracking, receiver, word, called)?
        }
        None => free_hover(docs, mode, tracking, line, word)?,
    };
    Some(HoverInfo { text, start, end })
}

fn describe(header: &str, description: &str) -> String {
    if description.is_empty() {
        header.to_string()
    } else {
        format!("{header}\n\n{description}")
    }
}

fn member_hover(
    docs: &dyn DocumentationProvider,
    mode: Mode,
    tracking: &TrackingState,
    receiver: &str,
    member: &str,
    called: bool,
) -> Option<String> {
    let class = infer_type_from_expression(receiver, &tracking.instance_definitions)?;
    let found = match lookup_member(docs, mode, &class, member, called) {
        MemberLookup::Missing => lookup_member(docs, mode, &class, member, !called),
        other => other,
    };
    match found {
        MemberLookup::Method(doc) => Some(describe(
            &format!("{}  ({class} method)", doc.signature.trim_start_matches(['-', '+']).trim_start()),
            &doc.description,
        )),
        MemberLookup::Property(doc) => Some(describe(
            &format!("{class}.{member}: {}", doc.type_name),
            &doc.description,
        )),
        MemberLookup::Missing | MemberLookup::UnknownClass => None,
    }
}

fn free_hover(
    docs: &dyn DocumentationProvider,
    mode: Mode,
    tracking: &TrackingState,
    line: usize,
    word: &str,
) -> Option<String> {
    if let Some(header) = tracking.callback_headers.get(&line) {
        if header.name == word {
            return Some(match docs.callbacks(Some(mode)).get(word) {
                Some(doc) => describe(&doc.signature, &doc.description),
                None => format!("{word}() callback"),
            });
        }
    }

    if let Some(&defined) = tracking.user_functions.get(word) {
        return Some(format!("function {word}()\n\nDefined on line {}", defined + 1));
    }
    if let Some(doc) = docs.functions(Some(mode)).get(word) {
        return Some(describe(&doc.signature, &doc.description));
    }
    if let Some(doc) = docs.classes(Some(mode)).get(word) {
        let header = doc
            .constructor
            .as_ref()
            .map_or_else(|| format!("class {word}"), |c| c.signature.clone());
        return Some(describe(&header, &doc.description));
    }

    if let Some(context) = tracking.context_at(line) {
        if let Some(param) = pseudo_parameters(context).iter().find(|p| p.name == word) {
            return Some(format!(
                "{word}: {}\n\nPseudo-parameter of {context}() callbacks",
                param.class.unwrap_or("value")
            ));
        }
    }

    let class = resolve_class_name(word, &tracking.instance_definitions);
    let definition = tracking.definitions.iter().find(|d| d.name == word);
    match (class, definition) {
        (Some(class), Some(definition)) => Some(format!(
            "{word}: {class}\n\nDefined as a {} on line {}",
            definition.kind.noun(),
            definition.line + 1
        )),
        (Some(class), None) => Some(format!("{word}: {class}")),
        (None, Some(definition)) => Some(format!(
            "{word}\n\nDefined as a {} on line {}",
            definition.kind.noun(),
            definition.line + 1
        )),
        (None, None) => docs
            .types()
            .get(word)
            .map(|doc| describe(&format!("type {word}"), &doc.description)),
    }
}
