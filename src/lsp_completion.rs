//! # Completion Handler Module
//!
//! This module provides LSP completion for SLiM and Eidos scripts:
//! - Members of the receiver's class after `.`
//! - Documented and user-defined functions
//! - Tracked definitions (constants, globals, ids, typed variables)
//! - Pseudo-parameters of the enclosing callback
//! - Callback names at the top level of a script

use std::collections::BTreeMap;

use slimlsp::callbacks::pseudo_parameters;
use slimlsp::docs::{class_members, lookup_member, MemberLookup};
use slimlsp::lexer::ScrubbedSource;
use slimlsp::resolver::infer_type_from_expression;
use slimlsp::types::byte_offset;
use slimlsp::{DocumentationProvider, Mode, TrackingState};
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionParams, CompletionResponse,
};

use crate::cursor::{member_dot, prefix_start, receiver_before};
use crate::performance::TimingGuard;
use crate::Backend;

/// Main completion handler function that processes completion requests
pub async fn handle_completion(
    backend: &Backend,
    params: CompletionParams,
) -> Result<Option<CompletionResponse>> {
    let _timer = TimingGuard::new(&backend.perf_tracker, "lsp.server.completion");
    backend.perf_tracker.increment("lsp.server.completion.calls", 1);

    let uri = params.text_document_position.text_document.uri;
    let position = params.text_document_position.position;
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
    let byte = byte_offset(source.line(line), position.character);

    let items = completions_at(analyzer.docs(), document.mode, &tracking, &source, line, byte);
    Ok(Some(CompletionResponse::Array(items)))
}

/// Completion items for the cursor at `byte` of line `line`, sorted by label.
pub fn completions_at(
    docs: &dyn DocumentationProvider,
    mode: Mode,
    tracking: &TrackingState,
    source: &ScrubbedSource,
    line: usize,
    byte: usize,
) -> Vec<CompletionItem> {
    let cleaned = source.cleaned(line);
    let byte = byte.min(cleaned.len());
    if in_literal(source, line, byte) {
        return Vec::new();
    }
    let start = prefix_start(cleaned, byte);
    let prefix = &cleaned[start..byte];

    let mut items = Completions::new(prefix);
    match member_dot(cleaned, start) {
        Some(dot) => {
            if let Some(class) = receiver_before(cleaned, dot)
                .and_then(|r| infer_type_from_expression(r, &tracking.instance_definitions))
            {
                add_members(&mut items, docs, mode, &class);
            }
        }
        None => add_free(&mut items, docs, mode, tracking, line),
    }
    items.finish()
}

/// Whether the byte before the cursor belongs to a string or comment.
fn in_literal(source: &ScrubbedSource, line: usize, byte: usize) -> bool {
    let Some(previous) = byte.checked_sub(1) else {
        return false;
    };
    let original = source.line(line).as_bytes().get(previous).copied();
    !matches!(original, None | Some(b' ' | b'\t')) && !source.is_code_at(line, previous)
}

/// Items keyed by label; the first item offered for a label wins.
struct Completions<'p> {
    prefix: &'p str,
    items: BTreeMap<String, CompletionItem>,
}

impl<'p> Completions<'p> {
    fn new(prefix: &'p str) -> Self {
        Completions {
            prefix,
            items: BTreeMap::new(),
        }
    }

    fn add(&mut self, label: &str, kind: CompletionItemKind, detail: Option<String>) {
        if !label.starts_with(self.prefix) || self.items.contains_key(label) {
            return;
        }
        self.items.insert(
            label.to_string(),
            CompletionItem {
                label: label.to_string(),
                kind: Some(kind),
                detail,
                ..Default::default()
            },
        );
    }

    fn finish(self) -> Vec<CompletionItem> {
        self.items.into_values().collect()
    }
}

fn add_members(items: &mut Completions<'_>, docs: &dyn DocumentationProvider, mode: Mode, class: &str) {
    for (member, is_method) in class_members(docs, mode, class) {
        match lookup_member(docs, mode, class, member, is_method) {
            MemberLookup::Method(doc) => items.add(
                member,
                CompletionItemKind::METHOD,
                Some(doc.signature.trim_start_matches(['-', '+']).trim_start().to_string()),
            ),
            MemberLookup::Property(doc) => {
                items.add(member, CompletionItemKind::PROPERTY, Some(doc.type_name.clone()))
            }
            MemberLookup::Missing | MemberLookup::UnknownClass => {}
        }
    }
}

fn add_free(
    items: &mut Completions<'_>,
    docs: &dyn DocumentationProvider,
    mode: Mode,
    tracking: &TrackingState,
    line: usize,
) {
    let context = tracking.context_at(line);
    if let Some(context) = context {
        for param in pseudo_parameters(context) {
            items.add(
                param.name,
                CompletionItemKind::VARIABLE,
                param.class.map(str::to_string),
            );
        }
    }

    for name in &tracking.defined_constants {
        items.add(name, CompletionItemKind::CONSTANT, None);
    }
    for (name, class) in &tracking.instance_definitions {
        items.add(name, CompletionItemKind::VARIABLE, Some(class.clone()));
    }
    for name in &tracking.defined_globals {
        items.add(name, CompletionItemKind::VARIABLE, None);
    }
    for name in tracking.script_blocks.iter().chain(&tracking.species) {
        items.add(name, CompletionItemKind::VARIABLE, None);
    }

    for name in tracking.user_functions.keys() {
        items.add(name, CompletionItemKind::FUNCTION, None);
    }
    for (name, doc) in docs.functions(Some(mode)) {
        items.add(name, CompletionItemKind::FUNCTION, Some(doc.signature.clone()));
    }
    for (name, doc) in docs.classes(Some(mode)) {
        if let Some(constructor) = &doc.constructor {
            items.add(name, CompletionItemKind::CONSTRUCTOR, Some(constructor.signature.clone()));
        }
    }

    // callbacks are declared at the top level only
    if context.is_none() {
        for (name, doc) in docs.callbacks(Some(mode)) {
            items.add(name, CompletionItemKind::EVENT, Some(doc.signature.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slimlsp::{Documentation, TrackingEngine};

    const SCRIPT: &str = r#"initialize() {
    defineConstant("KEEP", 500);
    initializeMut
}
1 early() {
    sim.addSubpop("p1", KEEP);
    p1.set
    // initializeMut
}
ear"#;

    fn complete(line: usize) -> Vec<CompletionItem> {
        let docs = Documentation::builtin().unwrap();
        let source = ScrubbedSource::new(SCRIPT);
        let tracking = TrackingEngine::new(&docs, Mode::Slim).track(&source);
        let byte = source.line(line).len();
        completions_at(&docs, Mode::Slim, &tracking, &source, line, byte)
    }

    fn labels(items: &[CompletionItem]) -> Vec<&str> {
        items.iter().map(|i| i.label.as_str()).collect()
    }

    #[test]
    fn members_of_receiver_class() {
        let items = complete(6);
        let migration = items
            .iter()
            .find(|i| i.label == "setMigrationRates")
            .unwrap();
        assert_eq!(migration.kind, Some(CompletionItemKind::METHOD));
        assert_eq!(
            migration.detail.as_deref(),
            Some("(void)setMigrationRates(io<Subpopulation> sourceSubpops, numeric rates)")
        );
        assert!(items.iter().all(|i| i.label.starts_with("set")));
    }

    #[test]
    fn functions_by_prefix() {
        let items = complete(2);
        let names = labels(&items);
        assert!(names.contains(&"initializeMutationRate"));
        assert!(names.contains(&"initializeMutationType"));
        assert!(!names.contains(&"initializeRecombinationRate"));
    }

    #[test]
    fn tracked_constants() {
        let docs = Documentation::builtin().unwrap();
        let source = ScrubbedSource::new(SCRIPT);
        let tracking = TrackingEngine::new(&docs, Mode::Slim).track(&source);
        let byte = source.line(5).find("KEEP").unwrap() + 2;
        let items = completions_at(&docs, Mode::Slim, &tracking, &source, 5, byte);
        assert_eq!(labels(&items), vec!["KEEP"]);
        assert_eq!(items[0].kind, Some(CompletionItemKind::CONSTANT));
    }

    #[test]
    fn callbacks_only_at_top_level() {
        assert_eq!(labels(&complete(9)), vec!["early"]);
    }

    #[test]
    fn nothing_inside_comments() {
        assert!(complete(7).is_empty());
    }
}
