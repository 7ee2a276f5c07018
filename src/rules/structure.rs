//! Script structure: unclosed strings, missing events, deprecated headers.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{Rule, RuleContext};
use crate::callbacks::ZERO_ARITY_EVENTS;

static EVENT_REGISTRATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.register(?:First|Early|Late)Event\s*\(").unwrap());

pub struct ScriptStructure;

impl Rule for ScriptStructure {
    fn name(&self) -> &'static str {
        "structure"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        if let Some((line, column)) = cx.source.unterminated_string {
            let end = cx.source.line(line).len();
            diagnostics.push(cx.diagnostic(
                self,
                line,
                column,
                end,
                DiagnosticSeverity::ERROR,
                "Unclosed string literal",
            ));
        }

        let headers = &cx.tracking.callback_headers;
        for (&line, header) in headers {
            if header.bare {
                let ticks = header.ticks.as_deref().unwrap_or_default();
                diagnostics.push(cx.diagnostic(
                    self,
                    line,
                    header.name_start,
                    header.name_start + ticks.len(),
                    DiagnosticSeverity::ERROR,
                    format!(
                        "Tick blocks without an event name are no longer supported; write '{ticks} early() {{'"
                    ),
                ));
                continue;
            }
            if ZERO_ARITY_EVENTS.contains(&header.name.as_str()) && !header.params.trim().is_empty()
            {
                diagnostics.push(cx.diagnostic(
                    self,
                    line,
                    header.params_start,
                    header.params_start + header.params.len(),
                    DiagnosticSeverity::ERROR,
                    format!("{}() takes no parameters", header.name),
                ));
            }
        }

        let initialize = headers.iter().find(|(_, h)| h.name == "initialize");
        let has_event = headers
            .values()
            .any(|h| h.name != "initialize" && ZERO_ARITY_EVENTS.contains(&h.name.as_str()))
            || cx
                .source
                .cleaned
                .iter()
                .any(|line| EVENT_REGISTRATION_RE.is_match(line));
        if let (Some((&line, header)), false) = (initialize, has_event) {
            diagnostics.push(cx.diagnostic(
                self,
                line,
                header.name_start,
                header.name_start + header.name.len(),
                DiagnosticSeverity::ERROR,
                "Script defines initialize() but no first(), early() or late() event",
            ));
        }

        diagnostics
    }
}
