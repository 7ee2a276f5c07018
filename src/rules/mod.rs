//! Diagnostic pipeline
//!
//! Each check is a [`Rule`]: a pure function from the scrubbed document, the
//! tracking snapshot and the documentation tables to a list of diagnostics.
//! Rules do not see each other's output and may run in any order. The
//! [`Pipeline`] runs them one after another, isolating panics so a broken
//! rule costs its own diagnostics and nothing else.

use std::collections::BTreeSet;
use std::panic::{catch_unwind, AssertUnwindSafe};

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, NumberOrString};
use tracing::error;

use crate::docs::{DocumentationProvider, Mode};
use crate::lexer::ScrubbedSource;
use crate::tracking::TrackingState;
use crate::types::Range;

mod braces;
mod context;
mod definitions;
mod functions;
mod initialization;
mod members;
mod nullability;
mod references;
mod semicolons;
mod structure;

pub use braces::BraceBalance;
pub use context::ContextRestrictions;
pub use definitions::DuplicateDefinitions;
pub use functions::UnknownFunctions;
pub use initialization::InitializationOrder;
pub use members::MemberExistence;
pub use nullability::NullArguments;
pub use references::UndefinedReferences;
pub use semicolons::MissingSemicolons;
pub use structure::ScriptStructure;

/// Value of `Diagnostic::source` for everything this crate reports.
pub const DIAGNOSTIC_SOURCE: &str = "slimlsp";

/// Everything a rule may look at.
pub struct RuleContext<'a> {
    pub source: &'a ScrubbedSource,
    pub tracking: &'a TrackingState,
    pub docs: &'a dyn DocumentationProvider,
    pub mode: Mode,
}

impl RuleContext<'_> {
    /// Build a diagnostic for `rule` over bytes `start..end` of line `line`.
    pub fn diagnostic(
        &self,
        rule: &dyn Rule,
        line: usize,
        start: usize,
        end: usize,
        severity: DiagnosticSeverity,
        message: impl Into<String>,
    ) -> Diagnostic {
        let range = Range::from_bytes(line, self.source.line(line), start, end);
        make_diagnostic(rule.name(), range, severity, message.into())
    }
}

pub fn make_diagnostic(
    rule: &str,
    range: Range,
    severity: DiagnosticSeverity,
    message: String,
) -> Diagnostic {
    Diagnostic::new(
        range.into(),
        Some(severity),
        Some(NumberOrString::String(rule.to_string())),
        Some(DIAGNOSTIC_SOURCE.to_string()),
        message,
        None,
        None,
    )
}

/// One independent validator.
pub trait Rule: Send + Sync {
    /// Stable name, used as the diagnostic code and in `disabledRules`.
    fn name(&self) -> &'static str;

    /// Whether the rule makes sense for documents in `mode`.
    fn applies_to(&self, _mode: Mode) -> bool {
        true
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic>;
}

/// Ordered list of rules run after tracking.
pub struct Pipeline {
    rules: Vec<Box<dyn Rule>>,
    disabled: BTreeSet<String>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl Pipeline {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Pipeline {
            rules,
            disabled: BTreeSet::new(),
        }
    }

    /// Every built-in rule.
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(DuplicateDefinitions),
            Box::new(ScriptStructure),
            Box::new(BraceBalance),
            Box::new(MissingSemicolons),
            Box::new(UndefinedReferences),
            Box::new(MemberExistence),
            Box::new(UnknownFunctions),
            Box::new(NullArguments),
            Box::new(ContextRestrictions),
            Box::new(InitializationOrder),
        ])
    }

    pub fn with_disabled<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disabled = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Run every enabled rule. A rule that panics is logged and contributes
    /// nothing.
    pub fn run(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        for rule in &self.rules {
            if self.disabled.contains(rule.name()) || !rule.applies_to(cx.mode) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| rule.evaluate(cx))) {
                Ok(found) => diagnostics.extend(found),
                Err(_) => error!(rule = rule.name(), "rule panicked; skipping its diagnostics"),
            }
        }
        diagnostics
    }
}

/// `noun` with its first letter upper-cased, for sentence-initial use.
pub(crate) fn capitalized(noun: &str) -> String {
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keywords of the Eidos language.
pub(crate) const KEYWORDS: &[&str] = &[
    "if", "else", "do", "while", "for", "in", "next", "break", "return", "function", "new",
];

/// Byte ranges of identifier-like words on a scrubbed line that are not
/// preceded by `.` (member accesses are excluded).
pub(crate) fn free_identifiers(cleaned: &str) -> impl Iterator<Item = (usize, &str)> {
    static WORD_RE: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r"[A-Za-z_]\w*").unwrap());
    WORD_RE.find_iter(cleaned).filter_map(move |m| {
        let before = cleaned[..m.start()].trim_end();
        if before.ends_with('.') {
            return None;
        }
        // skip the tail of numeric literals such as `1e5`
        if cleaned[..m.start()].ends_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Some((m.start(), m.as_str()))
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::docs::Documentation;
    use crate::tracking::TrackingEngine;

    /// Run one rule over `text` in SLiM mode.
    pub fn run_rule(rule: &dyn Rule, text: &str) -> Vec<Diagnostic> {
        run_rule_in(rule, text, Mode::Slim)
    }

    pub fn run_rule_in(rule: &dyn Rule, text: &str, mode: Mode) -> Vec<Diagnostic> {
        if !rule.applies_to(mode) {
            return Vec::new();
        }
        let docs = Documentation::builtin().unwrap();
        let source = ScrubbedSource::new(text);
        let tracking = TrackingEngine::new(&docs, mode).track(&source);
        let cx = RuleContext {
            source: &source,
            tracking: &tracking,
            docs: &docs,
            mode,
        };
        rule.evaluate(&cx)
    }

    pub fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.message.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::Documentation;
    use crate::tracking::TrackingEngine;

    struct Panicky;

    impl Rule for Panicky {
        fn name(&self) -> &'static str {
            "panicky"
        }

        fn evaluate(&self, _cx: &RuleContext<'_>) -> Vec<Diagnostic> {
            panic!("boom")
        }
    }

    fn context_run(pipeline: &Pipeline, text: &str) -> Vec<Diagnostic> {
        let docs = Documentation::builtin().unwrap();
        let source = ScrubbedSource::new(text);
        let tracking = TrackingEngine::new(&docs, Mode::Slim).track(&source);
        pipeline.run(&RuleContext {
            source: &source,
            tracking: &tracking,
            docs: &docs,
            mode: Mode::Slim,
        })
    }

    #[test]
    fn panicking_rule_is_isolated() {
        let pipeline = Pipeline::new(vec![Box::new(Panicky), Box::new(MissingSemicolons)]);
        let diagnostics = context_run(&pipeline, "x = 1");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(
            diagnostics[0].code,
            Some(NumberOrString::String("semicolons".to_string()))
        );
        assert_eq!(diagnostics[0].source.as_deref(), Some(DIAGNOSTIC_SOURCE));
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let pipeline = Pipeline::standard().with_disabled(["semicolons"]);
        assert!(context_run(&pipeline, "x = 1").is_empty());
    }

    #[test]
    fn standard_pipeline_has_ten_rules() {
        let names = Pipeline::standard().rule_names();
        assert_eq!(names.len(), 10);
        let unique: BTreeSet<_> = names.iter().collect();
        assert_eq!(unique.len(), 10);
    }

    #[test]
    fn free_identifiers_skip_members_and_numbers() {
        let words: Vec<&str> = free_identifiers("x = p1.size() + 1e5 + y").map(|(_, w)| w).collect();
        assert_eq!(words, vec!["x", "p1", "y"]);
    }
}
