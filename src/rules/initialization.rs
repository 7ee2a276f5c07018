//! Ordering and completeness of `initialize()` blocks, and callbacks that
//! depend on the model type.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{free_identifiers, Rule, RuleContext};
use crate::docs::Mode;

static INIT_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(initialize\w+)\s*\(").unwrap());

static NUCLEOTIDE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bnucleotideBased\s*=\s*T\b").unwrap());

const MODEL_TYPE: &str = "initializeSLiMModelType";
const OPTIONS: &str = "initializeSLiMOptions";
const MUTATION_RATE: &str = "initializeMutationRate";

/// Initializers every species with genetics is expected to call.
const RECOMMENDED: &[&str] = &[
    MUTATION_RATE,
    "initializeRecombinationRate",
    "initializeMutationType",
    "initializeGenomicElementType",
    "initializeGenomicElement",
];

/// Calls that must already have happened when the key is called, if they
/// happen in the block at all.
const PREREQUISITES: &[(&str, &[&str])] = &[
    ("initializeGenomicElement", &["initializeGenomicElementType"]),
    (
        "initializeGenomicElementType",
        &["initializeMutationType", "initializeMutationTypeNuc"],
    ),
];

#[derive(Debug, Clone, Copy)]
struct InitCall<'s> {
    name: &'s str,
    line: usize,
    start: usize,
}

/// The `initialize*` calls of each species, in document order. Single-species
/// scripts use the empty species name.
struct SpeciesInit<'s> {
    header_line: usize,
    header_start: usize,
    calls: Vec<InitCall<'s>>,
}

pub struct InitializationOrder;

impl InitializationOrder {
    fn collect<'s>(cx: &'s RuleContext<'_>) -> BTreeMap<&'s str, SpeciesInit<'s>> {
        let mut species: BTreeMap<&str, SpeciesInit> = BTreeMap::new();
        for block in cx
            .tracking
            .callback_blocks
            .iter()
            .filter(|b| b.name == "initialize")
        {
            let header = cx.tracking.callback_headers.get(&block.start_line);
            let name = header
                .and_then(|h| h.species.as_ref())
                .map_or("", |(_, name)| name.as_str());
            let entry = species.entry(name).or_insert_with(|| SpeciesInit {
                header_line: block.start_line,
                header_start: header.map_or(0, |h| h.name_start),
                calls: Vec::new(),
            });
            for line in block.start_line..=block.end_line {
                let cleaned = cx.source.cleaned(line);
                for caps in INIT_CALL_RE.captures_iter(cleaned) {
                    let Some(m) = caps.get(1) else { continue };
                    if cleaned[..m.start()].trim_end().ends_with('.') {
                        continue;
                    }
                    entry.calls.push(InitCall {
                        name: m.as_str(),
                        line,
                        start: m.start(),
                    });
                }
            }
        }
        species
    }

    fn check_order(&self, cx: &RuleContext<'_>, calls: &[InitCall<'_>], out: &mut Vec<Diagnostic>) {
        let error = |call: &InitCall<'_>, message: String| {
            cx.diagnostic(
                self,
                call.line,
                call.start,
                call.start + call.name.len(),
                DiagnosticSeverity::ERROR,
                message,
            )
        };

        for (position, call) in calls.iter().enumerate() {
            let earlier = &calls[..position];
            if call.name == MODEL_TYPE && position > 0 {
                out.push(error(
                    call,
                    format!("{MODEL_TYPE}() must be called before any other initialize function"),
                ));
            }
            if call.name == OPTIONS && earlier.iter().any(|c| c.name != MODEL_TYPE) {
                out.push(error(
                    call,
                    format!("{OPTIONS}() must be called before other initialize functions except {MODEL_TYPE}()"),
                ));
            }
            for (dependent, required) in PREREQUISITES {
                if call.name != *dependent {
                    continue;
                }
                let satisfied = earlier.iter().any(|c| required.contains(&c.name));
                let defined_later = calls[position..].iter().any(|c| required.contains(&c.name));
                if !satisfied && defined_later {
                    out.push(error(
                        call,
                        format!("{dependent}() is called before {}()", required[0]),
                    ));
                }
            }
        }
    }
}

impl Rule for InitializationOrder {
    fn name(&self) -> &'static str {
        "initialization"
    }

    fn applies_to(&self, mode: Mode) -> bool {
        mode == Mode::Slim
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let nucleotide_based = cx
            .source
            .cleaned
            .iter()
            .any(|line| NUCLEOTIDE_RE.is_match(line));

        for (species, init) in Self::collect(cx) {
            self.check_order(cx, &init.calls, &mut diagnostics);
            // `species all initialize()` configures the community only
            if species == "all" {
                continue;
            }
            for required in RECOMMENDED {
                if *required == MUTATION_RATE && nucleotide_based {
                    continue;
                }
                let called = init
                    .calls
                    .iter()
                    .any(|c| c.name == *required || c.name.strip_suffix("Nuc") == Some(*required));
                if !called {
                    diagnostics.push(cx.diagnostic(
                        self,
                        init.header_line,
                        init.header_start,
                        init.header_start + "initialize".len(),
                        DiagnosticSeverity::WARNING,
                        format!("initialize() does not call {required}()"),
                    ));
                }
            }
        }

        let non_wf = cx.tracking.model_type.is_non_wf();
        for (&line, header) in &cx.tracking.callback_headers {
            let message = match header.name.as_str() {
                "reproduction" | "survival" if !non_wf => format!(
                    "{}() callback requires a nonWF model. Call initializeSLiMModelType(\"nonWF\") in initialize().",
                    header.name
                ),
                "mateChoice" if non_wf => {
                    "mateChoice() callbacks are never called in nonWF models".to_string()
                }
                _ => continue,
            };
            diagnostics.push(cx.diagnostic(
                self,
                line,
                header.name_start,
                header.name_start + header.name.len(),
                DiagnosticSeverity::ERROR,
                message,
            ));
        }

        for (index, _, cleaned) in cx.source.iter() {
            if cx.tracking.context_at(index) != Some("initialize")
                || cx.tracking.callback_headers.contains_key(&index)
            {
                continue;
            }
            for (start, word) in free_identifiers(cleaned) {
                if word == "sim" || word == "community" {
                    diagnostics.push(cx.diagnostic(
                        self,
                        index,
                        start,
                        start + word.len(),
                        DiagnosticSeverity::ERROR,
                        format!("'{word}' is not available inside initialize()"),
                    ));
                }
            }
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{messages, run_rule};
    use pretty_assertions::assert_eq;

    const COMPLETE: &str = r#"initialize() {
    initializeSLiMModelType("nonWF");
    initializeSLiMOptions(keepPedigrees = T);
    initializeMutationRate(1e-7);
    initializeMutationType("m1", 0.5, "f", 0.0);
    initializeGenomicElementType("g1", m1, 1.0);
    initializeGenomicElement(g1, 0, 99999);
    initializeRecombinationRate(1e-8);
}
reproduction() {
}
"#;

    #[test]
    fn complete_model_is_clean() {
        assert!(run_rule(&InitializationOrder, COMPLETE).is_empty());
    }

    #[test]
    fn reproduction_requires_non_wf() {
        let text = COMPLETE.replace("    initializeSLiMModelType(\"nonWF\");\n", "");
        let diagnostics = run_rule(&InitializationOrder, &text);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("requires a nonWF model."));
        assert_eq!(diagnostics[0].range.start.line, 8);
    }

    #[test]
    fn mate_choice_in_non_wf() {
        let text = format!("{COMPLETE}mateChoice() {{\n}}\n");
        assert_eq!(
            messages(&run_rule(&InitializationOrder, &text)),
            vec!["mateChoice() callbacks are never called in nonWF models"]
        );
    }

    #[test]
    fn ordering_violations() {
        let text = r#"initialize() {
    initializeMutationRate(1e-7);
    initializeSLiMModelType("WF");
    initializeGenomicElement(g1, 0, 99);
    initializeGenomicElementType("g1", m1, 1.0);
    initializeMutationType("m1", 0.5, "f", 0.0);
    initializeRecombinationRate(1e-8);
    initializeSLiMOptions();
}
1 early() {
}
"#;
        assert_eq!(
            messages(&run_rule(&InitializationOrder, text)),
            vec![
                "initializeSLiMModelType() must be called before any other initialize function",
                "initializeGenomicElement() is called before initializeGenomicElementType()",
                "initializeGenomicElementType() is called before initializeMutationType()",
                "initializeSLiMOptions() must be called before other initialize functions except initializeSLiMModelType()",
            ]
        );
    }

    #[test]
    fn missing_initializers_warn() {
        let text = "initialize() {\n    initializeMutationRate(1e-7);\n}\n1 early() {\n}";
        let diagnostics = run_rule(&InitializationOrder, text);
        assert_eq!(diagnostics.len(), 4);
        assert!(diagnostics
            .iter()
            .all(|d| d.severity == Some(DiagnosticSeverity::WARNING)));
        assert_eq!(diagnostics[0].message, "initialize() does not call initializeRecombinationRate()");
    }

    #[test]
    fn nucleotide_models_skip_mutation_rate() {
        let text = COMPLETE
            .replace("keepPedigrees = T", "nucleotideBased = T")
            .replace("    initializeMutationRate(1e-7);\n", "");
        assert!(run_rule(&InitializationOrder, &text).is_empty());
    }

    #[test]
    fn sim_is_unavailable_in_initialize() {
        let text = COMPLETE.replace(
            "    initializeRecombinationRate(1e-8);\n",
            "    initializeRecombinationRate(1e-8);\n    x = sim.cycle;\n",
        );
        assert_eq!(
            messages(&run_rule(&InitializationOrder, &text)),
            vec!["'sim' is not available inside initialize()"]
        );
    }
}
