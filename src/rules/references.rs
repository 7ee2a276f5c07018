//! Undefined `p#`, `m#`, `g#` and `i#` references.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{capitalized, free_identifiers, Rule, RuleContext};
use crate::docs::Mode;
use crate::resolver::IdClass;

pub struct UndefinedReferences;

/// Whether the word at `end` is the target of a plain assignment.
fn is_assigned(cleaned: &str, end: usize) -> bool {
    let rest = cleaned[end..].trim_start();
    rest.starts_with('=') && !rest.starts_with("==")
}

impl Rule for UndefinedReferences {
    fn name(&self) -> &'static str {
        "references"
    }

    fn applies_to(&self, mode: Mode) -> bool {
        mode == Mode::Slim
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let tracking = cx.tracking;
        let mut diagnostics = Vec::new();

        for (index, _, cleaned) in cx.source.iter() {
            for (start, word) in free_identifiers(cleaned) {
                let Some(class) = IdClass::of_identifier(word) else {
                    continue;
                };
                // script blocks are referenced by id only through strings
                if class == IdClass::ScriptBlock
                    || tracking.dynamic_ids.contains(&class)
                    || tracking.ids(class).contains(word)
                    || tracking.defined_constants.contains(word)
                    || tracking.defined_globals.contains(word)
                    || is_assigned(cleaned, start + word.len())
                {
                    continue;
                }
                diagnostics.push(cx.diagnostic(
                    self,
                    index,
                    start,
                    start + word.len(),
                    DiagnosticSeverity::WARNING,
                    format!("{} '{}' is not defined", capitalized(class.noun()), word),
                ));
            }
        }
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{messages, run_rule, run_rule_in};
    use pretty_assertions::assert_eq;

    #[test]
    fn undefined_ids_warn() {
        let text = "initialize() {\n    initializeMutationType(\"m1\", 0.5, \"f\", 0.0);\n}\n1 early() {\n    sim.addSubpop(\"p1\", 10);\n    p2.setSubpopulationSize(5);\n    x = m1.id + m3.id;\n}";
        let diagnostics = run_rule(&UndefinedReferences, text);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].range.start.line, 5);
        assert_eq!(diagnostics[1].range.start.character, 16);
        assert_eq!(diagnostics[0].message, "Subpopulation 'p2' is not defined");
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
    }

    #[test]
    fn forward_references_resolve() {
        let text = "1 early() {\n    p1.individuals;\n}\n0 first() {\n    sim.addSubpop(\"p1\", 10);\n}";
        assert!(run_rule(&UndefinedReferences, text).is_empty());
    }

    #[test]
    fn dynamic_construction_suppresses_the_family() {
        let text = "1 early() {\n    for (i in 1:3) sim.addSubpop(i, 10);\n    p7.individuals;\n    g2.id;\n}";
        assert_eq!(
            messages(&run_rule(&UndefinedReferences, text)),
            vec!["Genomic element type 'g2' is not defined"]
        );
    }

    #[test]
    fn members_strings_and_eidos_are_ignored() {
        let text = "x = obj.p4;\ny = \"m9\";";
        assert!(run_rule(&UndefinedReferences, text).is_empty());
        assert!(run_rule_in(&UndefinedReferences, "p4.x;", Mode::Eidos).is_empty());
    }
}
