//! Duplicate and reserved definitions.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{capitalized, Rule, RuleContext, KEYWORDS};
use crate::tracking::{Definition, DefinitionKind};

/// Names that are built into every script and can never be defined.
const RESERVED_SYMBOLS: &[&str] = &[
    "T", "F", "NULL", "PI", "E", "INF", "NAN", "sim", "community", "self", "species", "ticks",
];

pub struct DuplicateDefinitions;

/// Namespace a definition lives in; constants and globals share one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Namespace {
    Symbol,
    Id(DefinitionKind),
    Function,
}

fn namespace(kind: DefinitionKind) -> Option<Namespace> {
    match kind {
        DefinitionKind::Constant | DefinitionKind::Global => Some(Namespace::Symbol),
        DefinitionKind::Function => Some(Namespace::Function),
        // several species may each have their own initialize() block
        DefinitionKind::Species => None,
        kind => Some(Namespace::Id(kind)),
    }
}

fn is_reserved(name: &str) -> bool {
    KEYWORDS.contains(&name) || RESERVED_SYMBOLS.contains(&name)
}

impl DuplicateDefinitions {
    fn error(&self, cx: &RuleContext<'_>, def: &Definition, message: String) -> Diagnostic {
        cx.diagnostic(
            self,
            def.line,
            def.column,
            def.column + def.name.len(),
            DiagnosticSeverity::ERROR,
            message,
        )
    }
}

impl Rule for DuplicateDefinitions {
    fn name(&self) -> &'static str {
        "definitions"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut first_seen: HashMap<(Namespace, &str), &Definition> = HashMap::new();
        let builtins = cx.docs.functions(Some(cx.mode));

        for def in &cx.tracking.definitions {
            let named_symbol = matches!(
                def.kind,
                DefinitionKind::Constant
                    | DefinitionKind::Global
                    | DefinitionKind::Species
                    | DefinitionKind::Function
            );
            if named_symbol && is_reserved(&def.name) {
                diagnostics.push(self.error(
                    cx,
                    def,
                    format!(
                        "'{}' is a reserved word and cannot be used as a {} name",
                        def.name,
                        def.kind.noun()
                    ),
                ));
                continue;
            }

            if def.kind == DefinitionKind::Species {
                if cx.tracking.defined_constants.contains(&def.name) {
                    diagnostics.push(self.error(
                        cx,
                        def,
                        format!("Species name '{}' collides with a defined constant", def.name),
                    ));
                }
                continue;
            }

            if def.kind == DefinitionKind::Function && builtins.contains_key(&def.name) {
                diagnostics.push(self.error(
                    cx,
                    def,
                    format!("Function '{}' redefines a built-in function", def.name),
                ));
                continue;
            }

            let Some(space) = namespace(def.kind) else {
                continue;
            };
            match first_seen.get(&(space, def.name.as_str())) {
                None => {
                    first_seen.insert((space, def.name.as_str()), def);
                }
                // globals may be reassigned freely
                Some(first)
                    if first.kind == DefinitionKind::Global
                        && def.kind == DefinitionKind::Global => {}
                Some(first) => diagnostics.push(self.error(
                    cx,
                    def,
                    format!(
                        "{} '{}' is already defined on line {}",
                        capitalized(first.kind.noun()),
                        def.name,
                        first.line + 1
                    ),
                )),
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

    #[test]
    fn second_mutation_type_cites_first_line() {
        let text = "initialize() {\n    initializeMutationType(\"m1\", 0.5, \"f\", 0.0);\n    initializeMutationType(\"m1\", 0.5, \"f\", 0.0);\n}";
        let diagnostics = run_rule(&DuplicateDefinitions, text);
        assert_eq!(
            messages(&diagnostics),
            vec!["Mutation type 'm1' is already defined on line 2"]
        );
        assert_eq!(diagnostics[0].range.start.line, 2);
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));
    }

    #[test]
    fn numeric_and_quoted_ids_collide() {
        let text = "initializeMutationType(1, 0.5, \"f\", 0.0);\ninitializeMutationType(\"m1\", 0.5, \"f\", 0.0);";
        assert_eq!(run_rule(&DuplicateDefinitions, text).len(), 1);
    }

    #[test]
    fn constants_cannot_be_redefined_but_globals_can() {
        let text = "defineConstant(\"K\", 1);\ndefineConstant(\"K\", 2);\ndefineGlobal(\"G\", 1);\ndefineGlobal(\"G\", 2);";
        assert_eq!(
            messages(&run_rule(&DuplicateDefinitions, text)),
            vec!["Constant 'K' is already defined on line 1"]
        );
    }

    #[test]
    fn reserved_words() {
        let text = "defineConstant(\"PI\", 3);\ndefineConstant(\"for\", 3);";
        assert_eq!(
            messages(&run_rule(&DuplicateDefinitions, text)),
            vec![
                "'PI' is a reserved word and cannot be used as a constant name",
                "'for' is a reserved word and cannot be used as a constant name",
            ]
        );
    }

    #[test]
    fn repeated_species_are_allowed() {
        let text = "species fox initialize() {\n}\nspecies fox initialize() {\n}";
        assert!(run_rule(&DuplicateDefinitions, text).is_empty());
    }

    #[test]
    fn species_colliding_with_constant() {
        let text = "defineConstant(\"fox\", 1);\nspecies fox initialize() {\n}";
        assert_eq!(
            messages(&run_rule(&DuplicateDefinitions, text)),
            vec!["Species name 'fox' collides with a defined constant"]
        );
    }

    #[test]
    fn user_functions() {
        let text = "function (numeric)sum(numeric x) {\n}\nfunction (void)f(void) {\n}\nfunction (void)f(void) {\n}";
        assert_eq!(
            messages(&run_rule(&DuplicateDefinitions, text)),
            vec![
                "Function 'sum' redefines a built-in function",
                "Function 'f' is already defined on line 3",
            ]
        );
    }
}
