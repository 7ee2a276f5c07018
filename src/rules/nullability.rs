//! `NULL` passed where a parameter does not accept it.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::members::is_chained;
use super::{Rule, RuleContext};
use crate::docs::{lookup_member, MemberLookup};
use crate::resolver::{call_arguments, resolve_class_name};
use crate::signature::Signature;

static CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b([A-Za-z_]\w*)\s*\.\s*)?\b([A-Za-z_]\w*)\s*\(").unwrap()
});

pub struct NullArguments;

impl NullArguments {
    /// Documented signature of the call named `name`, on `receiver` if given.
    fn signature(cx: &RuleContext<'_>, receiver: Option<&str>, name: &str) -> Option<Signature> {
        match receiver {
            Some(receiver) => {
                let class = resolve_class_name(receiver, &cx.tracking.instance_definitions)?;
                match lookup_member(cx.docs, cx.mode, class, name, true) {
                    MemberLookup::Method(doc) => doc.parsed_signature(),
                    _ => None,
                }
            }
            None if cx.tracking.user_functions.contains_key(name) => None,
            None => cx
                .docs
                .functions(Some(cx.mode))
                .get(name)
                .and_then(|doc| doc.parsed_signature()),
        }
    }
}

fn is_null(value: &str) -> bool {
    matches!(value.trim(), "NULL" | "null")
}

impl Rule for NullArguments {
    fn name(&self) -> &'static str {
        "nullability"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (index, _, cleaned) in cx.source.iter() {
            for caps in CALL_RE.captures_iter(cleaned) {
                let (Some(whole), Some(name)) = (caps.get(0), caps.get(2)) else {
                    continue;
                };
                let receiver = caps.get(1);
                let method_call = cleaned[..name.start()].trim_end().ends_with('.');
                let receiver = match receiver {
                    Some(r) if !is_chained(cleaned, r.start()) => Some(r.as_str()),
                    // a method on an unresolvable receiver
                    _ if method_call => continue,
                    _ => None,
                };
                let Some(signature) = Self::signature(cx, receiver, name.as_str()) else {
                    continue;
                };

                let open = whole.end() - 1;
                for (position, argument) in call_arguments(cleaned, open).iter().enumerate() {
                    let (parameter, value_start) = match argument.named() {
                        Some((param_name, value)) => {
                            if !is_null(value) {
                                continue;
                            }
                            let Some(eq) = argument.text.find('=') else {
                                continue;
                            };
                            let after = &argument.text[eq + 1..];
                            let offset = eq + 1 + (after.len() - after.trim_start().len());
                            (signature.named(param_name), argument.start + offset)
                        }
                        None => {
                            if !is_null(argument.text) {
                                continue;
                            }
                            (signature.positional(position), argument.trimmed_start())
                        }
                    };
                    let Some(parameter) = parameter else { continue };
                    if parameter.is_nullable() {
                        continue;
                    }
                    diagnostics.push(cx.diagnostic(
                        self,
                        index,
                        value_start,
                        value_start + 4,
                        DiagnosticSeverity::ERROR,
                        format!(
                            "Parameter '{}' of {}() does not accept NULL",
                            parameter.name, signature.name
                        ),
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

    #[test]
    fn positional_null_to_function() {
        let diagnostics = run_rule(&NullArguments, "x = rnorm(NULL, 0, 1);");
        assert_eq!(
            messages(&diagnostics),
            vec!["Parameter 'n' of rnorm() does not accept NULL"]
        );
        assert_eq!(diagnostics[0].range.start.character, 10);
        assert_eq!(diagnostics[0].range.end.character, 14);
    }

    #[test]
    fn nullable_parameters_accept_null() {
        let text = "initializeMutationRate(1e-7, NULL);\nprint(NULL);\nx = c(NULL, NULL);";
        assert!(run_rule(&NullArguments, text).is_empty());
    }

    #[test]
    fn named_null_argument() {
        let diagnostics = run_rule(&NullArguments, "x = rnorm(5, sd = NULL);");
        assert_eq!(
            messages(&diagnostics),
            vec!["Parameter 'sd' of rnorm() does not accept NULL"]
        );
        assert_eq!(diagnostics[0].range.start.character, 18);
    }

    #[test]
    fn method_on_resolved_class() {
        let text = "1 early() {\n    p1.sampleIndividuals(NULL, exclude = NULL);\n}";
        let diagnostics = run_rule(&NullArguments, text);
        assert_eq!(
            messages(&diagnostics),
            vec!["Parameter 'size' of sampleIndividuals() does not accept NULL"]
        );
        assert_eq!(diagnostics[0].range.start.character, 25);
    }

    #[test]
    fn nested_calls_are_checked_independently() {
        let text = "x = sum(rnorm(NULL));";
        assert_eq!(run_rule(&NullArguments, text).len(), 1);
    }

    #[test]
    fn unresolved_receivers_are_skipped() {
        let text = "thing.sampleIndividuals(NULL);\np1.individuals.sampleIndividuals(NULL);";
        assert!(run_rule(&NullArguments, text).is_empty());
    }
}
