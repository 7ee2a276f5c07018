//! Calls and symbols that are only valid in certain callbacks or models.

use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::members::is_chained;
use super::{free_identifiers, Rule, RuleContext};
use crate::callbacks::{pseudo_parameters, CallbackBlock, PSEUDO_PARAMETERS};
use crate::docs::Mode;
use crate::resolver::resolve_class_name;

const REPRODUCTION_METHODS: &[&str] = &[
    "addCloned",
    "addCrossed",
    "addEmpty",
    "addMultiRecombinant",
    "addRecombinant",
    "addSelfed",
];

const NON_WF_METHODS: &[&str] = &["killIndividuals", "takeMigrants"];

const WF_METHODS: &[&str] = &[
    "setCloningRate",
    "setMigrationRates",
    "setSelfingRate",
    "setSexRatio",
    "setSubpopulationSize",
];

/// Interaction queries that read evaluated interaction state.
const INTERACTION_QUERIES: &[&str] = &[
    "clippedIntegral",
    "distance",
    "distanceFromPoint",
    "drawByStrength",
    "interactingNeighborCount",
    "localPopulationDensity",
    "nearestInteractingNeighbors",
    "nearestNeighbors",
    "nearestNeighborsOfPoint",
    "neighborCount",
    "neighborCountOfPoint",
    "strength",
    "totalOfNeighborStrengths",
];

static FREE_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(initialize\w+)\s*\(").unwrap());

static METHOD_CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)\s*\(").unwrap());

/// Names bound by the script itself: assignment targets, loop variables,
/// named arguments and function parameters.
static BINDING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\b([A-Za-z_]\w*)\s*=(?:[^=]|$))|(?:\bfor\s*\(\s*([A-Za-z_]\w*)\s+in\b)")
        .unwrap()
});

static FUNCTION_PARAMS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*function\s*\([^)]*\)\s*\w+\s*\((.*)\)").unwrap());

pub struct ContextRestrictions;

fn script_bindings<'s>(cx: &'s RuleContext<'_>) -> BTreeSet<&'s str> {
    let mut bound = BTreeSet::new();
    for (_, _, cleaned) in cx.source.iter() {
        for caps in BINDING_RE.captures_iter(cleaned) {
            if let Some(name) = caps.get(1).or_else(|| caps.get(2)) {
                bound.insert(name.as_str());
            }
        }
        if let Some(params) = FUNCTION_PARAMS_RE.captures(cleaned).and_then(|c| c.get(1)) {
            bound.extend(free_identifiers(params.as_str()).map(|(_, w)| w));
        }
    }
    bound
}

/// Callbacks that provide `name` as a pseudo-parameter.
fn owners_of(name: &str) -> Vec<&'static str> {
    let mut owners: Vec<&'static str> = PSEUDO_PARAMETERS
        .entries()
        .filter(|(_, params)| params.iter().any(|p| p.name == name))
        .map(|(callback, _)| *callback)
        .collect();
    owners.sort_unstable();
    owners
}

impl ContextRestrictions {
    fn check_calls(&self, cx: &RuleContext<'_>, out: &mut Vec<Diagnostic>) {
        let functions = cx.docs.functions(Some(cx.mode));
        let non_wf = cx.tracking.model_type.is_non_wf();

        for (index, _, cleaned) in cx.source.iter() {
            // lines outside every callback may be function bodies
            let Some(context) = cx.tracking.context_at(index) else {
                continue;
            };
            let is_header = cx.tracking.callback_headers.contains_key(&index);

            if context != "initialize" && !is_header {
                for caps in FREE_CALL_RE.captures_iter(cleaned) {
                    let Some(name) = caps.get(1) else { continue };
                    if cleaned[..name.start()].trim_end().ends_with('.')
                        || !functions.contains_key(name.as_str())
                    {
                        continue;
                    }
                    out.push(cx.diagnostic(
                        self,
                        index,
                        name.start(),
                        name.end(),
                        DiagnosticSeverity::ERROR,
                        format!(
                            "{}() can only be called inside an initialize() callback",
                            name.as_str()
                        ),
                    ));
                }
            }

            for caps in METHOD_CALL_RE.captures_iter(cleaned) {
                let Some(method) = caps.get(2) else { continue };
                let name = method.as_str();
                let message = if REPRODUCTION_METHODS.contains(&name) && context != "reproduction"
                {
                    format!("{name}() can only be called inside a reproduction() callback")
                } else if NON_WF_METHODS.contains(&name) && !non_wf {
                    format!("{name}() is only available in nonWF models")
                } else if WF_METHODS.contains(&name) && non_wf {
                    format!("{name}() is only available in WF models")
                } else {
                    continue;
                };
                out.push(cx.diagnostic(
                    self,
                    index,
                    method.start(),
                    method.end(),
                    DiagnosticSeverity::ERROR,
                    message,
                ));
            }
        }
    }

    fn check_pseudo_parameters(&self, cx: &RuleContext<'_>, out: &mut Vec<Diagnostic>) {
        let bound = script_bindings(cx);
        for (index, _, cleaned) in cx.source.iter() {
            let Some(context) = cx.tracking.context_at(index) else {
                continue;
            };
            if cx.tracking.callback_headers.contains_key(&index) {
                continue;
            }
            let available = pseudo_parameters(context);
            for (start, word) in free_identifiers(cleaned) {
                if available.iter().any(|p| p.name == word) || bound.contains(word) {
                    continue;
                }
                let owners = owners_of(word);
                if owners.is_empty() {
                    continue;
                }
                let list = owners
                    .iter()
                    .map(|o| format!("{o}()"))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push(cx.diagnostic(
                    self,
                    index,
                    start,
                    start + word.len(),
                    DiagnosticSeverity::ERROR,
                    format!("'{word}' is only defined inside {list} callbacks"),
                ));
            }
        }
    }

    /// Queries on an interaction type that is evaluated later in the same
    /// block.
    fn check_interaction_order(&self, cx: &RuleContext<'_>, out: &mut Vec<Diagnostic>) {
        for CallbackBlock {
            start_line,
            end_line,
            ..
        } in &cx.tracking.callback_blocks
        {
            let mut calls: Vec<(usize, usize, &str, &str)> = Vec::new();
            let mut first_evaluate: HashMap<&str, (usize, usize)> = HashMap::new();
            for index in *start_line..=*end_line {
                let cleaned = cx.source.cleaned(index);
                for caps in METHOD_CALL_RE.captures_iter(cleaned) {
                    let (Some(receiver), Some(method)) = (caps.get(1), caps.get(2)) else {
                        continue;
                    };
                    if is_chained(cleaned, receiver.start())
                        || resolve_class_name(receiver.as_str(), &cx.tracking.instance_definitions)
                            != Some("InteractionType")
                    {
                        continue;
                    }
                    if method.as_str() == "evaluate" {
                        first_evaluate
                            .entry(receiver.as_str())
                            .or_insert((index, method.start()));
                    } else if INTERACTION_QUERIES.contains(&method.as_str()) {
                        calls.push((index, method.start(), receiver.as_str(), method.as_str()));
                    }
                }
            }
            for (index, column, receiver, method) in calls {
                let evaluated_later = first_evaluate
                    .get(receiver)
                    .is_some_and(|&at| at > (index, column));
                if evaluated_later {
                    out.push(cx.diagnostic(
                        self,
                        index,
                        column,
                        column + method.len(),
                        DiagnosticSeverity::ERROR,
                        format!("{receiver}.{method}() is called before {receiver}.evaluate() in this callback"),
                    ));
                }
            }
        }
    }
}

impl Rule for ContextRestrictions {
    fn name(&self) -> &'static str {
        "context"
    }

    fn applies_to(&self, mode: Mode) -> bool {
        mode == Mode::Slim
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.check_calls(cx, &mut diagnostics);
        self.check_pseudo_parameters(cx, &mut diagnostics);
        self.check_interaction_order(cx, &mut diagnostics);
        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::{messages, run_rule};
    use pretty_assertions::assert_eq;

    #[test]
    fn initialize_calls_outside_initialize() {
        let text = "initialize() {\n    initializeMutationRate(1e-7);\n}\n1 early() {\n    initializeMutationRate(1e-7);\n}";
        let diagnostics = run_rule(&ContextRestrictions, text);
        assert_eq!(
            messages(&diagnostics),
            vec!["initializeMutationRate() can only be called inside an initialize() callback"]
        );
        assert_eq!(diagnostics[0].range.start.line, 4);
    }

    #[test]
    fn reproduction_methods() {
        let text = "initialize() {\n    initializeSLiMModelType(\"nonWF\");\n}\nreproduction() {\n    subpop.addCrossed(individual, individual);\n}\n1 early() {\n    p1.addCloned(p1.individuals);\n}";
        assert_eq!(
            messages(&run_rule(&ContextRestrictions, text)),
            vec!["addCloned() can only be called inside a reproduction() callback"]
        );
    }

    #[test]
    fn model_specific_methods() {
        let wf = "1 early() {\n    sim.killIndividuals(p1.individuals);\n    p1.setSubpopulationSize(10);\n}";
        assert_eq!(
            messages(&run_rule(&ContextRestrictions, wf)),
            vec!["killIndividuals() is only available in nonWF models"]
        );
        let non_wf = format!("initialize() {{\n    initializeSLiMModelType(\"nonWF\");\n}}\n{wf}");
        assert_eq!(
            messages(&run_rule(&ContextRestrictions, &non_wf)),
            vec!["setSubpopulationSize() is only available in WF models"]
        );
    }

    #[test]
    fn pseudo_parameters_outside_their_callback() {
        let text = "mutationEffect(m1) {\n    return effect;\n}\n1 late() {\n    x = effect;\n}";
        let diagnostics = run_rule(&ContextRestrictions, text);
        assert_eq!(
            messages(&diagnostics),
            vec!["'effect' is only defined inside mutationEffect() callbacks"]
        );
        assert_eq!(diagnostics[0].range.start.line, 4);
    }

    #[test]
    fn bound_names_are_not_pseudo_parameters() {
        let text = "1 late() {\n    for (individual in p1.individuals) individual.tag = 1;\n    weights = 3;\n    print(weights);\n}";
        assert!(run_rule(&ContextRestrictions, text).is_empty());
    }

    #[test]
    fn interaction_query_before_evaluate() {
        let text = "1 late() {\n    n = i1.nearestNeighbors(p1.individuals[0]);\n    i1.evaluate(p1);\n    m = i1.strength(p1.individuals[0]);\n}";
        let diagnostics = run_rule(&ContextRestrictions, text);
        assert_eq!(
            messages(&diagnostics),
            vec!["i1.nearestNeighbors() is called before i1.evaluate() in this callback"]
        );
        assert_eq!(diagnostics[0].range.start.line, 1);
    }

    #[test]
    fn interaction_evaluated_elsewhere_is_trusted() {
        let text = "1 early() {\n    i1.evaluate(p1);\n}\n1 late() {\n    n = i1.nearestNeighbors(p1.individuals[0]);\n}";
        assert!(run_rule(&ContextRestrictions, text).is_empty());
    }
}
