//! Calls to functions that are neither documented nor user-defined.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{Rule, RuleContext, KEYWORDS};
use crate::callbacks::CALLBACK_NAMES;

static CALL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap());

pub struct UnknownFunctions;

impl UnknownFunctions {
    fn is_known(cx: &RuleContext<'_>, name: &str) -> bool {
        let functions = cx.docs.functions(Some(cx.mode));
        functions.contains_key(name)
            || cx.docs.classes(Some(cx.mode)).contains_key(name)
            || cx.tracking.user_functions.contains_key(name)
            || KEYWORDS.contains(&name)
            || CALLBACK_NAMES.contains(&name)
            // still being typed
            || functions.keys().any(|f| f.len() > name.len() && f.starts_with(name))
    }
}

impl Rule for UnknownFunctions {
    fn name(&self) -> &'static str {
        "functions"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (index, _, cleaned) in cx.source.iter() {
            for caps in CALL_RE.captures_iter(cleaned) {
                let Some(name) = caps.get(1) else { continue };
                let before = cleaned[..name.start()].trim_end();
                if before.ends_with('.')
                    || before.ends_with("new")
                    || name.as_str().starts_with(|c: char| c.is_ascii_digit())
                    || Self::is_known(cx, name.as_str())
                {
                    continue;
                }
                diagnostics.push(cx.diagnostic(
                    self,
                    index,
                    name.start(),
                    name.end(),
                    DiagnosticSeverity::WARNING,
                    format!("Unknown function '{}'", name.as_str()),
                ));
            }
        }
        diagnostics
    }
}
