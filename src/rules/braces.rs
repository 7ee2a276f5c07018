//! Running brace balance.

use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{Rule, RuleContext};

pub struct BraceBalance;

impl Rule for BraceBalance {
    fn name(&self) -> &'static str {
        "braces"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut open: Vec<(usize, usize)> = Vec::new();

        for (index, _, cleaned) in cx.source.iter() {
            let header_line = cx.tracking.callback_headers.contains_key(&index);
            for (pos, ch) in cleaned.char_indices() {
                match ch {
                    '{' => open.push((index, pos)),
                    '}' if open.pop().is_none() && !header_line => {
                        diagnostics.push(cx.diagnostic(
                            self,
                            index,
                            pos,
                            pos + 1,
                            DiagnosticSeverity::ERROR,
                            "Unexpected closing brace",
                        ));
                    }
                    _ => {}
                }
            }
        }

        for (line, pos) in open {
            diagnostics.push(cx.diagnostic(
                self,
                line,
                pos,
                pos + 1,
                DiagnosticSeverity::ERROR,
                "Unclosed brace: no matching '}' before end of file",
            ));
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
    fn balanced_script_is_clean() {
        let text = "1 early() {\n    if (T) { x = \"}\"; } // }\n}";
        assert!(run_rule(&BraceBalance, text).is_empty());
    }

    #[test]
    fn stray_close_resets_the_count() {
        let text = "1 early() {\n}\n}\n2 late() {\n}";
        let diagnostics = run_rule(&BraceBalance, text);
        assert_eq!(messages(&diagnostics), vec!["Unexpected closing brace"]);
        assert_eq!(diagnostics[0].range.start.line, 2);
    }

    #[test]
    fn unclosed_brace_reported_at_its_opening() {
        let text = "1 early() {\n    for (i in 1:3) {\n}";
        let diagnostics = run_rule(&BraceBalance, text);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.start.line, 0);
        assert_eq!(diagnostics[0].range.start.character, 10);
    }
}
