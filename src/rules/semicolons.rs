//! Missing statement terminators.
//!
//! A line is a statement end when every parenthesis and bracket opened since
//! the statement began has been closed. Statement ends must finish with `;`
//! unless they are block delimiters, callback or function headers, control
//! flow heads, or the expression visibly continues on the next line.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{Rule, RuleContext};
use crate::callbacks::parse_header;
use crate::lexer::net_count;

static CONTROL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:if|else|for|while|do|function)\b").unwrap());

/// Characters after which an expression cannot end.
const CONTINUES_AFTER: &[char] = &[
    ';', '{', '}', ',', '(', '[', '+', '-', '*', '/', '%', '^', '=', '<', '>', '!', '&', '|', '?',
    ':', '.',
];

/// Characters that can only continue an expression from the previous line.
const CONTINUES_BEFORE: &[char] = &[
    '{', '.', '+', '*', '/', '%', '^', '?', ':', '&', '|', ')', ']', ',', '=', '<', '>',
];

pub struct MissingSemicolons;

/// Byte offset just past the head of a control statement (`if (...)`,
/// `else`, `do`), or `None` when the head does not finish on this line.
/// `depth` is the bracket depth carried in from earlier lines of the
/// condition.
fn control_head_end(cleaned: &str, mut depth: i32) -> Option<usize> {
    let mut from = 0;
    if depth == 0 {
        let indent = cleaned.len() - cleaned.trim_start().len();
        let keyword = CONTROL_RE.find(&cleaned[indent..])?;
        from = indent + keyword.end();
        match keyword.as_str() {
            "function" => return None,
            "else" | "do" => return Some(from),
            _ => {}
        }
    }
    let mut opened = depth > 0;
    for (i, ch) in cleaned[from..].char_indices() {
        match ch {
            '(' | '[' => {
                depth += 1;
                opened = true;
            }
            ')' | ']' => {
                depth -= 1;
                if opened && depth == 0 {
                    return Some(from + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Start of a statement sharing its line with a control head, as in
/// `if (x) y = 1`. Heads followed by nothing or by `{` have no such body.
fn inline_body_start(cleaned: &str, carried: i32) -> Option<usize> {
    let mut end = control_head_end(cleaned, carried)?;
    // `else if (...)` chains a second head
    while CONTROL_RE.is_match(cleaned[end..].trim_start()) {
        end += control_head_end(&cleaned[end..], 0)?;
    }
    let rest = &cleaned[end..];
    let body = rest.trim_start();
    if body.is_empty() || body.starts_with('{') {
        return None;
    }
    Some(end + rest.len() - body.len())
}

impl MissingSemicolons {
    fn next_code_line<'s>(cx: &'s RuleContext<'_>, after: usize) -> Option<&'s str> {
        (after + 1..cx.source.len())
            .map(|i| cx.source.cleaned(i).trim())
            .find(|l| !l.is_empty())
    }
}

impl Rule for MissingSemicolons {
    fn name(&self) -> &'static str {
        "semicolons"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut depth = 0i32;
        let mut statement_is_control = false;

        for (index, _, cleaned) in cx.source.iter() {
            let trimmed = cleaned.trim();
            if trimmed.is_empty() {
                continue;
            }
            if depth <= 0 {
                statement_is_control = CONTROL_RE.is_match(trimmed);
            }
            let carried = depth;
            depth += net_count(cleaned, '(', ')') + net_count(cleaned, '[', ']');
            if depth > 0 {
                continue;
            }
            depth = 0;

            // a trailing string literal is scrubbed away but still ends the expression
            let code_end = cleaned.trim_end().len();
            let end = cx
                .source
                .string_spans(index)
                .last()
                .map_or(code_end, |&(_, string_end)| string_end.max(code_end));
            let ends_in_code = end == code_end;

            let mut start = cleaned.len() - cleaned.trim_start().len();
            if statement_is_control {
                match inline_body_start(cleaned, carried) {
                    Some(body) => start = body,
                    None => continue,
                }
            }
            if (ends_in_code && trimmed.ends_with(CONTINUES_AFTER))
                || cx.tracking.callback_headers.contains_key(&index)
                || parse_header(cleaned).is_some()
            {
                continue;
            }
            if let Some(next) = Self::next_code_line(cx, index) {
                if next.starts_with(CONTINUES_BEFORE) || next.starts_with("else") {
                    continue;
                }
            }

            diagnostics.push(cx.diagnostic(
                self,
                index,
                start,
                end,
                DiagnosticSeverity::WARNING,
                "Statement is missing a semicolon",
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
    fn bare_statement() {
        let diagnostics = run_rule(&MissingSemicolons, "x = 1");
        assert_eq!(messages(&diagnostics), vec!["Statement is missing a semicolon"]);
        assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
        assert!(run_rule(&MissingSemicolons, "x = 1;").is_empty());
    }

    #[test]
    fn allowances() {
        let text = r#"// a comment
initialize() {
    /* block
       comment */
    if (T)
        x = 1;
    else
        y = 2;
    for (i in 1:3)
    {
        z = i;
    }
}
s1 10 late()
{
}
function (void)f(void) {
}
"#;
        assert!(run_rule(&MissingSemicolons, text).is_empty());
    }

    #[test]
    fn multi_line_calls_end_on_the_closing_line() {
        let text = "defineConstant(\"K\",\n    100\n)";
        let diagnostics = run_rule(&MissingSemicolons, text);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].range.start.line, 2);
        assert!(run_rule(&MissingSemicolons, "defineConstant(\"K\",\n    100\n);").is_empty());
    }

    #[test]
    fn operators_continue_expressions() {
        let text = "x = 1 +\n    2;\ny = a\n    .size();";
        assert!(run_rule(&MissingSemicolons, text).is_empty());
    }

    #[test]
    fn multi_line_condition() {
        let text = "if (a &\n    b)\n    x = 1;";
        assert!(run_rule(&MissingSemicolons, text).is_empty());
    }

    #[test]
    fn inline_control_bodies_need_semicolons() {
        let text = "if (x) y = 1\nfor (i in 1:3) w = i\nif (x) { y = 3; }\nif (x) y = 4;\nelse if (z) y = 2";
        let diagnostics = run_rule(&MissingSemicolons, text);
        let found: Vec<(u32, u32)> = diagnostics
            .iter()
            .map(|d| (d.range.start.line, d.range.start.character))
            .collect();
        assert_eq!(found, vec![(0, 7), (1, 15), (4, 12)]);
    }

    #[test]
    fn string_after_block_comment_close() {
        let text = "/* a\n   it's done */ x = 1 + // more\n    2;";
        assert!(run_rule(&MissingSemicolons, text).is_empty());
    }

    #[test]
    fn semicolon_inside_string_does_not_count() {
        assert_eq!(run_rule(&MissingSemicolons, "x = \"a;\"").len(), 1);
    }
}
