//! Method and property existence on resolved classes.

use std::sync::LazyLock;

use regex::Regex;
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity};

use super::{Rule, RuleContext};
use crate::docs::{lookup_member, MemberLookup};
use crate::resolver::resolve_class_name;

static MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_]\w*)\s*\.\s*([A-Za-z_]\w*)(\s*\()?").unwrap()
});

pub struct MemberExistence;

/// A receiver that is itself the result of a member access, call or index
/// cannot be resolved from its name.
pub(crate) fn is_chained(cleaned: &str, receiver_start: usize) -> bool {
    cleaned[..receiver_start]
        .trim_end()
        .ends_with(['.', ')', ']'])
}

impl Rule for MemberExistence {
    fn name(&self) -> &'static str {
        "members"
    }

    fn evaluate(&self, cx: &RuleContext<'_>) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for (index, _, cleaned) in cx.source.iter() {
            for caps in MEMBER_RE.captures_iter(cleaned) {
                let (Some(receiver), Some(member)) = (caps.get(1), caps.get(2)) else {
                    continue;
                };
                if is_chained(cleaned, receiver.start())
                    || receiver.as_str().starts_with(|c: char| c.is_ascii_digit())
                {
                    continue;
                }
                let Some(class) =
                    resolve_class_name(receiver.as_str(), &cx.tracking.instance_definitions)
                else {
                    continue;
                };
                let call = caps.get(3).is_some();
                let name = member.as_str();
                let missing = match lookup_member(cx.docs, cx.mode, class, name, call) {
                    MemberLookup::Missing if !call => {
                        // a method named without calling it is still a member
                        matches!(
                            lookup_member(cx.docs, cx.mode, class, name, true),
                            MemberLookup::Missing
                        )
                    }
                    MemberLookup::Missing => true,
                    _ => false,
                };
                if !missing {
                    continue;
                }
                let kind = if call { "Method" } else { "Property" };
                diagnostics.push(cx.diagnostic(
                    self,
                    index,
                    member.start(),
                    member.end(),
                    DiagnosticSeverity::ERROR,
                    format!("{kind} '{name}' does not exist on class {class}"),
                ));
            }
        }
        diagnostics
    }
}
