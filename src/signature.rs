//! Parsing of documentation signatures
//!
//! Signatures in the documentation dataset look like
//! `(void)initializeMutationRate(numeric rates, [Ni ends = NULL], [string$ sex = "*"])`
//! or, for methods, `- (object<Individual>)sampleIndividuals(integer$ size, ...)`.

use crate::error::{Error, Result};

/// One declared parameter of a function or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_spec: String,
    pub optional: bool,
    pub default: Option<String>,
}

impl Parameter {
    /// A parameter accepts NULL if its type is `*` or carries the `N`
    /// abbreviation prefix (`Ni`, `No<Subpopulation>$`, ...).
    pub fn is_nullable(&self) -> bool {
        let base = self.type_spec.trim_end_matches('$');
        base == "*" || base.starts_with('N')
    }

    pub fn is_variadic(&self) -> bool {
        self.name == "..."
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub return_type: String,
    pub name: String,
    pub parameters: Vec<Parameter>,
}

impl Signature {
    pub fn parse(text: &str) -> Result<Signature> {
        let invalid = || Error::InvalidSignature(text.to_string());
        let text = text
            .trim()
            .trim_start_matches(['-', '+', '\u{2013}'])
            .trim_start();

        let rest = text.strip_prefix('(').ok_or_else(invalid)?;
        let close = matching_close(rest, '(', ')').ok_or_else(invalid)?;
        let return_type = rest[..close].trim().to_string();
        let rest = &rest[close + 1..];

        let open = rest.find('(').ok_or_else(invalid)?;
        let name = rest[..open].trim().to_string();
        if name.is_empty() {
            return Err(invalid());
        }
        let params_text = &rest[open + 1..];
        let close = matching_close(params_text, '(', ')').ok_or_else(invalid)?;
        let parameters = split_top_level(&params_text[..close])
            .into_iter()
            .filter(|p| !p.trim().is_empty() && p.trim() != "void")
            .map(|p| parse_parameter(&p))
            .collect();

        Ok(Signature {
            return_type,
            name,
            parameters,
        })
    }

    /// The parameter a positional argument at `index` binds to.
    pub fn positional(&self, index: usize) -> Option<&Parameter> {
        match self.parameters.get(index) {
            Some(p) => Some(p),
            None => self.parameters.last().filter(|p| p.is_variadic()),
        }
    }

    pub fn named(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

fn parse_parameter(text: &str) -> Parameter {
    let mut text = text.trim();
    let mut optional = false;
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        optional = true;
        text = inner.trim();
    }

    let (decl, default) = match top_level_find(text, '=') {
        Some(eq) => (text[..eq].trim(), Some(text[eq + 1..].trim().to_string())),
        None => (text, None),
    };

    if decl == "..." {
        return Parameter {
            name: "...".to_string(),
            type_spec: "*".to_string(),
            optional: true,
            default,
        };
    }

    let (type_spec, name) = match decl.rfind(char::is_whitespace) {
        Some(split) => (decl[..split].trim(), decl[split..].trim()),
        None => ("*", decl),
    };

    Parameter {
        name: name.to_string(),
        type_spec: type_spec.to_string(),
        optional,
        default,
    }
}

/// Byte index of the `close` that balances an already-consumed `open`.
fn matching_close(text: &str, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            c if c == open => depth += 1,
            c if c == close => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

fn top_level_find(text: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, ch) in text.char_indices() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth -= 1,
            c if c == target && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split a parameter list on commas that are not nested inside brackets,
/// generics or quotes.
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for ch in text.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            current.push(ch);
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '<' => depth += 1,
            ')' | ']' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_function_signature() {
        let sig = Signature::parse(
            r#"(void)initializeMutationRate(numeric rates, [Ni ends = NULL], [string$ sex = "*"])"#,
        )
        .unwrap();
        assert_eq!(sig.return_type, "void");
        assert_eq!(sig.name, "initializeMutationRate");
        assert_eq!(sig.parameters.len(), 3);
        assert_eq!(sig.parameters[0].name, "rates");
        assert!(!sig.parameters[0].is_nullable());
        assert!(sig.parameters[1].optional);
        assert!(sig.parameters[1].is_nullable());
        assert_eq!(sig.parameters[2].default.as_deref(), Some("\"*\""));
    }

    #[test]
    fn generic_types_do_not_split() {
        let sig = Signature::parse(
            "- (void)addSubpopSplit(is$ subpopID, integer$ size, io<Subpopulation>$ sourceSubpop, [Nf xy = NULL])",
        )
        .unwrap();
        assert_eq!(sig.parameters.len(), 4);
        assert_eq!(sig.parameters[2].type_spec, "io<Subpopulation>$");
        assert!(!sig.parameters[2].is_nullable());
        assert!(sig.parameters[3].is_nullable());
    }

    #[test]
    fn nullable_object_and_any_types() {
        let sig = Signature::parse("(void)f(No<Subpopulation> a, * b, + c)").unwrap();
        assert!(sig.parameters[0].is_nullable());
        assert!(sig.parameters[1].is_nullable());
        assert!(!sig.parameters[2].is_nullable());
    }

    #[test]
    fn variadic_absorbs_trailing_arguments() {
        let sig = Signature::parse("(*)c(...)").unwrap();
        assert!(sig.positional(0).unwrap().is_variadic());
        assert!(sig.positional(7).unwrap().is_variadic());
    }

    #[test]
    fn empty_parameter_list() {
        let sig = Signature::parse("(float$)getSeed(void)").unwrap();
        assert!(sig.parameters.is_empty());
        assert!(sig.positional(0).is_none());
    }

    #[test]
    fn rejects_garbage() {
        assert!(Signature::parse("not a signature").is_err());
        assert!(Signature::parse("(void)broken(").is_err());
    }
}
