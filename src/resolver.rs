//! Expression type resolution
//!
//! Best-effort mapping from identifiers and right-hand-side expressions to
//! the class of object they hold. Nothing here is authoritative: when an
//! expression cannot be classified the answer is `None`, and downstream
//! checks that need a class simply do not run.

use std::collections::HashMap;
use std::sync::LazyLock;

use phf::phf_map;
use regex::Regex;

/// Globals and conventional names whose class is fixed by SLiM.
pub static WELL_KNOWN_GLOBALS: phf::Map<&'static str, &'static str> = phf_map! {
    "sim" => "Species",
    "community" => "Community",
    "individual" => "Individual",
    "child" => "Individual",
    "parent1" => "Individual",
    "parent2" => "Individual",
    "receiver" => "Individual",
    "exerter" => "Individual",
    "genome" => "Genome",
    "genome1" => "Genome",
    "genome2" => "Genome",
    "mut" => "Mutation",
    "chromosome" => "Chromosome",
    "subpop" => "Subpopulation",
    "sourceSubpop" => "Subpopulation",
    "element" => "GenomicElement",
    "self" => "SLiMEidosBlock",
};

/// Identifier families with the `<letter><number>` naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdClass {
    Subpopulation,
    MutationType,
    GenomicElementType,
    InteractionType,
    ScriptBlock,
}

impl IdClass {
    pub const ALL: [IdClass; 5] = [
        IdClass::Subpopulation,
        IdClass::MutationType,
        IdClass::GenomicElementType,
        IdClass::InteractionType,
        IdClass::ScriptBlock,
    ];

    pub fn prefix(self) -> char {
        match self {
            IdClass::Subpopulation => 'p',
            IdClass::MutationType => 'm',
            IdClass::GenomicElementType => 'g',
            IdClass::InteractionType => 'i',
            IdClass::ScriptBlock => 's',
        }
    }

    pub fn class_name(self) -> &'static str {
        match self {
            IdClass::Subpopulation => "Subpopulation",
            IdClass::MutationType => "MutationType",
            IdClass::GenomicElementType => "GenomicElementType",
            IdClass::InteractionType => "InteractionType",
            IdClass::ScriptBlock => "SLiMEidosBlock",
        }
    }

    /// Human-readable noun used in diagnostics.
    pub fn noun(self) -> &'static str {
        match self {
            IdClass::Subpopulation => "subpopulation",
            IdClass::MutationType => "mutation type",
            IdClass::GenomicElementType => "genomic element type",
            IdClass::InteractionType => "interaction type",
            IdClass::ScriptBlock => "script block",
        }
    }

    pub fn from_prefix(prefix: char) -> Option<IdClass> {
        IdClass::ALL.into_iter().find(|c| c.prefix() == prefix)
    }

    /// Classify an identifier such as `p1` or `m23`.
    pub fn of_identifier(ident: &str) -> Option<IdClass> {
        if !ID_RE.is_match(ident) {
            return None;
        }
        ident.chars().next().and_then(IdClass::from_prefix)
    }
}

static ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[pmgis]\d+$").unwrap());

/// Class of an identifier: tracked definitions first, then well-known
/// globals, then the id naming convention.
pub fn resolve_class_name<'a>(
    identifier: &str,
    instance_definitions: &'a HashMap<String, String>,
) -> Option<&'a str> {
    if let Some(class) = instance_definitions.get(identifier) {
        return Some(class.as_str());
    }
    if let Some(class) = WELL_KNOWN_GLOBALS.get(identifier) {
        return Some(*class);
    }
    IdClass::of_identifier(identifier).map(IdClass::class_name)
}

/// Expressions whose value is numeric regardless of any nested object calls.
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*(?:abs|asFloat|asInteger|ceil|cumProduct|cumSum|exp|floor|integerDiv|integerMod
            |length|log|log10|log2|max|mean|median|min|nchar|product|range|rbinom|rdunif
            |rexp|rgamma|rnorm|rpois|round|runif|sd|seq|seqAlong|seqLen|size|sqrt|sum
            |tabulate|trunc|var|which|whichMax|whichMin)\s*\(
        | [-+*/%^:]
        | ^\s*[\d.]
        ",
    )
    .unwrap()
});

/// Expressions whose value is logical.
static LOGICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*(?:all|any|exists|identical|isFloat|isInteger|isLogical|isNULL|isObject
            |isString|strcontains|strprefix|strsuffix)\s*\(
        | ==|!=|<=|>=|[<>!&|]
        | ^\s*(?:T|F)\s*$
        ",
    )
    .unwrap()
});

/// Functions whose result has the element class of their first argument.
const PASSTHROUGH_FUNCTIONS: &[&str] = &["c", "rev", "sample", "sortBy", "unique"];

/// Ordered table mapping the final call or property of an expression to the
/// class of its result.
static RESULT_CLASS_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"^(?:addSubpop|addSubpopSplit|subpopulations|allSubpopulations|subpopulationsWithIDs|subpopulation)$", "Subpopulation"),
        (r"^(?:individuals|sampleIndividuals|subsetIndividuals|individualsWithPedigreeIDs|add(?:Cloned|Crossed|Selfed|Empty|Recombinant|MultiRecombinant)|nearest(?:Interacting)?Neighbors(?:OfPoint)?|drawByStrength|individual)$", "Individual"),
        (r"^(?:genomes|genomesNonNull|genome1|genome2)$", "Genome"),
        (r"^(?:mutations|mutationsOfType|uniqueMutations|uniqueMutationsOfType|subsetMutations|addNewMutation|addNewDrawnMutation)$", "Mutation"),
        (r"^substitutions$", "Substitution"),
        (r"^(?:mutationTypes|allMutationTypes|mutationTypesWithIDs|mutationType|initializeMutationType|initializeMutationTypeNuc)$", "MutationType"),
        (r"^(?:genomicElementTypes|allGenomicElementTypes|genomicElementTypesWithIDs|genomicElementType|initializeGenomicElementType)$", "GenomicElementType"),
        (r"^(?:genomicElements|initializeGenomicElement)$", "GenomicElement"),
        (r"^(?:allInteractionTypes|interactionTypesWithIDs|initializeInteractionType)$", "InteractionType"),
        (r"^chromosome$", "Chromosome"),
        (r"^(?:allSpecies|speciesWithIDs|species|speciesSpec)$", "Species"),
        (r"^(?:createLogFile|logFiles)$", "LogFile"),
        (r"^(?:register\w+(?:Event|Callback)|rescheduleScriptBlock|scriptBlocks|allScriptBlocks|scriptBlocksWithIDs)$", "SLiMEidosBlock"),
        (r"^defineSpatialMap$", "SpatialMap"),
        (r"^(?:Dictionary|getRowValues|usage|treeSeqMetadata)$", "Dictionary"),
        (r"^(?:DataFrame|subsetColumns|subsetRows)$", "DataFrame"),
        (r"^Image$", "Image"),
    ]
    .into_iter()
    .map(|(pattern, class)| (Regex::new(pattern).unwrap(), class))
    .collect()
});

static SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z_]\w*)\s*(\(\))?\s*((?:\[\]\s*)*)$").unwrap()
});

/// Class of the value produced by `expr`, if it can be told from its shape.
pub fn infer_type_from_expression(
    expr: &str,
    instance_definitions: &HashMap<String, String>,
) -> Option<String> {
    let expr = expr.trim().trim_end_matches(';').trim();
    if expr.is_empty() || expr.starts_with(['"', '\'']) {
        return None;
    }
    let flat = flatten_nested(expr);
    if NUMERIC_RE.is_match(&flat) || LOGICAL_RE.is_match(&flat) {
        return None;
    }
    if let Some(inner) = flat.strip_prefix("new ") {
        return SEGMENT_RE
            .captures(inner)
            .filter(|caps| caps.get(2).is_some())
            .map(|caps| caps[1].to_string());
    }

    let (receiver, segment) = match flat.rfind('.') {
        Some(dot) => (Some(&flat[..dot]), &flat[dot + 1..]),
        None => (None, flat.as_str()),
    };
    let caps = SEGMENT_RE.captures(segment)?;
    let name = caps.get(1)?.as_str();
    let called = caps.get(2).is_some();

    if receiver.is_none() && !called {
        return resolve_class_name(name, instance_definitions).map(str::to_string);
    }
    if receiver.is_none() && PASSTHROUGH_FUNCTIONS.contains(&name) {
        let open = expr.find('(')?;
        let first = call_arguments(expr, open).into_iter().next()?;
        return infer_type_from_expression(first.text, instance_definitions);
    }

    RESULT_CLASS_TABLE
        .iter()
        .find(|(pattern, _)| pattern.is_match(name))
        .map(|(_, class)| class.to_string())
}

/// Drop the contents of every bracketed group and string literal, keeping the
/// brackets, so top-level structure can be matched with simple patterns.
pub fn flatten_nested(expr: &str) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut prev = '\0';
    for ch in expr.chars() {
        if let Some(q) = quote {
            if ch == q && prev != '\\' {
                quote = None;
                if depth == 0 {
                    out.push(ch);
                }
            }
            prev = if prev == '\\' { '\0' } else { ch };
            continue;
        }
        match ch {
            '"' | '\'' => {
                quote = Some(ch);
                if depth == 0 {
                    out.push(ch);
                }
            }
            '(' | '[' | '{' => {
                if depth == 0 {
                    out.push(ch);
                }
                depth += 1;
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    out.push(ch);
                }
            }
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
        prev = ch;
    }
    out
}

/// One argument of a call site, with byte offsets into the scanned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argument<'a> {
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

impl Argument<'_> {
    /// Split `name = value` into its parts if this is a named argument.
    pub fn named(&self) -> Option<(&str, &str)> {
        let eq = self.text.find('=')?;
        let (name, rest) = (self.text[..eq].trim(), &self.text[eq + 1..]);
        if rest.starts_with('=') || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return None;
        }
        Some((name, rest.trim()))
    }

    /// Byte offset of the trimmed argument text.
    pub fn trimmed_start(&self) -> usize {
        self.start + (self.text.len() - self.text.trim_start().len())
    }
}

/// Split the arguments of the call whose `(` is at byte `open` in `line`.
/// Commas nested in brackets, generics-free parentheses and quotes do not
/// split. An unbalanced call runs to the end of the line.
pub fn call_arguments(line: &str, open: usize) -> Vec<Argument<'_>> {
    let mut args = Vec::new();
    let Some(body) = line.get(open + 1..) else {
        return args;
    };
    let base = open + 1;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0usize;
    let mut prev = '\0';
    let mut end = body.len();

    for (i, ch) in body.char_indices() {
        if let Some(q) = quote {
            if ch == q && prev != '\\' {
                quote = None;
            }
            prev = if prev == '\\' { '\0' } else { ch };
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            ')' => {
                end = i;
                break;
            }
            ',' if depth == 0 => {
                args.push(Argument {
                    start: base + start,
                    end: base + i,
                    text: &body[start..i],
                });
                start = i + 1;
            }
            _ => {}
        }
        prev = ch;
    }
    let last = &body[start..end];
    if !last.trim().is_empty() || !args.is_empty() {
        args.push(Argument {
            start: base + start,
            end: base + end,
            text: last,
        });
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn resolution_priority() {
        let tracked = defs(&[("p1", "Individual"), ("inds", "Individual")]);
        assert_eq!(resolve_class_name("p1", &tracked), Some("Individual"));
        assert_eq!(resolve_class_name("inds", &tracked), Some("Individual"));
        assert_eq!(resolve_class_name("sim", &tracked), Some("Species"));
        assert_eq!(resolve_class_name("m3", &tracked), Some("MutationType"));
        assert_eq!(resolve_class_name("g1", &tracked), Some("GenomicElementType"));
        assert_eq!(resolve_class_name("i2", &tracked), Some("InteractionType"));
        assert_eq!(resolve_class_name("p2", &tracked), Some("Subpopulation"));
        assert_eq!(resolve_class_name("x", &tracked), None);
        assert_eq!(resolve_class_name("pp1", &tracked), None);
    }

    #[test]
    fn infers_from_final_member() {
        let none = HashMap::new();
        let infer = |e: &str| infer_type_from_expression(e, &none);
        assert_eq!(infer("sim.addSubpop(\"p1\", 500)").as_deref(), Some("Subpopulation"));
        assert_eq!(infer("p1.sampleIndividuals(10)").as_deref(), Some("Individual"));
        assert_eq!(infer("p1.individuals[0].genome1").as_deref(), Some("Genome"));
        assert_eq!(infer("sim.mutationsOfType(m1)").as_deref(), Some("Mutation"));
        assert_eq!(infer("community.createLogFile(\"x.csv\")").as_deref(), Some("LogFile"));
        assert_eq!(infer("sample(p1.individuals, 5)").as_deref(), Some("Individual"));
        assert_eq!(infer("new Dictionary()").as_deref(), Some("Dictionary"));
        assert_eq!(infer("p1").as_deref(), Some("Subpopulation"));
    }

    #[test]
    fn numeric_and_logical_short_circuit() {
        let none = HashMap::new();
        let infer = |e: &str| infer_type_from_expression(e, &none);
        assert_eq!(infer("size(p1.individuals)"), None);
        assert_eq!(infer("p1.individuals.size() + 1"), None);
        assert_eq!(infer("p1.individualCount"), None);
        assert_eq!(infer("p1.individuals.size() > 10"), None);
        assert_eq!(infer("isNULL(p1.individuals)"), None);
        assert_eq!(infer("\"text\""), None);
        assert_eq!(infer("1e-5"), None);
    }

    #[test]
    fn splits_call_arguments() {
        let line = "f(a, g(b, c), [Ni x = NULL], \"s,t\")";
        let args = call_arguments(line, 1);
        let texts: Vec<&str> = args.iter().map(|a| a.text.trim()).collect();
        assert_eq!(texts, vec!["a", "g(b, c)", "[Ni x = NULL]", "\"s,t\""]);
        assert_eq!(&line[args[1].trimmed_start()..args[1].end], "g(b, c)");
        assert!(call_arguments("f()", 1).is_empty());
    }

    #[test]
    fn named_arguments() {
        let args = call_arguments("f(x, ends = NULL, a == b)", 1);
        assert_eq!(args[0].named(), None);
        assert_eq!(args[1].named(), Some(("ends", "NULL")));
        assert_eq!(args[2].named(), None);
    }
}
