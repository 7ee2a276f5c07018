//! Tracking engine
//!
//! One forward pass over a scrubbed document that recovers an approximate
//! symbol table: which ids and constants are defined and where, which class
//! each variable holds, which callback owns each line and which model type
//! the script declares. The result is a plain value; running the pass twice
//! on the same text produces equal states.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::trace;

use crate::callbacks::{pseudo_parameters, CallbackBlock, CallbackHeader, CallbackScope};
use crate::docs::{DocumentationProvider, Mode};
use crate::lexer::{net_count, remove_comments_and_strings_from_line, ScrubbedSource};
use crate::resolver::{call_arguments, infer_type_from_expression, IdClass};
use crate::signature::Signature;

/// Lines scanned past a `defineConstant(` whose value is not on the same line.
pub const DEFAULT_CONSTANT_LOOKAHEAD: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModelType {
    Wf,
    NonWf,
    /// No `initializeSLiMModelType()` call; SLiM runs such models as WF.
    #[default]
    Unknown,
}

impl ModelType {
    pub fn is_non_wf(self) -> bool {
        self == ModelType::NonWf
    }
}

/// What a definition site defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DefinitionKind {
    Constant,
    Global,
    MutationType,
    GenomicElementType,
    InteractionType,
    Subpopulation,
    ScriptBlock,
    Species,
    Function,
}

impl DefinitionKind {
    pub fn noun(self) -> &'static str {
        match self {
            DefinitionKind::Constant => "constant",
            DefinitionKind::Global => "global",
            DefinitionKind::MutationType => "mutation type",
            DefinitionKind::GenomicElementType => "genomic element type",
            DefinitionKind::InteractionType => "interaction type",
            DefinitionKind::Subpopulation => "subpopulation",
            DefinitionKind::ScriptBlock => "script block",
            DefinitionKind::Species => "species",
            DefinitionKind::Function => "function",
        }
    }

    fn of_id(class: IdClass) -> DefinitionKind {
        match class {
            IdClass::Subpopulation => DefinitionKind::Subpopulation,
            IdClass::MutationType => DefinitionKind::MutationType,
            IdClass::GenomicElementType => DefinitionKind::GenomicElementType,
            IdClass::InteractionType => DefinitionKind::InteractionType,
            IdClass::ScriptBlock => DefinitionKind::ScriptBlock,
        }
    }
}

/// One definition site, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    pub line: usize,
    /// Byte offset of the defined name on its line.
    pub column: usize,
}

/// The recovered symbol table of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingState {
    /// Identifier to class name, last write wins.
    pub instance_definitions: HashMap<String, String>,
    pub defined_constants: BTreeSet<String>,
    pub defined_globals: BTreeSet<String>,
    pub mutation_types: BTreeSet<String>,
    pub genomic_element_types: BTreeSet<String>,
    pub interaction_types: BTreeSet<String>,
    pub subpopulations: BTreeSet<String>,
    pub script_blocks: BTreeSet<String>,
    pub species: BTreeSet<String>,
    /// User-defined function name to the line it is defined on.
    pub user_functions: BTreeMap<String, usize>,
    pub model_type: ModelType,
    /// Callback owning each line; one entry per line of the document.
    pub callback_context_by_line: Vec<Option<String>>,
    pub callback_blocks: Vec<CallbackBlock>,
    /// Headers recognized outside any block, by line.
    pub callback_headers: BTreeMap<usize, CallbackHeader>,
    /// Id families that the script builds from computed values.
    pub dynamic_ids: BTreeSet<IdClass>,
    /// Every definition site, including repeats.
    pub definitions: Vec<Definition>,
}

impl TrackingState {
    pub fn context_at(&self, line: usize) -> Option<&str> {
        self.callback_context_by_line
            .get(line)
            .and_then(|c| c.as_deref())
    }

    /// Defined ids of one family.
    pub fn ids(&self, class: IdClass) -> &BTreeSet<String> {
        match class {
            IdClass::Subpopulation => &self.subpopulations,
            IdClass::MutationType => &self.mutation_types,
            IdClass::GenomicElementType => &self.genomic_element_types,
            IdClass::InteractionType => &self.interaction_types,
            IdClass::ScriptBlock => &self.script_blocks,
        }
    }

    fn ids_mut(&mut self, class: IdClass) -> &mut BTreeSet<String> {
        match class {
            IdClass::Subpopulation => &mut self.subpopulations,
            IdClass::MutationType => &mut self.mutation_types,
            IdClass::GenomicElementType => &mut self.genomic_element_types,
            IdClass::InteractionType => &mut self.interaction_types,
            IdClass::ScriptBlock => &mut self.script_blocks,
        }
    }

    fn record(&mut self, definition: Definition) {
        match definition.kind {
            DefinitionKind::Constant => {
                self.defined_constants.insert(definition.name.clone());
            }
            DefinitionKind::Global => {
                self.defined_globals.insert(definition.name.clone());
            }
            DefinitionKind::Species => {
                self.species.insert(definition.name.clone());
            }
            DefinitionKind::Function => {
                self.user_functions
                    .entry(definition.name.clone())
                    .or_insert(definition.line);
            }
            kind => {
                if let Some(class) = IdClass::of_identifier(&definition.name) {
                    self.ids_mut(class).insert(definition.name.clone());
                    if DefinitionKind::of_id(class) == kind && class != IdClass::ScriptBlock {
                        self.instance_definitions
                            .insert(definition.name.clone(), class.class_name().to_string());
                    }
                }
            }
        }
        self.definitions.push(definition);
    }
}

static DEFINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(defineConstant|defineGlobal)\s*\(\s*(?:symbol\s*=\s*)?(?:"(\w+)"|'(\w+)'|([^,)]*))"#)
        .unwrap()
});

static INIT_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(initializeMutationTypeNuc|initializeMutationType|initializeGenomicElementType|initializeInteractionType)\s*\(\s*(?:id\s*=\s*)?(?:"([mgi]\d+)"|'([mgi]\d+)'|(\d+)\s*(?:[,)]|$)|([^,)]*))"#,
    )
    .unwrap()
});

static SUBPOP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\.(addSubpopSplit|addSubpop)\s*\(\s*(?:subpopID\s*=\s*)?(?:"(p\d+)"|'(p\d+)'|(\d+)\s*(?:[,)]|$)|([^,)]*))"#,
    )
    .unwrap()
});

/// The twelve registration calls that create script blocks.
static REGISTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\.(register(?:First|Early|Late)Event|register(?:FitnessEffect|Interaction|MateChoice|ModifyChild|Mutation|MutationEffect|Recombination|Reproduction|Survival)Callback)\s*\(\s*(?:id\s*=\s*)?(?:"(s\d+)"|'(s\d+)'|(\d+)\s*(?:[,)]|$)|(NULL)\b|([^,)]*))"#,
    )
    .unwrap()
});

static SPECIES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*species\s+([A-Za-z_]\w*)\s+initialize\s*\(").unwrap()
});

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*function\s*(\([^)]*\)\s*([A-Za-z_]\w*)\s*\(.*)$").unwrap()
});

static MODEL_TYPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\binitializeSLiMModelType\s*\(\s*(?:modelType\s*=\s*)?["'](WF|nonWF)["']"#)
        .unwrap()
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[;{})]|\belse)\s*([A-Za-z_]\w*)\s*=([^=;][^;]*)").unwrap()
});

static FOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bfor\s*\(").unwrap());

static FOR_IN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_]\w*)\s+in\s+(.+)$").unwrap());

/// Quoted id prefix concatenated with a computed value.
static DYNAMIC_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bpaste0?\s*\(\s*["']([pmgis])["']|["']([pmgis])["']\s*\+"#).unwrap()
});

static POPULATION_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.readFromPopulationFile\s*\(").unwrap());

static GENERIC_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^N?o<(\w+)>\$?$").unwrap());

/// Runs the tracking pass.
pub struct TrackingEngine<'a> {
    docs: &'a dyn DocumentationProvider,
    mode: Mode,
    constant_lookahead: usize,
}

impl<'a> TrackingEngine<'a> {
    pub fn new(docs: &'a dyn DocumentationProvider, mode: Mode) -> Self {
        TrackingEngine {
            docs,
            mode,
            constant_lookahead: DEFAULT_CONSTANT_LOOKAHEAD,
        }
    }

    pub fn with_constant_lookahead(mut self, lines: usize) -> Self {
        self.constant_lookahead = lines;
        self
    }

    pub fn track(&self, source: &ScrubbedSource) -> TrackingState {
        let mut state = TrackingState {
            callback_context_by_line: Vec::with_capacity(source.len()),
            ..TrackingState::default()
        };
        let mut scope = CallbackScope::Outside;

        for (index, line, cleaned) in source.iter() {
            let transition = scope.advance(index, cleaned);
            if let Some(header) = transition.header {
                state.callback_headers.insert(index, header);
            }
            if let Some(name) = &transition.entered {
                for param in pseudo_parameters(name) {
                    if let Some(class) = param.class {
                        state
                            .instance_definitions
                            .insert(param.name.to_string(), class.to_string());
                    }
                }
            }
            if let Some(block) = transition.closed {
                state.callback_blocks.push(block);
            }
            state.callback_context_by_line.push(transition.context);
            scope = transition.next;

            for definition in definitions_on_line(source, index) {
                state.record(definition);
            }
            self.track_model_type(&mut state, source, index);
            self.track_dynamic_ids(&mut state, source, index);
            self.track_constant_types(&mut state, source, index);
            self.track_assignments(&mut state, line, cleaned);
            self.track_function_parameters(&mut state, cleaned);
        }

        // a block still open at end of document owns the rest of the lines
        if let CallbackScope::Inside {
            name, start_line, ..
        } = scope
        {
            state.callback_blocks.push(CallbackBlock {
                name,
                start_line,
                end_line: source.len().saturating_sub(1),
            });
        }

        trace!(
            lines = source.len(),
            definitions = state.definitions.len(),
            blocks = state.callback_blocks.len(),
            "tracking pass complete"
        );
        state
    }

    fn track_model_type(&self, state: &mut TrackingState, source: &ScrubbedSource, index: usize) {
        let line = source.line(index);
        for caps in MODEL_TYPE_RE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if !source.is_code_at(index, whole.start()) {
                continue;
            }
            state.model_type = if &caps[1] == "nonWF" {
                ModelType::NonWf
            } else {
                ModelType::Wf
            };
        }
    }

    fn track_dynamic_ids(
        &self,
        state: &mut TrackingState,
        source: &ScrubbedSource,
        index: usize,
    ) {
        let line = source.line(index);
        for caps in DYNAMIC_ID_RE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            // `paste0(` starts in code; `"p" +` ends in code
            let in_code = source.is_code_at(index, whole.start())
                || source.is_code_at(index, whole.end().saturating_sub(1));
            if !in_code {
                continue;
            }
            let prefix = caps
                .get(1)
                .or_else(|| caps.get(2))
                .and_then(|m| m.as_str().chars().next());
            if let Some(class) = prefix.and_then(IdClass::from_prefix) {
                state.dynamic_ids.insert(class);
            }
        }
        for m in POPULATION_FILE_RE.find_iter(line) {
            if source.is_code_at(index, m.start()) {
                state.dynamic_ids.insert(IdClass::Subpopulation);
            }
        }
        let id_calls = [
            (&*INIT_ID_RE, 5),
            (&*SUBPOP_RE, 5),
            (&*REGISTER_RE, 6),
        ];
        for (re, computed_group) in id_calls {
            for caps in re.captures_iter(line) {
                let Some(whole) = caps.get(0) else { continue };
                if !source.is_code_at(index, whole.start()) {
                    continue;
                }
                let computed = caps
                    .get(computed_group)
                    .map(|m| m.as_str().trim())
                    .filter(|text| !text.is_empty());
                if computed.is_some() {
                    if let Some(class) = id_class_of_call(&caps[1]) {
                        state.dynamic_ids.insert(class);
                    }
                }
            }
        }
    }

    /// Infer the class of `defineConstant`/`defineGlobal` values, looking past
    /// the current line for values that start on a later one.
    fn track_constant_types(
        &self,
        state: &mut TrackingState,
        source: &ScrubbedSource,
        index: usize,
    ) {
        let line = source.line(index);
        for caps in DEFINE_RE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if !source.is_code_at(index, whole.start()) {
                continue;
            }
            let Some(name) = caps.get(2).or_else(|| caps.get(3)) else {
                continue;
            };
            let Some(open) = line[whole.start()..].find('(').map(|o| o + whole.start()) else {
                continue;
            };
            let args = call_arguments(line, open);
            if let Some(value) = args.get(1).map(|a| a.text.trim()).filter(|v| !v.is_empty()) {
                if let Some(class) = self.infer(value, &state.instance_definitions) {
                    state.instance_definitions.insert(name.as_str().to_string(), class);
                }
                continue;
            }
            if line[open..].contains(')') {
                continue;
            }

            for next in (index + 1..source.len()).take(self.constant_lookahead) {
                let text = source.line(next).trim();
                let value = text.trim_start_matches(',').trim_end_matches(';');
                let value = trim_unbalanced_close(value).trim_end_matches(',').trim();
                if !value.is_empty() {
                    if let Some(class) = self.infer(value, &state.instance_definitions) {
                        state.instance_definitions.insert(name.as_str().to_string(), class);
                        break;
                    }
                }
                if source.cleaned(next).contains(')') {
                    break;
                }
            }
        }
    }

    fn track_assignments(&self, state: &mut TrackingState, line: &str, cleaned: &str) {
        for caps in ASSIGN_RE.captures_iter(cleaned) {
            let (Some(target), Some(value)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            // evaluate on the original text so string arguments survive
            let expr = line.get(value.start()..value.end()).unwrap_or(value.as_str());
            let inferred = self.infer(expr, &state.instance_definitions);
            assign(state, target.as_str(), inferred);
        }
        for m in FOR_RE.find_iter(cleaned) {
            let Some(header) = call_arguments(line, m.end() - 1).into_iter().next() else {
                continue;
            };
            let Some(caps) = FOR_IN_RE.captures(header.text) else {
                continue;
            };
            let inferred = self.infer(&caps[2], &state.instance_definitions);
            assign(state, &caps[1], inferred);
        }
    }

    fn track_function_parameters(&self, state: &mut TrackingState, cleaned: &str) {
        let Some(caps) = FUNCTION_RE.captures(cleaned) else {
            return;
        };
        let Ok(signature) = Signature::parse(&caps[1]) else {
            return;
        };
        for param in signature.parameters {
            if let Some(generic) = GENERIC_CLASS_RE.captures(&param.type_spec) {
                state
                    .instance_definitions
                    .insert(param.name, generic[1].to_string());
            }
        }
    }

    /// Resolver inference plus documented class constructors.
    fn infer(&self, expr: &str, defs: &HashMap<String, String>) -> Option<String> {
        if let Some(class) = infer_type_from_expression(expr, defs) {
            return Some(class);
        }
        let expr = expr.trim();
        let name_end = expr.find('(')?;
        let name = expr[..name_end].trim();
        let doc = self.docs.classes(Some(self.mode)).get(name)?;
        doc.constructor.as_ref().map(|_| name.to_string())
    }
}

fn assign(state: &mut TrackingState, target: &str, inferred: Option<String>) {
    match inferred {
        Some(class) => {
            state.instance_definitions.insert(target.to_string(), class);
        }
        None => {
            state.instance_definitions.remove(target);
        }
    }
}

/// Strip trailing `)` that close a call opened on an earlier line.
fn trim_unbalanced_close(value: &str) -> &str {
    let mut value = value.trim_end();
    while value.ends_with(')') && net_count(&remove_comments_and_strings_from_line(value), '(', ')') < 0 {
        value = value[..value.len() - 1].trim_end();
    }
    value
}

fn id_class_of_call(call: &str) -> Option<IdClass> {
    match call {
        "initializeMutationType" | "initializeMutationTypeNuc" => Some(IdClass::MutationType),
        "initializeGenomicElementType" => Some(IdClass::GenomicElementType),
        "initializeInteractionType" => Some(IdClass::InteractionType),
        "addSubpop" | "addSubpopSplit" => Some(IdClass::Subpopulation),
        c if c.starts_with("register") => Some(IdClass::ScriptBlock),
        _ => None,
    }
}

/// Literal id from a quoted (`"m1"`) or numeric (`1`) capture pair.
fn literal_id(
    caps: &Captures,
    quoted: &[usize],
    numeric: usize,
    class: IdClass,
) -> Option<(String, usize)> {
    for &group in quoted {
        if let Some(m) = caps.get(group) {
            return Some((m.as_str().to_string(), m.start()));
        }
    }
    caps.get(numeric)
        .map(|m| (format!("{}{}", class.prefix(), m.as_str()), m.start()))
}

/// Every definition site on line `index`, in column order.
pub fn definitions_on_line(source: &ScrubbedSource, index: usize) -> Vec<Definition> {
    let line = source.line(index);
    let cleaned = source.cleaned(index);
    let mut found = Vec::new();
    let mut push = |kind, name: String, column| {
        found.push(Definition {
            kind,
            name,
            line: index,
            column,
        })
    };

    for caps in DEFINE_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if !source.is_code_at(index, whole.start()) {
            continue;
        }
        if let Some(name) = caps.get(2).or_else(|| caps.get(3)) {
            let kind = if &caps[1] == "defineGlobal" {
                DefinitionKind::Global
            } else {
                DefinitionKind::Constant
            };
            push(kind, name.as_str().to_string(), name.start());
        }
    }

    for caps in INIT_ID_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if !source.is_code_at(index, whole.start()) {
            continue;
        }
        let Some(class) = id_class_of_call(&caps[1]) else {
            continue;
        };
        if let Some((name, column)) = literal_id(&caps, &[2, 3], 4, class) {
            if IdClass::of_identifier(&name) == Some(class) {
                push(DefinitionKind::of_id(class), name, column);
            }
        }
    }

    for caps in SUBPOP_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if !source.is_code_at(index, whole.start()) {
            continue;
        }
        if let Some((name, column)) = literal_id(&caps, &[2, 3], 4, IdClass::Subpopulation) {
            push(DefinitionKind::Subpopulation, name, column);
        }
    }

    for caps in REGISTER_RE.captures_iter(line) {
        let Some(whole) = caps.get(0) else { continue };
        if !source.is_code_at(index, whole.start()) {
            continue;
        }
        if let Some((name, column)) = literal_id(&caps, &[2, 3], 4, IdClass::ScriptBlock) {
            push(DefinitionKind::ScriptBlock, name, column);
        }
    }

    if let Some(header) = crate::callbacks::parse_header(cleaned) {
        if let Some(block) = &header.block_id {
            if let Some(column) = cleaned.find(block.as_str()) {
                push(DefinitionKind::ScriptBlock, block.clone(), column);
            }
        }
    }

    if let Some(caps) = SPECIES_RE.captures(cleaned) {
        if let Some(name) = caps.get(1) {
            push(DefinitionKind::Species, name.as_str().to_string(), name.start());
        }
    }

    if let Some(caps) = FUNCTION_RE.captures(cleaned) {
        if let Some(name) = caps.get(2) {
            push(DefinitionKind::Function, name.as_str().to_string(), name.start());
        }
    }

    found.sort_by_key(|d| d.column);
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::Documentation;

    fn track(text: &str) -> TrackingState {
        let docs = Documentation::builtin().unwrap();
        TrackingEngine::new(&docs, Mode::Slim).track(&ScrubbedSource::new(text))
    }

    const MODEL: &str = r#"initialize() {
    initializeSLiMModelType("nonWF");
    defineConstant("K", 100);
    initializeMutationType("m1", 0.5, "f", 0.0);
    initializeMutationType(2, 0.5, "f", 0.0);
    initializeGenomicElementType("g1", m1, 1.0);
    initializeGenomicElement(g1, 0, 99999);
    initializeInteractionType(1, "xy", maxDistance=0.3);
}
1 early() {
    sim.addSubpop("p1", K);
    inds = p1.individuals;
}
reproduction() {
    subpop.addCrossed(individual, subpop.sampleIndividuals(1));
}
"#;

    #[test]
    fn collects_definitions() {
        let state = track(MODEL);
        assert!(state.defined_constants.contains("K"));
        assert!(state.mutation_types.contains("m1"));
        assert!(state.mutation_types.contains("m2"));
        assert!(state.genomic_element_types.contains("g1"));
        assert!(state.interaction_types.contains("i1"));
        assert!(state.subpopulations.contains("p1"));
        assert_eq!(state.model_type, ModelType::NonWf);
        assert_eq!(state.instance_definitions.get("inds").map(String::as_str), Some("Individual"));
    }

    #[test]
    fn every_line_has_a_context() {
        let state = track(MODEL);
        let lines = MODEL.split('\n').count();
        assert_eq!(state.callback_context_by_line.len(), lines);
        assert_eq!(state.context_at(1), Some("initialize"));
        assert_eq!(state.context_at(10), Some("early"));
        assert_eq!(state.context_at(14), Some("reproduction"));
        assert_eq!(state.context_at(16), None);
        assert_eq!(state.callback_blocks.len(), 3);
    }

    #[test]
    fn tracking_is_idempotent() {
        assert_eq!(track(MODEL), track(MODEL));
    }

    #[test]
    fn multi_line_constant_value() {
        let text = "defineConstant(\"POP\",\n    sim.addSubpop(\"p9\", 10)\n);";
        let state = track(text);
        assert_eq!(state.instance_definitions.get("POP").map(String::as_str), Some("Subpopulation"));
    }

    #[test]
    fn lookahead_is_bounded() {
        let text = "defineConstant(\"POP\",\n\n\n\n    p1.individuals);";
        let docs = Documentation::builtin().unwrap();
        let source = ScrubbedSource::new(text);
        let short = TrackingEngine::new(&docs, Mode::Slim)
            .with_constant_lookahead(2)
            .track(&source);
        assert!(!short.instance_definitions.contains_key("POP"));
        let long = TrackingEngine::new(&docs, Mode::Slim).track(&source);
        assert_eq!(long.instance_definitions.get("POP").map(String::as_str), Some("Individual"));
    }

    #[test]
    fn reassignment_to_unknown_forgets_class() {
        let state = track("x = p1.individuals;\nx = 5;");
        assert!(!state.instance_definitions.contains_key("x"));
    }

    #[test]
    fn constructors_and_for_loops() {
        let state = track("d = Dictionary(\"a\", 1);\nfor (ind in p1.individuals) {\n}\nn = new DataFrame();");
        assert_eq!(state.instance_definitions.get("d").map(String::as_str), Some("Dictionary"));
        assert_eq!(state.instance_definitions.get("ind").map(String::as_str), Some("Individual"));
        assert_eq!(state.instance_definitions.get("n").map(String::as_str), Some("DataFrame"));
    }

    #[test]
    fn dynamic_ids_are_detected() {
        let state = track("for (i in 1:3) sim.addSubpop(i, 10);\nx = paste0(\"m\", 1);");
        assert!(state.dynamic_ids.contains(&IdClass::Subpopulation));
        assert!(state.dynamic_ids.contains(&IdClass::MutationType));
        assert!(!state.dynamic_ids.contains(&IdClass::GenomicElementType));
    }

    #[test]
    fn arithmetic_on_a_numeric_id_is_computed() {
        let state = track(
            "for (i in 0:1)\n    initializeMutationType(1+i, 0.5, \"f\", 0.0);\ninitializeGenomicElementType(2 , m1, 1.0);",
        );
        assert!(!state.mutation_types.contains("m1"));
        assert!(state.dynamic_ids.contains(&IdClass::MutationType));
        assert!(state.genomic_element_types.contains("g2"));
        assert!(!state.dynamic_ids.contains(&IdClass::GenomicElementType));
    }

    #[test]
    fn script_blocks_and_functions() {
        let state = track(
            "s1 10 late() {\n}\ncommunity.registerLateEvent(\"s2\", \"{}\", 5);\nfunction (void)helper(o<Individual> who) {\n}",
        );
        assert!(state.script_blocks.contains("s1"));
        assert!(state.script_blocks.contains("s2"));
        assert_eq!(state.user_functions.get("helper"), Some(&3));
        assert_eq!(state.instance_definitions.get("who").map(String::as_str), Some("Individual"));
    }

    #[test]
    fn definitions_in_comments_and_strings_are_ignored() {
        let state = track("// defineConstant(\"A\", 1);\nx = \"defineConstant('B', 2)\";");
        assert!(state.defined_constants.is_empty());
    }

    #[test]
    fn pseudo_parameters_are_typed_on_entry() {
        let state = track("mutationEffect(m1) {\n  return effect;\n}");
        assert_eq!(state.instance_definitions.get("mut").map(String::as_str), Some("Mutation"));
    }

    #[test]
    fn species_headers() {
        let state = track("species fox initialize() {\n}\nticks fox 1 early() {\n}");
        assert!(state.species.contains("fox"));
    }
}
