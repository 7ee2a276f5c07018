//! Documentation dataset
//!
//! Read-only tables of functions, classes, callbacks, types and operators,
//! keyed by name. Entries carry the dialect they belong to so lookups can be
//! filtered by the [`Mode`] of the document being analysed.
//!
//! The dataset is built once at startup and shared immutably with the
//! tracking engine and the rule pipeline.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::signature::Signature;

/// Dialect an entry is documented under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Dialect {
    #[serde(alias = "SLiM", alias = "slim")]
    Slim,
    #[serde(alias = "eidos")]
    Eidos,
}

/// Analysis mode of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// SLiM scripts: both dialects are visible.
    #[default]
    Slim,
    /// Plain Eidos scripts: SLiM-specific entries are hidden.
    Eidos,
}

impl Mode {
    pub fn from_path(path: &str) -> Mode {
        if path.to_ascii_lowercase().ends_with(".eidos") {
            Mode::Eidos
        } else {
            Mode::Slim
        }
    }

    pub fn parse(name: &str) -> Option<Mode> {
        match name.to_ascii_lowercase().as_str() {
            "slim" => Some(Mode::Slim),
            "eidos" => Some(Mode::Eidos),
            _ => None,
        }
    }

    /// Whether an entry tagged `source` is visible in this mode. Untagged
    /// entries are visible everywhere.
    pub fn includes(self, source: Option<Dialect>) -> bool {
        match self {
            Mode::Slim => true,
            Mode::Eidos => source != Some(Dialect::Slim),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDoc {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<Dialect>,
}

impl FunctionDoc {
    pub fn parsed_signature(&self) -> Option<Signature> {
        Signature::parse(&self.signature).ok()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PropertyDoc {
    #[serde(default, rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassDoc {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub constructor: Option<FunctionDoc>,
    #[serde(default)]
    pub inherits: Option<String>,
    #[serde(default)]
    pub methods: HashMap<String, FunctionDoc>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyDoc>,
    #[serde(default)]
    pub source: Option<Dialect>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackDoc {
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<Dialect>,
}

/// Types and operators only carry a description.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryDoc {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub source: Option<Dialect>,
}

pub type DocTable<T> = HashMap<String, T>;

/// Read-only access to the documentation tables. Passing `None` as the mode
/// returns every entry.
pub trait DocumentationProvider: Send + Sync {
    fn functions(&self, mode: Option<Mode>) -> &DocTable<FunctionDoc>;
    fn classes(&self, mode: Option<Mode>) -> &DocTable<ClassDoc>;
    fn callbacks(&self, mode: Option<Mode>) -> &DocTable<CallbackDoc>;
    fn types(&self) -> &DocTable<EntryDoc>;
    fn operators(&self) -> &DocTable<EntryDoc>;
}

/// Result of looking a member up on a class.
#[derive(Debug, Clone, Copy)]
pub enum MemberLookup<'a> {
    Method(&'a FunctionDoc),
    Property(&'a PropertyDoc),
    /// The class is documented but has no such member.
    Missing,
    /// The class is not documented; nothing can be said.
    UnknownClass,
}

/// Name of the root class every documented class falls back to.
pub const BASE_CLASS: &str = "Object";

const MAX_INHERITANCE_DEPTH: usize = 16;

/// Find a method (`call == true`) or property on `class`, walking the
/// `inherits` chain and finally the [`BASE_CLASS`].
pub fn lookup_member<'a>(
    docs: &'a dyn DocumentationProvider,
    mode: Mode,
    class: &str,
    member: &str,
    call: bool,
) -> MemberLookup<'a> {
    let classes = docs.classes(Some(mode));
    if !classes.contains_key(class) {
        return MemberLookup::UnknownClass;
    }

    let mut chain: Vec<&str> = Vec::new();
    let mut current = Some(class);
    while let Some(name) = current {
        if chain.contains(&name) || chain.len() >= MAX_INHERITANCE_DEPTH {
            break;
        }
        chain.push(name);
        current = classes.get(name).and_then(|c| c.inherits.as_deref());
    }
    if !chain.contains(&BASE_CLASS) {
        chain.push(BASE_CLASS);
    }

    for name in chain {
        let Some(doc) = classes.get(name) else {
            continue;
        };
        if call {
            if let Some(method) = doc.methods.get(member) {
                return MemberLookup::Method(method);
            }
        } else if let Some(property) = doc.properties.get(member) {
            return MemberLookup::Property(property);
        }
    }
    MemberLookup::Missing
}

/// Every member name visible on `class`, including inherited ones, paired
/// with whether it is a method.
pub fn class_members<'a>(
    docs: &'a dyn DocumentationProvider,
    mode: Mode,
    class: &str,
) -> Vec<(&'a str, bool)> {
    let classes = docs.classes(Some(mode));
    let mut members = Vec::new();
    let mut current = Some(class);
    let mut visited: Vec<&str> = Vec::new();
    while let Some(name) = current {
        if visited.contains(&name) || visited.len() >= MAX_INHERITANCE_DEPTH {
            break;
        }
        visited.push(name);
        let Some(doc) = classes.get(name) else {
            break;
        };
        members.extend(doc.methods.keys().map(|k| (k.as_str(), true)));
        members.extend(doc.properties.keys().map(|k| (k.as_str(), false)));
        current = doc.inherits.as_deref();
    }
    members.sort_unstable();
    members.dedup();
    members
}

#[derive(Debug, Clone, Default)]
struct Tables {
    functions: DocTable<FunctionDoc>,
    classes: DocTable<ClassDoc>,
    callbacks: DocTable<CallbackDoc>,
}

/// The documentation dataset.
///
/// Two copies of the dialect-tagged tables are kept: one with every entry and
/// one restricted to Eidos, so mode filtering is a field access.
#[derive(Debug, Clone, Default)]
pub struct Documentation {
    all: Tables,
    eidos: Tables,
    types: DocTable<EntryDoc>,
    operators: DocTable<EntryDoc>,
}

/// The JSON files that make up a documentation directory, with the dialect
/// assigned to untagged entries.
const DOC_FILES: &[(&str, DocKind, Dialect)] = &[
    ("eidos_functions.json", DocKind::Functions, Dialect::Eidos),
    ("slim_functions.json", DocKind::Functions, Dialect::Slim),
    ("eidos_classes.json", DocKind::Classes, Dialect::Eidos),
    ("slim_classes.json", DocKind::Classes, Dialect::Slim),
    ("slim_callbacks.json", DocKind::Callbacks, Dialect::Slim),
    ("eidos_types.json", DocKind::Types, Dialect::Eidos),
    ("eidos_operators.json", DocKind::Operators, Dialect::Eidos),
];

const BUILTIN: &[(&str, &str)] = &[
    (
        "eidos_functions.json",
        include_str!("../data/eidos_functions.json"),
    ),
    (
        "slim_functions.json",
        include_str!("../data/slim_functions.json"),
    ),
    ("eidos_classes.json", include_str!("../data/eidos_classes.json")),
    ("slim_classes.json", include_str!("../data/slim_classes.json")),
    (
        "slim_callbacks.json",
        include_str!("../data/slim_callbacks.json"),
    ),
    ("eidos_types.json", include_str!("../data/eidos_types.json")),
    (
        "eidos_operators.json",
        include_str!("../data/eidos_operators.json"),
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocKind {
    Functions,
    Classes,
    Callbacks,
    Types,
    Operators,
}

fn parse_table<T: for<'de> Deserialize<'de>>(file: &str, json: &str) -> Result<DocTable<T>> {
    serde_json::from_str(json).map_err(|source| Error::Json {
        file: file.to_string(),
        source,
    })
}

impl Documentation {
    pub fn new() -> Self {
        Self::default()
    }

    /// The dataset shipped inside the binary.
    pub fn builtin() -> Result<Self> {
        let mut docs = Documentation::new();
        for (file, json) in BUILTIN {
            docs.load_file(file, json)?;
        }
        Ok(docs)
    }

    /// Load every known file found in `dir`. Missing files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::MissingDocs(dir.to_path_buf()));
        }
        let mut docs = Documentation::new();
        for (file, _, _) in DOC_FILES {
            let path = dir.join(file);
            if !path.exists() {
                warn!(file = %path.display(), "documentation file missing");
                continue;
            }
            let json = fs::read_to_string(&path)?;
            docs.load_file(file, &json)?;
        }
        Ok(docs)
    }

    fn load_file(&mut self, file: &str, json: &str) -> Result<()> {
        let Some(&(_, kind, dialect)) = DOC_FILES.iter().find(|(name, _, _)| *name == file) else {
            return Ok(());
        };
        match kind {
            DocKind::Functions => {
                for (name, mut doc) in parse_table::<FunctionDoc>(file, json)? {
                    doc.source = doc.source.or(Some(dialect));
                    self.add_function(name, doc);
                }
            }
            DocKind::Classes => {
                for (name, mut doc) in parse_table::<ClassDoc>(file, json)? {
                    doc.source = doc.source.or(Some(dialect));
                    self.add_class(name, doc);
                }
            }
            DocKind::Callbacks => {
                for (name, mut doc) in parse_table::<CallbackDoc>(file, json)? {
                    doc.source = doc.source.or(Some(dialect));
                    self.add_callback(name, doc);
                }
            }
            DocKind::Types => self.types.extend(parse_table::<EntryDoc>(file, json)?),
            DocKind::Operators => self.operators.extend(parse_table::<EntryDoc>(file, json)?),
        }
        debug!(file, "loaded documentation");
        Ok(())
    }

    pub fn add_function(&mut self, name: impl Into<String>, doc: FunctionDoc) {
        let name = name.into();
        if Mode::Eidos.includes(doc.source) {
            self.eidos.functions.insert(name.clone(), doc.clone());
        }
        self.all.functions.insert(name, doc);
    }

    pub fn add_class(&mut self, name: impl Into<String>, doc: ClassDoc) {
        let name = name.into();
        if Mode::Eidos.includes(doc.source) {
            self.eidos.classes.insert(name.clone(), doc.clone());
        }
        self.all.classes.insert(name, doc);
    }

    pub fn add_callback(&mut self, name: impl Into<String>, doc: CallbackDoc) {
        let name = name.into();
        if Mode::Eidos.includes(doc.source) {
            self.eidos.callbacks.insert(name.clone(), doc.clone());
        }
        self.all.callbacks.insert(name, doc);
    }

    fn tables(&self, mode: Option<Mode>) -> &Tables {
        match mode {
            Some(Mode::Eidos) => &self.eidos,
            Some(Mode::Slim) | None => &self.all,
        }
    }
}

impl DocumentationProvider for Documentation {
    fn functions(&self, mode: Option<Mode>) -> &DocTable<FunctionDoc> {
        &self.tables(mode).functions
    }

    fn classes(&self, mode: Option<Mode>) -> &DocTable<ClassDoc> {
        &self.tables(mode).classes
    }

    fn callbacks(&self, mode: Option<Mode>) -> &DocTable<CallbackDoc> {
        &self.tables(mode).callbacks
    }

    fn types(&self) -> &DocTable<EntryDoc> {
        &self.types
    }

    fn operators(&self) -> &DocTable<EntryDoc> {
        &self.operators
    }
}
