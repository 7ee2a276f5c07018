//! Callback headers and callback scope tracking
//!
//! A SLiM script is a sequence of blocks such as `1:100 late() { ... }` or
//! `s2 mutationEffect(m1) { ... }`. [`parse_header`] recognizes the header of
//! such a block on a scrubbed line, and [`CallbackScope`] follows the brace
//! depth of the block as the tracking engine walks the document.

use std::sync::LazyLock;

use phf::phf_map;
use regex::Regex;

use crate::lexer::net_count;

/// Every callback keyword SLiM recognizes.
pub const CALLBACK_NAMES: &[&str] = &[
    "initialize",
    "first",
    "early",
    "late",
    "fitnessEffect",
    "mutationEffect",
    "mateChoice",
    "modifyChild",
    "recombination",
    "interaction",
    "reproduction",
    "mutation",
    "survival",
];

/// Events that take no parameters.
pub const ZERO_ARITY_EVENTS: &[&str] = &["initialize", "first", "early", "late"];

/// Name recorded for a deprecated bare tick block (`10 { ... }`), which SLiM
/// runs as an `early()` event.
pub const IMPLICIT_EVENT: &str = "early";

/// One implicit variable defined inside a callback, with its class when it
/// holds an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoParameter {
    pub name: &'static str,
    pub class: Option<&'static str>,
}

const fn param(name: &'static str, class: Option<&'static str>) -> PseudoParameter {
    PseudoParameter { name, class }
}

const IND: Option<&str> = Some("Individual");
const SUBPOP: Option<&str> = Some("Subpopulation");
const GENOME: Option<&str> = Some("Genome");
const MUT: Option<&str> = Some("Mutation");

/// Pseudo-parameters provided by each callback kind.
pub static PSEUDO_PARAMETERS: phf::Map<&'static str, &'static [PseudoParameter]> = phf_map! {
    "mutationEffect" => &[
        param("mut", MUT),
        param("homozygous", None),
        param("effect", None),
        param("individual", IND),
        param("subpop", SUBPOP),
    ],
    "fitnessEffect" => &[param("individual", IND), param("subpop", SUBPOP)],
    "mateChoice" => &[
        param("individual", IND),
        param("subpop", SUBPOP),
        param("sourceSubpop", SUBPOP),
        param("weights", None),
    ],
    "modifyChild" => &[
        param("child", IND),
        param("parent1", IND),
        param("parent2", IND),
        param("isCloning", None),
        param("isSelfing", None),
        param("subpop", SUBPOP),
        param("sourceSubpop", SUBPOP),
    ],
    "recombination" => &[
        param("individual", IND),
        param("genome1", GENOME),
        param("genome2", GENOME),
        param("subpop", SUBPOP),
        param("breakpoints", None),
    ],
    "interaction" => &[
        param("distance", None),
        param("strength", None),
        param("receiver", IND),
        param("exerter", IND),
        param("subpop", SUBPOP),
    ],
    "reproduction" => &[param("individual", IND), param("subpop", SUBPOP)],
    "mutation" => &[
        param("mut", MUT),
        param("genome", GENOME),
        param("element", Some("GenomicElement")),
        param("originalNuc", None),
        param("parent", IND),
        param("subpop", SUBPOP),
    ],
    "survival" => &[
        param("individual", IND),
        param("subpop", SUBPOP),
        param("surviving", None),
        param("fitness", None),
        param("draw", None),
    ],
};

/// Pseudo-parameters of `callback`, empty for events and unknown names.
pub fn pseudo_parameters(callback: &str) -> &'static [PseudoParameter] {
    PSEUDO_PARAMETERS.get(callback).copied().unwrap_or(&[])
}

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?:(?P<block>s\d+)\s+)?
        (?:(?P<kind>species|ticks)\s+(?P<species>[A-Za-z_]\w*)\s+)?
        (?:(?P<ticks>[\w.]+(?:\s*:\s*[\w.]*)?|:\s*[\w.]+)\s+)?
        (?P<name>initialize|first|early|late|fitnessEffect|mutationEffect|mateChoice
            |modifyChild|recombination|interaction|reproduction|mutation|survival)
        \s*\((?P<params>[^)]*)\)
        \s*(?P<brace>\{)?",
    )
    .unwrap()
});

static BARE_TICK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(?P<block>s\d+)\s+)?(?P<ticks>\d+(?:\s*:\s*\d*)?)\s*(?P<brace>\{)").unwrap()
});

/// A recognized callback header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackHeader {
    pub name: String,
    /// Byte offset of the callback keyword (or the tick range for a bare block).
    pub name_start: usize,
    pub block_id: Option<String>,
    /// `species` or `ticks` specifier, with the species name.
    pub species: Option<(String, String)>,
    pub ticks: Option<String>,
    pub params: String,
    /// Byte offset of the text between the parentheses.
    pub params_start: usize,
    /// Byte offset just past the opening brace, if on this line.
    pub brace_end: Option<usize>,
    /// Deprecated `10 { ... }` form with no callback keyword.
    pub bare: bool,
}

/// Recognize a callback header at the start of a scrubbed line.
pub fn parse_header(cleaned: &str) -> Option<CallbackHeader> {
    if let Some(caps) = HEADER_RE.captures(cleaned) {
        let name = caps.name("name")?;
        let params = caps.name("params")?;
        let species = match (caps.name("kind"), caps.name("species")) {
            (Some(kind), Some(species)) => {
                Some((kind.as_str().to_string(), species.as_str().to_string()))
            }
            _ => None,
        };
        // `s1 early()` with no ticks puts the block id in the ticks slot
        let (block_id, ticks) = match (caps.name("block"), caps.name("ticks")) {
            (None, Some(t)) if is_block_id(t.as_str()) => (Some(t.as_str().to_string()), None),
            (block, ticks) => (
                block.map(|b| b.as_str().to_string()),
                ticks.map(|t| t.as_str().to_string()),
            ),
        };
        return Some(CallbackHeader {
            name: name.as_str().to_string(),
            name_start: name.start(),
            block_id,
            species,
            ticks,
            params: params.as_str().to_string(),
            params_start: params.start(),
            brace_end: caps.name("brace").map(|b| b.end()),
            bare: false,
        });
    }

    let caps = BARE_TICK_RE.captures(cleaned)?;
    let ticks = caps.name("ticks")?;
    Some(CallbackHeader {
        name: IMPLICIT_EVENT.to_string(),
        name_start: ticks.start(),
        block_id: caps.name("block").map(|b| b.as_str().to_string()),
        species: None,
        ticks: Some(ticks.as_str().to_string()),
        params: String::new(),
        params_start: ticks.end(),
        brace_end: caps.name("brace").map(|b| b.end()),
        bare: true,
    })
}

fn is_block_id(text: &str) -> bool {
    text.len() > 1 && text.starts_with('s') && text[1..].bytes().all(|b| b.is_ascii_digit())
}

/// A callback block once its closing brace has been seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackBlock {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Where the scanner is relative to callback blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CallbackScope {
    #[default]
    Outside,
    /// A header was seen but its `{` has not arrived yet.
    Awaiting { name: String, start_line: usize },
    Inside {
        name: String,
        depth: i32,
        start_line: usize,
    },
}

/// Result of advancing the scope over one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transition {
    pub next: CallbackScope,
    /// Callback owning the line, if any.
    pub context: Option<String>,
    /// Header recognized on this line.
    pub header: Option<CallbackHeader>,
    /// Set when the line entered a block body.
    pub entered: Option<String>,
    /// Set when the line closed a block.
    pub closed: Option<CallbackBlock>,
}

impl CallbackScope {
    pub fn current(&self) -> Option<&str> {
        match self {
            CallbackScope::Outside => None,
            CallbackScope::Awaiting { name, .. } | CallbackScope::Inside { name, .. } => {
                Some(name)
            }
        }
    }

    /// Pure transition over one scrubbed line.
    pub fn advance(&self, index: usize, cleaned: &str) -> Transition {
        match self {
            CallbackScope::Outside => Self::from_outside(index, cleaned),
            CallbackScope::Awaiting { name, start_line } => {
                let trimmed = cleaned.trim_start();
                if trimmed.is_empty() {
                    return Transition {
                        next: self.clone(),
                        context: Some(name.clone()),
                        ..Transition::default()
                    };
                }
                if trimmed.starts_with('{') {
                    let depth = net_count(cleaned, '{', '}');
                    let has_close = cleaned.contains('}');
                    return Self::open(name, *start_line, index, depth, has_close, None);
                }
                // the header was never followed by a body
                Self::from_outside(index, cleaned)
            }
            CallbackScope::Inside {
                name,
                depth,
                start_line,
            } => {
                let depth = depth + net_count(cleaned, '{', '}');
                if depth <= 0 && cleaned.contains('}') {
                    Transition {
                        next: CallbackScope::Outside,
                        context: Some(name.clone()),
                        closed: Some(CallbackBlock {
                            name: name.clone(),
                            start_line: *start_line,
                            end_line: index,
                        }),
                        ..Transition::default()
                    }
                } else {
                    Transition {
                        next: CallbackScope::Inside {
                            name: name.clone(),
                            depth,
                            start_line: *start_line,
                        },
                        context: Some(name.clone()),
                        ..Transition::default()
                    }
                }
            }
        }
    }

    fn from_outside(index: usize, cleaned: &str) -> Transition {
        let Some(header) = parse_header(cleaned) else {
            return Transition::default();
        };
        match header.brace_end {
            Some(brace_end) => {
                let body = &cleaned[brace_end..];
                let depth = net_count(body, '{', '}') + 1;
                let name = header.name.clone();
                Self::open(&name, index, index, depth, body.contains('}'), Some(header))
            }
            None => Transition {
                next: CallbackScope::Awaiting {
                    name: header.name.clone(),
                    start_line: index,
                },
                context: Some(header.name.clone()),
                header: Some(header),
                ..Transition::default()
            },
        }
    }

    fn open(
        name: &str,
        start_line: usize,
        index: usize,
        depth: i32,
        has_close: bool,
        header: Option<CallbackHeader>,
    ) -> Transition {
        let closed = (depth <= 0 && has_close).then(|| CallbackBlock {
            name: name.to_string(),
            start_line,
            end_line: index,
        });
        let next = if closed.is_some() {
            CallbackScope::Outside
        } else {
            CallbackScope::Inside {
                name: name.to_string(),
                depth,
                start_line,
            }
        };
        Transition {
            next,
            context: Some(name.to_string()),
            header,
            entered: Some(name.to_string()),
            closed,
        }
    }
}
