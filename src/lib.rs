//! # SLiM analysis core
//!
//! Approximate semantic analysis of SLiM and Eidos scripts without a parser:
//! each document is scrubbed of strings and comments, walked once to recover
//! a symbol table, and then checked by a list of independent rules.
//!
//! ## Modules
//! - `lexer` - string/comment partitioning and column-preserving scrubbing
//! - `resolver` - best-effort class inference for identifiers and expressions
//! - `callbacks` - callback headers, scope tracking and pseudo-parameters
//! - `tracking` - the single-pass symbol table builder
//! - `docs` / `signature` - the documentation dataset and its signatures
//! - `rules` - the diagnostic pipeline
//! - `cache` - version-guarded LRU cache of results
//! - `analysis` - text in, tracking state and diagnostics out

pub mod analysis;
pub mod cache;
pub mod callbacks;
pub mod docs;
pub mod error;
pub mod lexer;
pub mod resolver;
pub mod rules;
pub mod signature;
pub mod tracking;
pub mod types;

pub use analysis::{compute_diagnostics, Analysis, Analyzer};
pub use cache::DocumentCache;
pub use docs::{Documentation, DocumentationProvider, Mode};
pub use error::{Error, Result};
pub use tracking::{TrackingEngine, TrackingState};
