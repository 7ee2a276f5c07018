//! Text in, tracking snapshot and diagnostics out.

use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tower_lsp::lsp_types::Diagnostic;
use tracing::debug;

use crate::cache::DocumentCache;
use crate::docs::{DocumentationProvider, Mode};
use crate::lexer::ScrubbedSource;
use crate::rules::{Pipeline, RuleContext};
use crate::tracking::{TrackingEngine, TrackingState, DEFAULT_CONSTANT_LOOKAHEAD};

/// Result of analysing one document version.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub tracking: Arc<TrackingState>,
    pub diagnostics: Arc<Vec<Diagnostic>>,
    pub timings: Timings,
}

/// Where the time of one analysis went. Phases served from the cache take no
/// time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timings {
    pub tracking: Duration,
    pub rules: Duration,
    pub tracking_cached: bool,
    pub diagnostics_cached: bool,
}

/// Tracking engine and rule pipeline bound to one documentation dataset.
pub struct Analyzer {
    docs: Arc<dyn DocumentationProvider>,
    pipeline: Pipeline,
    constant_lookahead: usize,
}

impl Analyzer {
    pub fn new(docs: Arc<dyn DocumentationProvider>) -> Self {
        Analyzer {
            docs,
            pipeline: Pipeline::standard(),
            constant_lookahead: DEFAULT_CONSTANT_LOOKAHEAD,
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_constant_lookahead(mut self, lines: usize) -> Self {
        self.constant_lookahead = lines;
        self
    }

    pub fn docs(&self) -> &dyn DocumentationProvider {
        self.docs.as_ref()
    }

    pub fn track(&self, text: &str, mode: Mode) -> TrackingState {
        self.track_source(&ScrubbedSource::new(text), mode)
    }

    fn track_source(&self, source: &ScrubbedSource, mode: Mode) -> TrackingState {
        TrackingEngine::new(self.docs.as_ref(), mode)
            .with_constant_lookahead(self.constant_lookahead)
            .track(source)
    }

    fn diagnose(&self, source: &ScrubbedSource, tracking: &TrackingState, mode: Mode) -> Vec<Diagnostic> {
        self.pipeline.run(&RuleContext {
            source,
            tracking,
            docs: self.docs.as_ref(),
            mode,
        })
    }

    /// Full analysis without caching.
    pub fn analyze(&self, text: &str, mode: Mode) -> Analysis {
        let source = ScrubbedSource::new(text);
        let started = Instant::now();
        let tracking = self.track_source(&source, mode);
        let tracked = Instant::now();
        let diagnostics = self.diagnose(&source, &tracking, mode);
        Analysis {
            tracking: Arc::new(tracking),
            diagnostics: Arc::new(diagnostics),
            timings: Timings {
                tracking: tracked - started,
                rules: tracked.elapsed(),
                ..Timings::default()
            },
        }
    }

    /// Tracking snapshot for `key` at `version`, from the cache when possible.
    pub fn tracking_cached<K: Hash + Eq + Clone>(
        &self,
        cache: &DocumentCache<K>,
        key: &K,
        version: i32,
        text: &str,
        mode: Mode,
    ) -> Arc<TrackingState> {
        if let Some(tracking) = cache.get_tracking(key, version) {
            return tracking;
        }
        let tracking = Arc::new(self.track(text, mode));
        cache.set_tracking(key, version, tracking.clone());
        tracking
    }

    /// Analysis of `key` at `version`, reusing whatever the cache holds for
    /// that exact version. Results are written back; a write for a version
    /// older than the cached one is dropped by the cache.
    pub fn analyze_cached<K: Hash + Eq + Clone>(
        &self,
        cache: &DocumentCache<K>,
        key: &K,
        version: i32,
        text: &str,
        mode: Mode,
    ) -> Analysis {
        let (cached_tracking, cached_diagnostics) = cache.get_analysis(key, version);
        if let (Some(tracking), Some(diagnostics)) = (&cached_tracking, &cached_diagnostics) {
            return Analysis {
                tracking: tracking.clone(),
                diagnostics: diagnostics.clone(),
                timings: Timings {
                    tracking_cached: true,
                    diagnostics_cached: true,
                    ..Timings::default()
                },
            };
        }

        let source = ScrubbedSource::new(text);
        let mut timings = Timings::default();
        let tracking = match cached_tracking {
            Some(tracking) => {
                timings.tracking_cached = true;
                tracking
            }
            None => {
                let started = Instant::now();
                let tracking = Arc::new(self.track_source(&source, mode));
                timings.tracking = started.elapsed();
                cache.set_tracking(key, version, tracking.clone());
                tracking
            }
        };
        let started = Instant::now();
        let diagnostics = Arc::new(self.diagnose(&source, &tracking, mode));
        timings.rules = started.elapsed();
        cache.set_diagnostics(key, version, diagnostics.clone());

        debug!(
            version,
            lines = source.len(),
            diagnostics = diagnostics.len(),
            tracking_us = timings.tracking.as_micros() as u64,
            rules_us = timings.rules.as_micros() as u64,
            "analysed document"
        );
        Analysis {
            tracking,
            diagnostics,
            timings,
        }
    }
}

/// One-shot diagnostics for `text` with the standard pipeline.
pub fn compute_diagnostics(
    text: &str,
    mode: Mode,
    docs: Arc<dyn DocumentationProvider>,
) -> Vec<Diagnostic> {
    let analysis = Analyzer::new(docs).analyze(text, mode);
    Arc::unwrap_or_clone(analysis.diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docs::Documentation;

    fn analyzer() -> Analyzer {
        Analyzer::new(Arc::new(Documentation::builtin().unwrap()))
    }

    #[test]
    fn cached_analysis_reuses_results() {
        let analyzer = analyzer();
        let cache = DocumentCache::new(8);
        let text = "x = 1";
        let first = analyzer.analyze_cached(&cache, &"doc", 1, text, Mode::Slim);
        assert!(!first.timings.tracking_cached);
        let second = analyzer.analyze_cached(&cache, &"doc", 1, text, Mode::Slim);
        assert!(second.timings.tracking_cached && second.timings.diagnostics_cached);
        assert!(Arc::ptr_eq(&first.diagnostics, &second.diagnostics));
    }

    #[test]
    fn new_version_is_recomputed() {
        let analyzer = analyzer();
        let cache = DocumentCache::new(8);
        analyzer.analyze_cached(&cache, &"doc", 1, "x = 1", Mode::Slim);
        let next = analyzer.analyze_cached(&cache, &"doc", 2, "x = 1;", Mode::Slim);
        assert!(!next.timings.diagnostics_cached);
        assert!(next.diagnostics.is_empty());
    }

    #[test]
    fn each_request_counts_once() {
        let analyzer = analyzer();
        let cache = DocumentCache::new(8);
        analyzer.analyze_cached(&cache, &"doc", 1, "x = 1;", Mode::Slim);
        let cold = cache.stats();
        assert_eq!((cold.hits, cold.misses), (0, 1));

        analyzer.analyze_cached(&cache, &"doc", 1, "x = 1;", Mode::Slim);
        analyzer.analyze_cached(&cache, &"doc", 1, "x = 1;", Mode::Slim);
        let warm = cache.stats();
        assert_eq!((warm.hits, warm.misses), (2, 1));
        assert_eq!(warm.hit_rate(), 2.0 / 3.0);

        analyzer.analyze_cached(&cache, &"doc", 2, "x = 2;", Mode::Slim);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn tracking_from_hover_path_feeds_diagnostics() {
        let analyzer = analyzer();
        let cache = DocumentCache::new(8);
        analyzer.tracking_cached(&cache, &"doc", 1, "x = 1", Mode::Slim);
        let analysis = analyzer.analyze_cached(&cache, &"doc", 1, "x = 1", Mode::Slim);
        assert!(analysis.timings.tracking_cached);
        assert!(!analysis.timings.diagnostics_cached);
        assert_eq!(analysis.diagnostics.len(), 1);
    }
}
