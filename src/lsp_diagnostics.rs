//! LSP Diagnostics Module
//!
//! Runs the analysis pipeline for open documents and publishes the result,
//! and renders diagnostics for the `--diagnose` command line mode.

use std::fmt::Write as _;
use std::path::Path;

use slimlsp::{Analyzer, Mode};
use tower_lsp::lsp_types::{Diagnostic, DiagnosticSeverity, Url};
use tracing::{debug, trace};

use crate::performance::TimingGuard;
use crate::Backend;

/// Analyse the current version of `uri` and publish its diagnostics.
pub async fn run_diagnostics(backend: &Backend, uri: &Url) {
    let _timer = TimingGuard::new(&backend.perf_tracker, "lsp.server.diagnostics");
    backend.perf_tracker.increment("lsp.server.diagnostics.calls", 1);

    if !backend.config.read().await.enabled {
        backend.client.publish_diagnostics(uri.clone(), vec![], None).await;
        return;
    }

    let analyzer = backend.analyzer();
    let (version, analysis) = {
        let Some(document) = backend.documents.get(uri) else {
            return;
        };
        let analysis = analyzer.analyze_cached(
            &backend.cache,
            uri,
            document.version,
            &document.text,
            document.mode,
        );
        (document.version, analysis)
    };

    let timings = analysis.timings;
    let perf = &backend.perf_tracker;
    if timings.diagnostics_cached {
        perf.increment("lsp.server.diagnostics.cache_hits", 1);
    } else {
        perf.increment("lsp.server.diagnostics.cache_misses", 1);
        perf.record("analysis.rules", timings.rules);
    }
    if !timings.tracking_cached {
        perf.record("analysis.tracking", timings.tracking);
    }

    // an edit may have landed while the analysis ran
    let current = backend.documents.get(uri).map(|d| d.version);
    if current != Some(version) {
        trace!(%uri, version, ?current, "dropping diagnostics for superseded version");
        return;
    }

    debug!(%uri, version, count = analysis.diagnostics.len(), "publishing diagnostics");
    backend
        .client
        .publish_diagnostics(uri.clone(), analysis.diagnostics.to_vec(), Some(version))
        .await;
}

fn severity_label(severity: Option<DiagnosticSeverity>) -> &'static str {
    match severity {
        Some(DiagnosticSeverity::ERROR) => "ERROR",
        Some(DiagnosticSeverity::WARNING) => "WARN",
        Some(DiagnosticSeverity::INFORMATION) => "INFO",
        Some(DiagnosticSeverity::HINT) => "HINT",
        _ => "UNKNOWN",
    }
}

/// Render the diagnostics of one file the way `--diagnose` prints them.
pub fn render_report(path: &Path, diagnostics: &[Diagnostic]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Diagnostics for {}:", path.display());
    if diagnostics.is_empty() {
        out.push_str("  (no diagnostics)\n");
    }
    for d in diagnostics {
        let _ = writeln!(
            out,
            "  {}:{}:{} - {}",
            severity_label(d.severity),
            d.range.start.line,
            d.range.start.character,
            d.message
        );
    }
    out
}

/// Analyse `text` as `path` for the command line, inferring the mode from
/// the file extension unless one is forced.
pub fn diagnose_text(analyzer: &Analyzer, path: &Path, text: &str, mode: Option<Mode>) -> Vec<Diagnostic> {
    let mode = mode.unwrap_or_else(|| Mode::from_path(&path.to_string_lossy()));
    analyzer.analyze(text, mode).diagnostics.to_vec()
}
