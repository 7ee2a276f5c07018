//! Performance benchmarking for the language server
//!
//! Collects per-operation timings and named counters while benchmarking is
//! enabled, and renders them together with the document cache statistics.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use slimlsp::cache::CacheStats;

#[derive(Debug, Default)]
struct Measurements {
    timings: HashMap<String, Vec<Duration>>,
    counters: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct PerformanceTracker {
    measurements: Mutex<Measurements>,
    enabled: AtomicBool,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turning benchmarking on starts a fresh collection.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            self.reset();
        }
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.measurements
            .lock()
            .timings
            .entry(operation.to_string())
            .or_default()
            .push(duration);
    }

    pub fn increment(&self, counter: &str, amount: u64) {
        if !self.is_enabled() {
            return;
        }
        *self
            .measurements
            .lock()
            .counters
            .entry(counter.to_string())
            .or_insert(0) += amount;
    }

    pub fn reset(&self) {
        let mut measurements = self.measurements.lock();
        measurements.timings.clear();
        measurements.counters.clear();
    }

    pub fn generate_report(&self, cache: CacheStats) -> String {
        let measurements = self.measurements.lock();
        let rule = "=".repeat(80);
        let thin = "-".repeat(80);

        let mut report = String::new();
        let _ = writeln!(report, "{rule}\nSLiM Language Server Performance Report\n{rule}\n");

        let _ = writeln!(report, "TIMING STATISTICS\n{thin}");
        if measurements.timings.is_empty() {
            report.push_str("  No timing data collected\n");
        } else {
            let mut ops: Vec<_> = measurements.timings.iter().collect();
            ops.sort_by_key(|(name, _)| *name);
            for (operation, times) in ops {
                let Some(summary) = Summary::of(times) else {
                    continue;
                };
                let _ = writeln!(report, "\n  {operation}:");
                let _ = writeln!(report, "    Calls:    {}", times.len());
                for (label, value) in [
                    ("Total", summary.total),
                    ("Avg", summary.avg),
                    ("Min", summary.min),
                    ("Max", summary.max),
                    ("P50", summary.p50),
                    ("P95", summary.p95),
                ] {
                    let _ = writeln!(report, "    {:<9} {:.2}ms", format!("{label}:"), millis(value));
                }
            }
        }

        let _ = writeln!(report, "\n\nCOUNTERS\n{thin}");
        if measurements.counters.is_empty() {
            report.push_str("  No counter data collected\n");
        } else {
            let mut items: Vec<_> = measurements.counters.iter().collect();
            items.sort_by_key(|(name, _)| *name);
            for (name, value) in items {
                let _ = writeln!(report, "  {name}: {value}");
            }
        }

        let _ = writeln!(report, "\n\nDOCUMENT CACHE\n{thin}");
        let _ = writeln!(report, "  Entries:   {} / {}", cache.entries, cache.capacity);
        let _ = writeln!(report, "  Hits:      {}", cache.hits);
        let _ = writeln!(report, "  Misses:    {}", cache.misses);
        let _ = writeln!(report, "  Evictions: {}", cache.evictions);
        let _ = writeln!(report, "  Hit rate:  {:.1}%", cache.hit_rate() * 100.0);

        let _ = writeln!(report, "\n{rule}");
        report
    }
}

struct Summary {
    total: Duration,
    avg: Duration,
    min: Duration,
    max: Duration,
    p50: Duration,
    p95: Duration,
}

impl Summary {
    fn of(times: &[Duration]) -> Option<Summary> {
        let mut sorted = times.to_vec();
        sorted.sort();
        let count = sorted.len();
        let min = *sorted.first()?;
        let max = *sorted.last()?;
        let total: Duration = sorted.iter().sum();
        Some(Summary {
            total,
            avg: total / count as u32,
            min,
            max,
            p50: sorted[count / 2],
            p95: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
        })
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Records the time until it is dropped
pub struct TimingGuard<'a> {
    tracker: &'a PerformanceTracker,
    operation: &'static str,
    start: Instant,
}

impl<'a> TimingGuard<'a> {
    pub fn new(tracker: &'a PerformanceTracker, operation: &'static str) -> Self {
        Self {
            tracker,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for TimingGuard<'_> {
    fn drop(&mut self) {
        self.tracker.record(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_tracker_collects_nothing() {
        let tracker = PerformanceTracker::new();
        tracker.increment("calls", 1);
        tracker.record("op", Duration::from_millis(3));
        let report = tracker.generate_report(CacheStats::default());
        assert!(report.contains("No timing data collected"));
        assert!(report.contains("No counter data collected"));
    }

    #[test]
    fn report_lists_timings_counters_and_cache() {
        let tracker = PerformanceTracker::new();
        tracker.set_enabled(true);
        tracker.record("analysis.rules", Duration::from_millis(2));
        tracker.record("analysis.rules", Duration::from_millis(4));
        tracker.increment("lsp.server.diagnostics.calls", 2);
        {
            let _timer = TimingGuard::new(&tracker, "lsp.server.hover");
        }
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            evictions: 0,
            entries: 2,
            capacity: 64,
        };
        let report = tracker.generate_report(stats);
        assert!(report.contains("analysis.rules:\n    Calls:    2"));
        assert!(report.contains("lsp.server.hover:"));
        assert!(report.contains("lsp.server.diagnostics.calls: 2"));
        assert!(report.contains("Entries:   2 / 64"));
        assert!(report.contains("Hit rate:  75.0%"));
    }

    #[test]
    fn enabling_resets_previous_data() {
        let tracker = PerformanceTracker::new();
        tracker.set_enabled(true);
        tracker.increment("x", 5);
        tracker.set_enabled(true);
        assert!(!tracker.generate_report(CacheStats::default()).contains("x: 5"));
    }
}
