//! Startup-duration metrics collection.
//!
//! HDR histograms back the console summaries; raw samples are kept alongside
//! in arrival order for the rendered distributions.

use hdrhistogram::Histogram;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::timestamps::DurationMetrics;

/// Number of duration categories tracked per measurement set
pub const NUM_CATEGORIES: usize = 3;

/// Labels for each category
pub const CATEGORY_LABELS: [&str; NUM_CATEGORIES] = ["total", "pull", "prepare"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Total = 0,
    Pull = 1,
    Prepare = 2,
}

/// Per-category histograms for one measurement set (e.g. all cold starts)
#[derive(Debug, Clone)]
pub struct StartupHists {
    pub buckets: Arc<Vec<Mutex<Histogram<u64>>>>,
}

impl StartupHists {
    /// Create a new set of histograms (one per duration category)
    pub fn new() -> Self {
        let mut v = Vec::with_capacity(NUM_CATEGORIES);
        for _ in 0..NUM_CATEGORIES {
            v.push(Mutex::new(
                Histogram::<u64>::new_with_bounds(1, 3_600_000, 3)
                    .expect("failed to allocate histogram"),
            ));
        }
        StartupHists {
            buckets: Arc::new(v),
        }
    }

    /// Record one duration in milliseconds. Negative values cannot be held
    /// by the histogram; they are skipped here but stay visible in the
    /// per-task table.
    pub fn record(&self, category: Category, millis: i64) {
        if millis < 0 {
            warn!(
                "negative {} duration ({millis}ms) excluded from histogram",
                CATEGORY_LABELS[category as usize],
            );
            return;
        }
        let mut hist = self.buckets[category as usize].lock().unwrap();
        let _ = hist.record(millis as u64);
    }

    /// Record whichever durations are present.
    pub fn record_durations(&self, d: &DurationMetrics) {
        if let Some(ms) = d.total_ms {
            self.record(Category::Total, ms);
        }
        if let Some(ms) = d.pull_ms {
            self.record(Category::Pull, ms);
        }
        if let Some(ms) = d.prepare_ms {
            self.record(Category::Prepare, ms);
        }
    }

    /// Print a summary of all categories for this measurement set
    pub fn print_summary(&self, label: &str) {
        println!("\n{} startup latency (ms):", label);
        for (i, m) in self.buckets.iter().enumerate() {
            let hist = m.lock().unwrap();
            let count = hist.len();
            if count == 0 {
                continue;
            }
            let mean = hist.mean();
            let p50 = hist.value_at_quantile(0.50);
            let p95 = hist.value_at_quantile(0.95);
            let p99 = hist.value_at_quantile(0.99);
            let max = hist.max();
            println!(
                "  [{:>7}] count={:<6} mean={:<8.0} p50={:<8} p95={:<8} p99={:<8} max={:<8}",
                CATEGORY_LABELS[i], count, mean, p50, p95, p99, max
            );
        }
    }
}

impl Default for StartupHists {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw per-category samples, kept for histogram rendering.
#[derive(Debug, Default, Clone)]
pub struct MetricSamples {
    pub total: Vec<i64>,
    pub pull: Vec<i64>,
    pub prepare: Vec<i64>,
}

impl MetricSamples {
    pub fn push(&mut self, d: &DurationMetrics) {
        if let Some(ms) = d.total_ms {
            self.total.push(ms);
        }
        if let Some(ms) = d.pull_ms {
            self.pull.push(ms);
        }
        if let Some(ms) = d.prepare_ms {
            self.prepare.push(ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_durations() {
        let hists = StartupHists::new();
        hists.record_durations(&DurationMetrics {
            total_ms: Some(2500),
            pull_ms: Some(1500),
            prepare_ms: Some(1000),
        });
        hists.record_durations(&DurationMetrics {
            total_ms: Some(3000),
            pull_ms: None,
            prepare_ms: None,
        });

        assert_eq!(hists.buckets[Category::Total as usize].lock().unwrap().len(), 2);
        assert_eq!(hists.buckets[Category::Pull as usize].lock().unwrap().len(), 1);
        assert_eq!(hists.buckets[Category::Prepare as usize].lock().unwrap().len(), 1);
    }

    #[test]
    fn test_negative_duration_skipped() {
        let hists = StartupHists::new();
        hists.record(Category::Prepare, -250);
        assert_eq!(hists.buckets[Category::Prepare as usize].lock().unwrap().len(), 0);
    }

    #[test]
    fn test_samples_track_present_values_only() {
        let mut samples = MetricSamples::default();
        samples.push(&DurationMetrics {
            total_ms: Some(2500),
            pull_ms: None,
            prepare_ms: None,
        });
        samples.push(&DurationMetrics {
            total_ms: Some(1800),
            pull_ms: Some(700),
            prepare_ms: Some(1100),
        });
        assert_eq!(samples.total, vec![2500, 1800]);
        assert_eq!(samples.pull, vec![700]);
        assert_eq!(samples.prepare, vec![1100]);
    }
}
