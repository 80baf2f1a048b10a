//! Result emission: the flat summary CSV, the per-task table and the
//! rendered startup-time distributions.

use anyhow::{Context, Result};
use plotters::prelude::*;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::coordinator::TaskReport;
use crate::metrics::MetricSamples;

/// Append one measured round to the flat summary CSV, creating the file with
/// its header on first use.
pub fn append_summary_row(path: &Path, run: usize, cold_ms: i64, hot_ms: i64) -> Result<()> {
    let new_file = !path.exists();
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    if new_file {
        writeln!(f, "run,cold_start_ms,hot_start_ms,time_saved_ms")?;
    }
    writeln!(f, "{},{},{},{}", run, cold_ms, hot_ms, cold_ms - hot_ms)?;
    Ok(())
}

fn opt_ms(v: Option<i64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Render an absent duration for console output.
pub fn fmt_opt(v: Option<i64>) -> String {
    v.map(|v| format!("{v}ms")).unwrap_or_else(|| "n/a".to_string())
}

/// Write the detailed per-task table: identifier, the four raw lifecycle
/// timestamps (epoch ms) and the three derived durations. Absent values are
/// left empty.
pub fn write_task_table(path: &Path, reports: &[TaskReport]) -> Result<()> {
    let mut f = File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writeln!(
        f,
        "task_arn\tcreated_ms\tstarted_ms\tpull_started_ms\tpull_stopped_ms\ttotal_ms\tpull_ms\tprepare_ms"
    )?;
    for r in reports {
        writeln!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            r.arn,
            opt_ms(r.timestamps.created),
            opt_ms(r.timestamps.started),
            opt_ms(r.timestamps.pull_started),
            opt_ms(r.timestamps.pull_stopped),
            opt_ms(r.durations.total_ms),
            opt_ms(r.durations.pull_ms),
            opt_ms(r.durations.prepare_ms),
        )?;
    }
    Ok(())
}

/// Bin `samples` into `bins` equal-width buckets. Returns the sample
/// minimum, the bucket width and the per-bucket counts.
pub fn bin_counts(samples: &[i64], bins: usize) -> (i64, i64, Vec<u32>) {
    assert!(bins > 0, "bin count must be positive");
    let min = samples.iter().copied().min().unwrap_or(0);
    let max = samples.iter().copied().max().unwrap_or(0);
    let span = (max - min + 1) as usize;
    let width = span.div_ceil(bins).max(1) as i64;
    let mut counts = vec![0u32; bins];
    for &s in samples {
        let idx = (((s - min) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }
    (min, width, counts)
}

/// Render a frequency histogram of `samples` into a PNG. Nothing is drawn
/// for an empty sample set.
pub fn render_histogram(
    path: &Path,
    title: &str,
    x_desc: &str,
    samples: &[i64],
    bins: usize,
) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }
    let (min, width, counts) = bin_counts(samples, bins);
    let y_max = counts.iter().copied().max().unwrap_or(0);

    let root = BitMapBackend::new(path, (640, 480)).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(44)
        .build_cartesian_2d(min..min + width * bins as i64, 0u32..y_max + 1)?;
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Frequency")
        .draw()?;
    chart.draw_series(counts.iter().enumerate().map(|(i, &n)| {
        let x0 = min + width * i as i64;
        Rectangle::new([(x0, 0), (x0 + width, n)], BLUE.mix(0.7).filled())
    }))?;
    root.present()
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Render the three per-category distributions into `dir`.
pub fn render_startup_histograms(
    dir: &Path,
    file_prefix: &str,
    title_prefix: &str,
    samples: &MetricSamples,
    bins: usize,
) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    render_histogram(
        &dir.join(format!("{file_prefix}total_time.png")),
        &format!("{title_prefix} Total Time Distribution"),
        "Total Time (ms)",
        &samples.total,
        bins,
    )?;
    render_histogram(
        &dir.join(format!("{file_prefix}pull_time.png")),
        &format!("{title_prefix} Image Pull Time Distribution"),
        "Pull Time (ms)",
        &samples.pull,
        bins,
    )?;
    render_histogram(
        &dir.join(format!("{file_prefix}prepare_time.png")),
        &format!("{title_prefix} Preparation Time Distribution"),
        "Preparation Time (ms)",
        &samples.prepare,
        bins,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bin_counts_cover_all_samples() {
        let samples = vec![0, 1, 2, 100, 250, 999, 1000];
        let (min, width, counts) = bin_counts(&samples, 10);
        assert_eq!(min, 0);
        assert_eq!(counts.len(), 10);
        assert_eq!(counts.iter().map(|&c| c as usize).sum::<usize>(), samples.len());
        assert!(width >= 1);
    }

    #[test]
    fn test_bin_counts_single_value() {
        let (min, width, counts) = bin_counts(&[42, 42, 42], 5);
        assert_eq!(min, 42);
        assert_eq!(width, 1);
        assert_eq!(counts[0], 3);
        assert_eq!(counts[1..].iter().sum::<u32>(), 0);
    }

    #[test]
    fn test_bin_counts_max_lands_in_last_bin() {
        let (_, _, counts) = bin_counts(&[0, 1499], 15);
        assert_eq!(counts[0], 1);
        assert_eq!(*counts.last().unwrap(), 1);
    }
}
