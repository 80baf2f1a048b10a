//! Concurrent Fargate startup benchmark.
//!
//! One warm-up task primes the scheduler path, then the measured batch fans
//! out worker-per-batch through the coordinator. Per-task failures reduce
//! the data set but never abort the run; only missing stack outputs or a
//! failed warm-up do.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::BenchConfig;
use crate::constants::HISTOGRAM_BINS;
use crate::coordinator::{Coordinator, TaskState};
use crate::infra::StackOutputs;
use crate::metrics::{MetricSamples, StartupHists};
use crate::report;
use crate::results_dir::ResultsDir;
use crate::scheduler::{NetworkConfig, TaskScheduler};

/// Resolve the awsvpc network configuration from the stack outputs.
/// Missing outputs are setup-fatal: nothing has been submitted yet.
pub async fn resolve_network(outputs: &StackOutputs) -> Result<NetworkConfig> {
    let subnet_id = outputs.require("SubnetId").await?;
    let security_group_id = outputs.require("SecurityGroupId").await?;
    info!("subnet: {subnet_id}");
    info!("security group: {security_group_id}");
    Ok(NetworkConfig {
        subnet_id,
        security_group_id,
    })
}

pub async fn run<S: TaskScheduler + 'static>(
    cfg: &BenchConfig,
    scheduler: Arc<S>,
    results: &ResultsDir,
    image_label: &str,
) -> Result<()> {
    let coordinator = Coordinator::from_config(scheduler, cfg);

    info!("=== warm-up phase ===");
    coordinator.warm_up().await.context("warm-up failed")?;

    info!("=== launch phase ===");
    let mut run = coordinator
        .launch_concurrent(cfg.task_count, cfg.submit_batch)
        .await;
    if run.task_arns.is_empty() {
        bail!("no tasks were created");
    }

    info!("=== collection phase ===");
    coordinator.collect_reports(&mut run).await;
    info!(
        "collected lifecycle records for {}/{} tasks",
        run.reports.len(),
        run.task_arns.len(),
    );

    for (i, r) in run.reports.iter().take(10).enumerate() {
        info!(
            "task {}: total={} pull={} prepare={}",
            i + 1,
            report::fmt_opt(r.durations.total_ms),
            report::fmt_opt(r.durations.pull_ms),
            report::fmt_opt(r.durations.prepare_ms),
        );
    }

    let hists = StartupHists::new();
    let mut samples = MetricSamples::default();
    for r in &run.reports {
        hists.record_durations(&r.durations);
        samples.push(&r.durations);
    }
    hists.print_summary("CONCURRENT");

    report::write_task_table(&results.task_table_path(), &run.reports)?;
    let images = results.images_dir().join(image_label);
    report::render_startup_histograms(
        &images,
        "concurrent_startup_",
        "Concurrent Tasks",
        &samples,
        HISTOGRAM_BINS,
    )?;
    info!("histograms rendered to {}", images.display());

    info!("=== cleanup phase ===");
    coordinator.shutdown(&mut run).await;
    info!(
        "{}/{} tasks confirmed stopped",
        run.count_in(TaskState::Stopped),
        run.task_arns.len(),
    );

    Ok(())
}
