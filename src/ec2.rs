//! Serial EC2/ECS cold-versus-hot startup benchmark.
//!
//! Every measured round launches a fresh container instance for the cold
//! start and reuses a resident instance for the hot start. Both wall-clock
//! latency (submit to RUNNING as observed here) and the scheduler-reported
//! lifecycle durations are recorded; a round that fails at any step is
//! logged and skipped.

use std::slice;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use aws_sdk_ec2::types::{
    InstanceStateName, LaunchTemplateSpecification, ResourceType, Tag, TagSpecification,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::config::BenchConfig;
use crate::constants::{HISTOGRAM_BINS, TERMINATE_POLL_ATTEMPTS, TERMINATE_POLL_DELAY};
use crate::coordinator::{Coordinator, WaitBudget};
use crate::metrics::{MetricSamples, StartupHists};
use crate::report;
use crate::results_dir::ResultsDir;
use crate::scheduler::TaskScheduler;
use crate::timestamps::DurationMetrics;

/// EC2 instance lifecycle control for the cold-start side.
pub struct InstanceControl {
    client: aws_sdk_ec2::Client,
    launch_template_id: String,
    subnet_id: String,
}

impl InstanceControl {
    pub fn new(
        cfg: &aws_config::SdkConfig,
        launch_template_id: String,
        subnet_id: String,
    ) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(cfg),
            launch_template_id,
            subnet_id,
        }
    }

    /// Launch one instance from the benchmark launch template.
    pub async fn launch(&self) -> Result<String> {
        let resp = self
            .client
            .run_instances()
            .launch_template(
                LaunchTemplateSpecification::builder()
                    .launch_template_id(&self.launch_template_id)
                    .build(),
            )
            .subnet_id(&self.subnet_id)
            .min_count(1)
            .max_count(1)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(
                        Tag::builder()
                            .key("Name")
                            .value("cold-start-test-instance")
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .context("RunInstances call failed")?;
        resp.instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(str::to_string)
            .context("RunInstances returned no instance id")
    }

    /// Best-effort terminate; a failure leaves the instance for manual
    /// cleanup and is only logged.
    pub async fn terminate(&self, instance_id: &str) {
        if let Err(err) = self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            warn!("terminate of {instance_id} failed: {err}");
        }
    }

    async fn instance_state(&self, instance_id: &str) -> Result<Option<InstanceStateName>> {
        let resp = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("DescribeInstances call failed")?;
        Ok(resp
            .reservations()
            .iter()
            .flat_map(|r| r.instances())
            .find(|i| i.instance_id() == Some(instance_id))
            .and_then(|i| i.state())
            .and_then(|s| s.name())
            .cloned())
    }

    /// Block until the instance reports terminated or the budget runs out.
    pub async fn wait_terminated(&self, instance_id: &str) {
        for _ in 0..TERMINATE_POLL_ATTEMPTS {
            match self.instance_state(instance_id).await {
                Ok(Some(InstanceStateName::Terminated)) => return,
                Ok(_) => {}
                Err(err) => warn!("describe of {instance_id} failed: {err:#}"),
            }
            tokio::time::sleep(TERMINATE_POLL_DELAY).await;
        }
        warn!("{instance_id} still not terminated, continuing anyway");
    }
}

struct RoundOutcome {
    cold_wall_ms: i64,
    hot_wall_ms: i64,
    cold: DurationMetrics,
    hot: DurationMetrics,
}

pub async fn run<S: TaskScheduler + 'static>(
    cfg: &BenchConfig,
    scheduler: Arc<S>,
    instances: &InstanceControl,
    results: &ResultsDir,
) -> Result<()> {
    let coordinator = Coordinator::from_config(scheduler, cfg);

    let hot_instance = wait_for_resident_instance(&coordinator, cfg).await?;
    info!("resident container instance: {hot_instance}");

    // First cycle on the resident instance warms its image cache.
    info!("=== warm-up phase ===");
    match start_on(&coordinator, &hot_instance).await {
        Some(arn) => {
            coordinator.wait_until_running(slice::from_ref(&arn)).await;
            coordinator.stop_all(slice::from_ref(&arn)).await;
            info!("warm-up complete");
        }
        None => bail!("warm-up task creation failed"),
    }

    let csv_path = results.summary_csv_path();
    let cold_hists = StartupHists::new();
    let hot_hists = StartupHists::new();
    let mut cold_samples = MetricSamples::default();
    let mut hot_samples = MetricSamples::default();

    info!("=== measurement phase: {} rounds ===", cfg.rounds);
    let pb = ProgressBar::new(cfg.rounds as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} rounds ({eta_precise}) {msg}",
        )?
        .progress_chars("#>-"),
    );

    for round in 1..=cfg.rounds {
        info!("===== round {round}/{} =====", cfg.rounds);
        match measure_round(cfg, &coordinator, instances, &hot_instance).await {
            Some(outcome) => {
                report::append_summary_row(
                    &csv_path,
                    round,
                    outcome.cold_wall_ms,
                    outcome.hot_wall_ms,
                )?;
                info!(
                    "round {round}: cold={}ms hot={}ms saved={}ms",
                    outcome.cold_wall_ms,
                    outcome.hot_wall_ms,
                    outcome.cold_wall_ms - outcome.hot_wall_ms,
                );
                // Aggregate statistics only cover rounds where both sides
                // produced a parsed total; partial rounds stay in the CSV.
                if outcome.cold.total_ms.is_some() && outcome.hot.total_ms.is_some() {
                    cold_hists.record_durations(&outcome.cold);
                    hot_hists.record_durations(&outcome.hot);
                    cold_samples.push(&outcome.cold);
                    hot_samples.push(&outcome.hot);
                }
            }
            None => info!("round {round} skipped"),
        }
        pb.inc(1);
        if round < cfg.rounds {
            tokio::time::sleep(cfg.settle_delay).await;
        }
    }
    pb.finish_with_message("measurement complete");

    cold_hists.print_summary("COLD");
    hot_hists.print_summary("HOT");

    let images = results.images_dir();
    report::render_startup_histograms(
        &images,
        "cold_start_",
        "Cold Start",
        &cold_samples,
        HISTOGRAM_BINS,
    )?;
    report::render_startup_histograms(
        &images,
        "hot_start_",
        "Hot Start",
        &hot_samples,
        HISTOGRAM_BINS,
    )?;
    info!("histograms rendered to {}", images.display());

    Ok(())
}

/// Wait for the resident (hot) container instance to register after stack
/// creation. Exhausting the budget is setup-fatal.
async fn wait_for_resident_instance<S: TaskScheduler + 'static>(
    coordinator: &Coordinator<S>,
    cfg: &BenchConfig,
) -> Result<String> {
    for attempt in 1..=cfg.resident_poll_attempts {
        match coordinator.scheduler().list_container_instances().await {
            Ok(arns) => {
                if let Some(arn) = arns.into_iter().next() {
                    return Ok(arn);
                }
                info!(
                    "waiting for resident instance to register (attempt {attempt}/{})",
                    cfg.resident_poll_attempts,
                );
            }
            Err(err) => warn!("list-container-instances failed: {err:#}"),
        }
        tokio::time::sleep(cfg.resident_poll_delay).await;
    }
    bail!("no container instance registered with {}", cfg.cluster)
}

/// Poll until a freshly launched EC2 instance registers with the cluster.
async fn wait_for_registration<S: TaskScheduler + 'static>(
    coordinator: &Coordinator<S>,
    cfg: &BenchConfig,
    instance_id: &str,
) -> Option<String> {
    for attempt in 1..=cfg.register_poll_attempts {
        info!(
            "waiting for {instance_id} to register (attempt {attempt}/{})",
            cfg.register_poll_attempts,
        );
        match coordinator
            .scheduler()
            .container_instance_for_ec2(instance_id)
            .await
        {
            Ok(Some(arn)) => return Some(arn),
            Ok(None) => {}
            Err(err) => warn!("registration lookup failed: {err:#}"),
        }
        tokio::time::sleep(cfg.register_poll_delay).await;
    }
    None
}

/// Start one task pinned to a container instance; submission failures are
/// logged and yield `None`.
async fn start_on<S: TaskScheduler + 'static>(
    coordinator: &Coordinator<S>,
    instance_arn: &str,
) -> Option<String> {
    match coordinator
        .scheduler()
        .start_task_on_instance(instance_arn)
        .await
    {
        Ok(outcome) => {
            for failure in &outcome.failures {
                warn!(
                    "start failure on {instance_arn}: {}",
                    failure.reason.as_deref().unwrap_or("-"),
                );
            }
            outcome.task_arns.into_iter().next()
        }
        Err(err) => {
            warn!("start-task call failed: {err:#}");
            None
        }
    }
}

/// Fetch one task's derived durations; absent on any describe failure.
async fn describe_one<S: TaskScheduler + 'static>(
    coordinator: &Coordinator<S>,
    arn: &str,
) -> DurationMetrics {
    let arns = [arn.to_string()];
    coordinator
        .describe_all(&arns)
        .await
        .into_iter()
        .next()
        .map(|t| t.timestamps.durations())
        .unwrap_or_default()
}

/// One cold/hot measurement round. Any failed step logs, cleans up what it
/// can and skips the round.
async fn measure_round<S: TaskScheduler + 'static>(
    cfg: &BenchConfig,
    coordinator: &Coordinator<S>,
    instances: &InstanceControl,
    hot_instance: &str,
) -> Option<RoundOutcome> {
    // --- cold start on a fresh instance ---
    info!("--- cold start ---");
    let instance_id = match instances.launch().await {
        Ok(id) => id,
        Err(err) => {
            warn!("could not launch instance, skipping round: {err:#}");
            return None;
        }
    };
    info!("new instance {instance_id}, waiting for ECS registration");
    let cold_instance = match wait_for_registration(coordinator, cfg, &instance_id).await {
        Some(arn) => arn,
        None => {
            warn!("registration timed out, terminating {instance_id}");
            instances.terminate(&instance_id).await;
            return None;
        }
    };
    info!("registered as {cold_instance}");

    let cold_clock = Instant::now();
    let Some(cold_arn) = start_on(coordinator, &cold_instance).await else {
        warn!("cold task creation failed, terminating {instance_id}");
        instances.terminate(&instance_id).await;
        return None;
    };
    coordinator
        .wait_until_running(slice::from_ref(&cold_arn))
        .await;
    let cold_wall_ms = cold_clock.elapsed().as_millis() as i64;
    info!("cold start observed in {cold_wall_ms}ms");

    let cold = describe_one(coordinator, &cold_arn).await;
    coordinator.stop_all(slice::from_ref(&cold_arn)).await;
    instances.terminate(&instance_id).await;
    instances.wait_terminated(&instance_id).await;

    // --- hot start on the resident instance ---
    info!("--- hot start ---");
    let hot_clock = Instant::now();
    let Some(hot_arn) = start_on(coordinator, hot_instance).await else {
        warn!("hot task creation failed, skipping round");
        return None;
    };
    coordinator
        .wait_until_running(slice::from_ref(&hot_arn))
        .await;
    let hot_wall_ms = hot_clock.elapsed().as_millis() as i64;
    info!("hot start observed in {hot_wall_ms}ms");

    let hot = describe_one(coordinator, &hot_arn).await;
    coordinator.stop_all(slice::from_ref(&hot_arn)).await;

    Some(RoundOutcome {
        cold_wall_ms,
        hot_wall_ms,
        cold,
        hot,
    })
}
