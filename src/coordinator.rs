//! Batch launch coordination against the remote scheduler.
//!
//! Submission, the running/stopped waits and teardown all tolerate partial
//! failure: a rejected submission is omitted from the identifier list, a
//! chunk that exhausts its poll budget is logged and excluded from that
//! phase, and the run continues with whatever subset succeeded. Only the
//! warm-up task is allowed to abort a run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::scheduler::{TaskDescription, TaskScheduler};
use crate::timestamps::{DurationMetrics, TaskTimestamps};

/// Fixed-delay poll budget for one wait phase.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    pub delay: Duration,
    pub max_attempts: u32,
}

/// Last observed state of one submitted task. `Stopped` and `Failed` are
/// terminal; `Failed` absorbs both submission rejections and running-wait
/// timeouts (a timed-out task is presumed stuck and not re-verified).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Submitted,
    Running,
    Stopped,
    Failed,
}

/// Per-task record carried into the report: identifier, raw lifecycle
/// timestamps and the derived durations.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub arn: String,
    pub timestamps: TaskTimestamps,
    pub durations: DurationMetrics,
}

/// One coordinator invocation over a target number of tasks.
///
/// `task_arns` is append-only during submission; a failed launch simply
/// never contributes an identifier.
#[derive(Debug, Default)]
pub struct BatchRun {
    pub requested: usize,
    pub task_arns: Vec<String>,
    pub states: HashMap<String, TaskState>,
    pub reports: Vec<TaskReport>,
}

impl BatchRun {
    pub fn running_arns(&self) -> Vec<String> {
        self.task_arns
            .iter()
            .filter(|arn| self.states.get(*arn) == Some(&TaskState::Running))
            .cloned()
            .collect()
    }

    pub fn count_in(&self, state: TaskState) -> usize {
        self.states.values().filter(|s| **s == state).count()
    }
}

/// Split `total` tasks into submission batches of at most `batch` each.
pub fn batch_sizes(total: usize, batch: usize) -> Vec<usize> {
    assert!(batch > 0, "batch size must be positive");
    let mut sizes = Vec::new();
    let mut left = total;
    while left > 0 {
        let n = left.min(batch);
        sizes.push(n);
        left -= n;
    }
    sizes
}

pub struct Coordinator<S> {
    scheduler: Arc<S>,
    chunk_limit: usize,
    running_wait: WaitBudget,
    stopped_wait: WaitBudget,
}

impl<S> Clone for Coordinator<S> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Arc::clone(&self.scheduler),
            chunk_limit: self.chunk_limit,
            running_wait: self.running_wait,
            stopped_wait: self.stopped_wait,
        }
    }
}

impl<S: TaskScheduler + 'static> Coordinator<S> {
    pub fn new(
        scheduler: Arc<S>,
        chunk_limit: usize,
        running_wait: WaitBudget,
        stopped_wait: WaitBudget,
    ) -> Self {
        assert!(chunk_limit > 0, "chunk limit must be positive");
        Self {
            scheduler,
            chunk_limit,
            running_wait,
            stopped_wait,
        }
    }

    pub fn from_config(scheduler: Arc<S>, cfg: &crate::config::BenchConfig) -> Self {
        Self::new(
            scheduler,
            cfg.describe_batch,
            WaitBudget {
                delay: cfg.running_poll_delay,
                max_attempts: cfg.running_poll_attempts,
            },
            WaitBudget {
                delay: cfg.stopped_poll_delay,
                max_attempts: cfg.stopped_poll_attempts,
            },
        )
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Submit `count` tasks in one bulk call. Failures reported by the
    /// backend are logged and omitted from the returned identifiers; a
    /// failed call yields an empty batch. Never fatal.
    pub async fn submit_batch(&self, count: usize) -> Vec<String> {
        match self.scheduler.submit_tasks(count).await {
            Ok(outcome) => {
                if !outcome.failures.is_empty() {
                    warn!("{} of {} submissions failed", outcome.failures.len(), count);
                    for failure in &outcome.failures {
                        warn!(
                            "  submission failure: arn={} reason={}",
                            failure.arn.as_deref().unwrap_or("-"),
                            failure.reason.as_deref().unwrap_or("-"),
                        );
                    }
                }
                info!("submitted {}/{} tasks", outcome.task_arns.len(), count);
                outcome.task_arns
            }
            Err(err) => {
                warn!("bulk submission failed: {err:#}");
                Vec::new()
            }
        }
    }

    /// Wait until every task in `arns` reports `target`, chunked to the
    /// backend describe limit. Returns the identifiers confirmed in the
    /// target state; a chunk that exhausts its budget is logged and its
    /// members left out.
    async fn wait_for_state(
        &self,
        arns: &[String],
        target: &str,
        budget: WaitBudget,
    ) -> Vec<String> {
        let mut reached = Vec::new();
        for chunk in arns.chunks(self.chunk_limit) {
            debug!("waiting for {} tasks to reach {target}", chunk.len());
            if self.poll_chunk(chunk, target, budget).await {
                reached.extend_from_slice(chunk);
            } else {
                warn!(
                    "{} tasks did not reach {target} within {:?} x {} attempts",
                    chunk.len(),
                    budget.delay,
                    budget.max_attempts,
                );
            }
        }
        reached
    }

    async fn poll_chunk(&self, chunk: &[String], target: &str, budget: WaitBudget) -> bool {
        for attempt in 1..=budget.max_attempts {
            match self.scheduler.describe_tasks(chunk).await {
                Ok(tasks) => {
                    let reached = tasks
                        .iter()
                        .filter(|t| t.last_status.as_deref() == Some(target))
                        .count();
                    if reached == chunk.len() {
                        return true;
                    }
                    debug!(
                        "{reached}/{} tasks {target} (attempt {attempt}/{})",
                        chunk.len(),
                        budget.max_attempts,
                    );
                }
                Err(err) => warn!("describe during {target} wait failed: {err:#}"),
            }
            tokio::time::sleep(budget.delay).await;
        }
        false
    }

    pub async fn wait_until_running(&self, arns: &[String]) -> Vec<String> {
        self.wait_for_state(arns, "RUNNING", self.running_wait).await
    }

    pub async fn wait_until_stopped(&self, arns: &[String]) -> Vec<String> {
        self.wait_for_state(arns, "STOPPED", self.stopped_wait).await
    }

    /// Fetch lifecycle records for all identifiers, chunked. A failed chunk
    /// is logged and skipped; results are concatenated in whatever order the
    /// chunks return.
    pub async fn describe_all(&self, arns: &[String]) -> Vec<TaskDescription> {
        let mut all = Vec::new();
        for chunk in arns.chunks(self.chunk_limit) {
            match self.scheduler.describe_tasks(chunk).await {
                Ok(mut tasks) => all.append(&mut tasks),
                Err(err) => {
                    warn!("describe of {} tasks failed, skipping chunk: {err:#}", chunk.len())
                }
            }
        }
        all
    }

    /// Best-effort stop of every identifier; one failure never blocks the
    /// rest.
    pub async fn stop_all(&self, arns: &[String]) {
        for arn in arns {
            if let Err(err) = self.scheduler.stop_task(arn).await {
                warn!("stop of {arn} failed: {err:#}");
            }
        }
    }

    /// Launch one task, wait for it to run, then stop it and wait for the
    /// stop to land. Failure here is setup-fatal for the callers.
    pub async fn warm_up(&self) -> Result<()> {
        info!("starting warm-up task");
        let arns = self.submit_batch(1).await;
        if arns.is_empty() {
            bail!("warm-up task creation failed");
        }
        if self.wait_until_running(&arns).await.is_empty() {
            bail!("warm-up task never reached RUNNING");
        }
        info!("stopping warm-up task");
        self.stop_all(&arns).await;
        self.wait_until_stopped(&arns).await;
        info!("warm-up complete");
        Ok(())
    }

    /// Concurrent launch: one worker per submission batch. Each worker owns
    /// its batch's submission and running-wait and returns its own
    /// identifier sets; the coordinator merges them only after every worker
    /// has finished (fan-out with a join barrier, no shared collection).
    pub async fn launch_concurrent(&self, total: usize, batch: usize) -> BatchRun {
        let sizes = batch_sizes(total, batch);
        info!("launching {total} tasks in {} batches", sizes.len());

        let num_batches = sizes.len();
        let mut workers = Vec::with_capacity(num_batches);
        for (idx, count) in sizes.into_iter().enumerate() {
            let coord = self.clone();
            workers.push(tokio::spawn(async move {
                info!("batch {}/{num_batches}: submitting {count} tasks", idx + 1);
                let submitted = coord.submit_batch(count).await;
                if submitted.is_empty() {
                    warn!("batch {}/{num_batches}: no tasks created", idx + 1);
                    return (Vec::new(), Vec::new());
                }
                let running = coord.wait_until_running(&submitted).await;
                info!(
                    "batch {}/{num_batches}: {}/{} tasks RUNNING",
                    idx + 1,
                    running.len(),
                    submitted.len(),
                );
                (submitted, running)
            }));
        }

        let mut run = BatchRun {
            requested: total,
            ..Default::default()
        };
        for joined in join_all(workers).await {
            match joined {
                Ok((submitted, running)) => {
                    for arn in &submitted {
                        let state = if running.contains(arn) {
                            TaskState::Running
                        } else {
                            TaskState::Failed
                        };
                        run.states.insert(arn.clone(), state);
                    }
                    run.task_arns.extend(submitted);
                }
                Err(err) => warn!("batch worker did not complete: {err}"),
            }
        }
        info!("created {}/{} tasks", run.task_arns.len(), run.requested);
        run
    }

    /// Fill in per-task reports for everything that reached RUNNING.
    pub async fn collect_reports(&self, run: &mut BatchRun) {
        let running = run.running_arns();
        for task in self.describe_all(&running).await {
            let durations = task.timestamps.durations();
            run.reports.push(TaskReport {
                arn: task.arn,
                timestamps: task.timestamps,
                durations,
            });
        }
    }

    /// Stop every submitted task, failed ones included, and wait for the
    /// stops to land.
    pub async fn shutdown(&self, run: &mut BatchRun) {
        self.stop_all(&run.task_arns).await;
        for arn in self.wait_until_stopped(&run.task_arns).await {
            run.states.insert(arn, TaskState::Stopped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_sizes_cover_total_exactly() {
        assert_eq!(batch_sizes(100, 10), vec![10; 10]);
        assert_eq!(batch_sizes(25, 10), vec![10, 10, 5]);
        assert_eq!(batch_sizes(7, 10), vec![7]);
        assert_eq!(batch_sizes(0, 10), Vec::<usize>::new());
    }

    #[test]
    fn batch_sizes_match_ceiling_division() {
        for total in 0..50usize {
            for batch in 1..20usize {
                let sizes = batch_sizes(total, batch);
                assert_eq!(sizes.len(), total.div_ceil(batch));
                assert_eq!(sizes.iter().sum::<usize>(), total);
                assert!(sizes.iter().all(|s| *s <= batch));
            }
        }
    }
}
