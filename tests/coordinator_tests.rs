// tests/coordinator_tests.rs

// Behavior tests for the batch launch coordinator, driven through an
// in-memory scheduler that records every call it receives.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use startup_bench::coordinator::{Coordinator, TaskState, WaitBudget};
use startup_bench::scheduler::{
    SubmitFailure, SubmitOutcome, TaskDescription, TaskScheduler,
};
use startup_bench::timestamps::TaskTimestamps;

const FAST: WaitBudget = WaitBudget {
    delay: Duration::from_millis(1),
    max_attempts: 3,
};

#[derive(Default)]
struct MockState {
    next_id: usize,
    /// Submissions to reject (consumed across submit calls).
    reject_submissions: usize,
    /// Whole submit calls to fail outright before succeeding.
    fail_submit_calls: usize,
    statuses: HashMap<String, String>,
    describe_calls: Vec<Vec<String>>,
    stop_calls: Vec<String>,
    fail_stop_for: HashSet<String>,
}

#[derive(Default)]
struct MockScheduler {
    state: Mutex<MockState>,
}

impl MockScheduler {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Pre-register identifiers without going through submission.
    fn seed_tasks(&self, count: usize, status: &str) -> Vec<String> {
        self.with(|st| {
            (0..count)
                .map(|_| {
                    let arn = format!("arn:aws:ecs:task/{:04}", st.next_id);
                    st.next_id += 1;
                    st.statuses.insert(arn.clone(), status.to_string());
                    arn
                })
                .collect()
        })
    }
}

#[async_trait]
impl TaskScheduler for MockScheduler {
    async fn submit_tasks(&self, count: usize) -> Result<SubmitOutcome> {
        self.with(|st| {
            if st.fail_submit_calls > 0 {
                st.fail_submit_calls -= 1;
                bail!("simulated submission outage");
            }
            let rejected = st.reject_submissions.min(count);
            st.reject_submissions -= rejected;
            let mut outcome = SubmitOutcome::default();
            for _ in 0..count - rejected {
                let arn = format!("arn:aws:ecs:task/{:04}", st.next_id);
                st.next_id += 1;
                st.statuses.insert(arn.clone(), "RUNNING".to_string());
                outcome.task_arns.push(arn);
            }
            for _ in 0..rejected {
                outcome.failures.push(SubmitFailure {
                    arn: None,
                    reason: Some("RESOURCE:MEMORY".to_string()),
                });
            }
            Ok(outcome)
        })
    }

    async fn start_task_on_instance(&self, _instance: &str) -> Result<SubmitOutcome> {
        self.submit_tasks(1).await
    }

    async fn describe_tasks(&self, task_arns: &[String]) -> Result<Vec<TaskDescription>> {
        self.with(|st| {
            st.describe_calls.push(task_arns.to_vec());
            Ok(task_arns
                .iter()
                .map(|arn| TaskDescription {
                    arn: arn.clone(),
                    last_status: st.statuses.get(arn).cloned(),
                    timestamps: TaskTimestamps {
                        created: Some(1_000),
                        started: Some(3_500),
                        pull_started: Some(1_500),
                        pull_stopped: Some(3_000),
                    },
                })
                .collect())
        })
    }

    async fn stop_task(&self, task_arn: &str) -> Result<()> {
        self.with(|st| {
            st.stop_calls.push(task_arn.to_string());
            if st.fail_stop_for.contains(task_arn) {
                bail!("simulated stop failure for {task_arn}");
            }
            st.statuses.insert(task_arn.to_string(), "STOPPED".to_string());
            Ok(())
        })
    }

    async fn list_container_instances(&self) -> Result<Vec<String>> {
        Ok(vec!["arn:aws:ecs:container-instance/resident".to_string()])
    }

    async fn container_instance_for_ec2(&self, _id: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

fn coordinator(scheduler: Arc<MockScheduler>, chunk_limit: usize) -> Coordinator<MockScheduler> {
    Coordinator::new(scheduler, chunk_limit, FAST, FAST)
}

#[tokio::test]
async fn wait_issues_single_chunk_under_limit() {
    let scheduler = MockScheduler::new();
    let arns = scheduler.seed_tasks(10, "RUNNING");
    let coord = coordinator(scheduler.clone(), 20);

    let reached = coord.wait_until_running(&arns).await;
    assert_eq!(reached.len(), 10);

    let calls = scheduler.with(|st| st.describe_calls.clone());
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 10);
}

#[tokio::test]
async fn wait_chunks_at_limit_with_no_duplicates() {
    let scheduler = MockScheduler::new();
    let arns = scheduler.seed_tasks(25, "RUNNING");
    let coord = coordinator(scheduler.clone(), 20);

    let reached = coord.wait_until_running(&arns).await;
    assert_eq!(reached.len(), 25);

    let calls = scheduler.with(|st| st.describe_calls.clone());
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].len(), 20);
    assert_eq!(calls[1].len(), 5);

    let union: HashSet<&String> = calls.iter().flatten().collect();
    assert_eq!(union.len(), 25);
    assert_eq!(union, arns.iter().collect());
}

#[tokio::test]
async fn describe_all_concatenates_chunks() {
    let scheduler = MockScheduler::new();
    let arns = scheduler.seed_tasks(45, "RUNNING");
    let coord = coordinator(scheduler.clone(), 20);

    let described = coord.describe_all(&arns).await;
    assert_eq!(described.len(), 45);

    let calls = scheduler.with(|st| st.describe_calls.clone());
    assert_eq!(
        calls.iter().map(Vec::len).collect::<Vec<_>>(),
        vec![20, 20, 5]
    );
}

#[tokio::test]
async fn partial_submission_failure_is_not_fatal() {
    let scheduler = MockScheduler::new();
    scheduler.with(|st| st.reject_submissions = 3);
    let coord = coordinator(scheduler, 100);

    let arns = coord.submit_batch(10).await;
    assert_eq!(arns.len(), 7);
}

#[tokio::test]
async fn whole_batch_failure_yields_empty_batch() {
    let scheduler = MockScheduler::new();
    scheduler.with(|st| st.fail_submit_calls = 1);
    let coord = coordinator(scheduler, 100);

    let arns = coord.submit_batch(10).await;
    assert!(arns.is_empty());
}

#[tokio::test]
async fn wait_timeout_excludes_only_the_stuck_chunk() {
    let scheduler = MockScheduler::new();
    let mut arns = scheduler.seed_tasks(2, "RUNNING");
    arns.extend(scheduler.seed_tasks(2, "PROVISIONING"));
    // Chunk limit 2 puts the stuck pair in its own chunk.
    let coord = coordinator(scheduler, 2);

    let reached = coord.wait_until_running(&arns).await;
    assert_eq!(reached, arns[..2].to_vec());
}

#[tokio::test]
async fn launch_concurrent_fans_out_and_merges() {
    let scheduler = MockScheduler::new();
    let coord = coordinator(scheduler.clone(), 100);

    let run = coord.launch_concurrent(25, 10).await;
    assert_eq!(run.requested, 25);
    assert_eq!(run.task_arns.len(), 25);
    assert_eq!(run.count_in(TaskState::Running), 25);

    // No identifier owned by two workers.
    let unique: HashSet<&String> = run.task_arns.iter().collect();
    assert_eq!(unique.len(), 25);
}

#[tokio::test]
async fn launch_concurrent_tolerates_one_dead_batch() {
    let scheduler = MockScheduler::new();
    scheduler.with(|st| st.fail_submit_calls = 1);
    let coord = coordinator(scheduler, 100);

    let run = coord.launch_concurrent(30, 10).await;
    // One of the three batches contributed nothing; the rest proceeded.
    assert_eq!(run.task_arns.len(), 20);
    assert_eq!(run.count_in(TaskState::Running), 20);
}

#[tokio::test]
async fn collect_reports_covers_running_tasks_only() {
    let scheduler = MockScheduler::new();
    let coord = coordinator(scheduler.clone(), 100);

    let mut run = coord.launch_concurrent(10, 10).await;
    // Flip two tasks to a non-terminal state after the fact and mark them
    // failed, as a running-wait timeout would have.
    for arn in run.task_arns[..2].to_vec() {
        run.states.insert(arn, TaskState::Failed);
    }

    coord.collect_reports(&mut run).await;
    assert_eq!(run.reports.len(), 8);
    for report in &run.reports {
        assert_eq!(report.durations.total_ms, Some(2500));
        assert_eq!(report.durations.pull_ms, Some(1500));
        assert_eq!(report.durations.prepare_ms, Some(1000));
    }
}

#[tokio::test]
async fn shutdown_is_best_effort_per_task() {
    let scheduler = MockScheduler::new();
    let coord = coordinator(scheduler.clone(), 100);

    let mut run = coord.launch_concurrent(5, 5).await;
    let doomed = run.task_arns[0].clone();
    scheduler.with(|st| {
        st.fail_stop_for.insert(doomed.clone());
    });

    coord.shutdown(&mut run).await;

    // Every identifier received a stop attempt despite the failure.
    let stop_calls = scheduler.with(|st| st.stop_calls.clone());
    assert_eq!(stop_calls.len(), 5);
    // The failed one never reached STOPPED, so the stopped-wait chunk it
    // shares times out and nothing in it is confirmed; the run still ends.
    assert!(run.count_in(TaskState::Stopped) < 5);
}

#[tokio::test]
async fn warm_up_round_trips_one_task() {
    let scheduler = MockScheduler::new();
    let coord = coordinator(scheduler.clone(), 100);

    coord.warm_up().await.expect("warm-up should succeed");

    let stop_calls = scheduler.with(|st| st.stop_calls.clone());
    assert_eq!(stop_calls.len(), 1);
}

#[tokio::test]
async fn warm_up_failure_is_fatal() {
    let scheduler = MockScheduler::new();
    scheduler.with(|st| st.fail_submit_calls = 1);
    let coord = coordinator(scheduler, 100);

    assert!(coord.warm_up().await.is_err());
}
