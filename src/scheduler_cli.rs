//! `aws` CLI adapter for the scheduler interface.
//!
//! Last-resort path for hosts where only the command-line tool is available.
//! Output is requested as `--output json` and parsed into typed records with
//! serde, so the rest of the system sees the same structured
//! [`TaskDescription`]s the SDK path produces. CLI builds disagree on
//! timestamp encoding (epoch seconds vs ISO-8601 strings); both land in
//! [`RawInstant`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use crate::scheduler::{
    NetworkConfig, SubmitFailure, SubmitOutcome, TaskDescription, TaskScheduler,
};
use crate::timestamps::{RawInstant, TaskTimestamps};

pub struct CliScheduler {
    region: String,
    cluster: String,
    task_definition: String,
    network: Option<NetworkConfig>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CliTask {
    task_arn: Option<String>,
    last_status: Option<String>,
    created_at: Option<RawInstant>,
    started_at: Option<RawInstant>,
    pull_started_at: Option<RawInstant>,
    pull_stopped_at: Option<RawInstant>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CliFailure {
    arn: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct TasksOutput {
    #[serde(default)]
    tasks: Vec<CliTask>,
    #[serde(default)]
    failures: Vec<CliFailure>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListInstancesOutput {
    #[serde(default)]
    container_instance_arns: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    container_instances: Vec<CliContainerInstance>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct CliContainerInstance {
    container_instance_arn: Option<String>,
    ec2_instance_id: Option<String>,
}

impl CliTask {
    fn into_description(self) -> Option<TaskDescription> {
        let arn = self.task_arn?;
        Some(TaskDescription {
            arn,
            last_status: self.last_status,
            timestamps: TaskTimestamps {
                created: self.created_at.as_ref().and_then(RawInstant::to_millis),
                started: self.started_at.as_ref().and_then(RawInstant::to_millis),
                pull_started: self.pull_started_at.as_ref().and_then(RawInstant::to_millis),
                pull_stopped: self.pull_stopped_at.as_ref().and_then(RawInstant::to_millis),
            },
        })
    }
}

fn outcome_from(out: TasksOutput) -> SubmitOutcome {
    SubmitOutcome {
        task_arns: out.tasks.into_iter().filter_map(|t| t.task_arn).collect(),
        failures: out
            .failures
            .into_iter()
            .map(|f| SubmitFailure {
                arn: f.arn,
                reason: f.reason,
            })
            .collect(),
    }
}

impl CliScheduler {
    pub fn new(
        region: impl Into<String>,
        cluster: impl Into<String>,
        task_definition: impl Into<String>,
        network: Option<NetworkConfig>,
    ) -> Self {
        Self {
            region: region.into(),
            cluster: cluster.into(),
            task_definition: task_definition.into(),
            network,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<Vec<u8>> {
        let output = Command::new("aws")
            .args(["--region", &self.region, "--output", "json", "ecs"])
            .args(args)
            .output()
            .await
            .context("failed to spawn aws")?;
        if !output.status.success() {
            bail!(
                "aws ecs {} exited with {}: {}",
                args.first().copied().unwrap_or(""),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(output.stdout)
    }

    fn network_arg(&self) -> Option<String> {
        self.network.as_ref().map(|net| {
            format!(
                "awsvpcConfiguration={{subnets=[{}],securityGroups=[{}],assignPublicIp=ENABLED}}",
                net.subnet_id, net.security_group_id
            )
        })
    }
}

#[async_trait]
impl TaskScheduler for CliScheduler {
    async fn submit_tasks(&self, count: usize) -> Result<SubmitOutcome> {
        let count = count.to_string();
        let mut args = vec![
            "run-task",
            "--cluster",
            self.cluster.as_str(),
            "--task-definition",
            self.task_definition.as_str(),
            "--count",
            count.as_str(),
        ];
        let network = self.network_arg();
        if let Some(network) = &network {
            args.extend([
                "--launch-type",
                "FARGATE",
                "--platform-version",
                "LATEST",
                "--network-configuration",
                network.as_str(),
            ]);
        }
        let stdout = self.run(&args).await?;
        let out: TasksOutput =
            serde_json::from_slice(&stdout).context("unparseable run-task output")?;
        Ok(outcome_from(out))
    }

    async fn start_task_on_instance(
        &self,
        container_instance_arn: &str,
    ) -> Result<SubmitOutcome> {
        let stdout = self
            .run(&[
                "start-task",
                "--cluster",
                &self.cluster,
                "--task-definition",
                &self.task_definition,
                "--container-instances",
                container_instance_arn,
            ])
            .await?;
        let out: TasksOutput =
            serde_json::from_slice(&stdout).context("unparseable start-task output")?;
        Ok(outcome_from(out))
    }

    async fn describe_tasks(&self, task_arns: &[String]) -> Result<Vec<TaskDescription>> {
        let mut args = vec!["describe-tasks", "--cluster", self.cluster.as_str(), "--tasks"];
        args.extend(task_arns.iter().map(String::as_str));
        let stdout = self.run(&args).await?;
        let out: TasksOutput =
            serde_json::from_slice(&stdout).context("unparseable describe-tasks output")?;
        Ok(out
            .tasks
            .into_iter()
            .filter_map(CliTask::into_description)
            .collect())
    }

    async fn stop_task(&self, task_arn: &str) -> Result<()> {
        self.run(&[
            "stop-task",
            "--cluster",
            &self.cluster,
            "--task",
            task_arn,
            "--reason",
            "benchmark finished",
        ])
        .await?;
        Ok(())
    }

    async fn list_container_instances(&self) -> Result<Vec<String>> {
        let stdout = self
            .run(&["list-container-instances", "--cluster", &self.cluster])
            .await?;
        let out: ListInstancesOutput = serde_json::from_slice(&stdout)
            .context("unparseable list-container-instances output")?;
        Ok(out.container_instance_arns)
    }

    async fn container_instance_for_ec2(
        &self,
        ec2_instance_id: &str,
    ) -> Result<Option<String>> {
        let arns = self.list_container_instances().await?;
        if arns.is_empty() {
            return Ok(None);
        }
        let mut args = vec![
            "describe-container-instances",
            "--cluster",
            self.cluster.as_str(),
            "--container-instances",
        ];
        args.extend(arns.iter().map(String::as_str));
        let stdout = self.run(&args).await?;
        let out: DescribeInstancesOutput = serde_json::from_slice(&stdout)
            .context("unparseable describe-container-instances output")?;
        Ok(out
            .container_instances
            .into_iter()
            .find(|ci| ci.ec2_instance_id.as_deref() == Some(ec2_instance_id))
            .and_then(|ci| ci.container_instance_arn))
    }
}
