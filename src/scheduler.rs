//! Typed interface to the remote task scheduler, plus its AWS SDK
//! implementation.
//!
//! Everything downstream (coordinator, drivers, tests) talks to the
//! [`TaskScheduler`] trait and receives structured records; nothing scrapes
//! command output. The `aws` CLI adapter in [`crate::scheduler_cli`] sits
//! behind the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_ecs::primitives::DateTime;
use aws_sdk_ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, LaunchType, NetworkConfiguration,
};

use crate::timestamps::TaskTimestamps;

/// One task record as reported by the scheduler.
#[derive(Debug, Clone, Default)]
pub struct TaskDescription {
    pub arn: String,
    pub last_status: Option<String>,
    pub timestamps: TaskTimestamps,
}

/// A submission the backend rejected. Both fields are optional because the
/// backend does not always attribute a failure to a specific identifier.
#[derive(Debug, Clone, Default)]
pub struct SubmitFailure {
    pub arn: Option<String>,
    pub reason: Option<String>,
}

/// Result of one submission call: the identifiers that were accepted and the
/// failures that were not. Partial failure is an expected outcome, not an
/// error.
#[derive(Debug, Clone, Default)]
pub struct SubmitOutcome {
    pub task_arns: Vec<String>,
    pub failures: Vec<SubmitFailure>,
}

/// awsvpc network configuration resolved from the stack outputs.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub subnet_id: String,
    pub security_group_id: String,
}

#[async_trait]
pub trait TaskScheduler: Send + Sync {
    /// Bulk-submit `count` tasks in a single call.
    async fn submit_tasks(&self, count: usize) -> Result<SubmitOutcome>;

    /// Start one task pinned to a specific container instance (EC2 path).
    async fn start_task_on_instance(&self, container_instance_arn: &str)
        -> Result<SubmitOutcome>;

    /// Fetch lifecycle records for up to one describe-chunk of identifiers.
    async fn describe_tasks(&self, task_arns: &[String]) -> Result<Vec<TaskDescription>>;

    async fn stop_task(&self, task_arn: &str) -> Result<()>;

    /// Container instances currently registered with the cluster.
    async fn list_container_instances(&self) -> Result<Vec<String>>;

    /// Resolve the container-instance ARN registered for an EC2 instance id,
    /// if it has registered yet.
    async fn container_instance_for_ec2(&self, ec2_instance_id: &str)
        -> Result<Option<String>>;
}

/// SDK-backed scheduler. With a [`NetworkConfig`], bulk submissions launch on
/// Fargate; without one, tasks are only started pinned to container
/// instances (EC2-backed cluster).
pub struct EcsScheduler {
    client: aws_sdk_ecs::Client,
    cluster: String,
    task_definition: String,
    network: Option<NetworkConfig>,
}

impl EcsScheduler {
    pub fn new(
        cfg: &aws_config::SdkConfig,
        cluster: impl Into<String>,
        task_definition: impl Into<String>,
        network: Option<NetworkConfig>,
    ) -> Self {
        Self {
            client: aws_sdk_ecs::Client::new(cfg),
            cluster: cluster.into(),
            task_definition: task_definition.into(),
            network,
        }
    }

    fn network_configuration(&self) -> Result<Option<NetworkConfiguration>> {
        let Some(net) = &self.network else {
            return Ok(None);
        };
        let vpc = AwsVpcConfiguration::builder()
            .subnets(&net.subnet_id)
            .security_groups(&net.security_group_id)
            .assign_public_ip(AssignPublicIp::Enabled)
            .build()
            .context("invalid awsvpc configuration")?;
        Ok(Some(
            NetworkConfiguration::builder()
                .awsvpc_configuration(vpc)
                .build(),
        ))
    }
}

fn sdk_millis(dt: Option<&DateTime>) -> Option<i64> {
    dt.and_then(|d| d.to_millis().ok())
}

fn outcome_from(
    tasks: &[aws_sdk_ecs::types::Task],
    failures: &[aws_sdk_ecs::types::Failure],
) -> SubmitOutcome {
    SubmitOutcome {
        task_arns: tasks
            .iter()
            .filter_map(|t| t.task_arn().map(str::to_string))
            .collect(),
        failures: failures
            .iter()
            .map(|f| SubmitFailure {
                arn: f.arn().map(str::to_string),
                reason: f.reason().map(str::to_string),
            })
            .collect(),
    }
}

#[async_trait]
impl TaskScheduler for EcsScheduler {
    async fn submit_tasks(&self, count: usize) -> Result<SubmitOutcome> {
        let mut req = self
            .client
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .count(count as i32);
        if let Some(network) = self.network_configuration()? {
            req = req
                .launch_type(LaunchType::Fargate)
                .platform_version("LATEST")
                .network_configuration(network);
        }
        let resp = req.send().await.context("RunTask call failed")?;
        Ok(outcome_from(resp.tasks(), resp.failures()))
    }

    async fn start_task_on_instance(
        &self,
        container_instance_arn: &str,
    ) -> Result<SubmitOutcome> {
        let resp = self
            .client
            .start_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .container_instances(container_instance_arn)
            .send()
            .await
            .context("StartTask call failed")?;
        Ok(outcome_from(resp.tasks(), resp.failures()))
    }

    async fn describe_tasks(&self, task_arns: &[String]) -> Result<Vec<TaskDescription>> {
        let resp = self
            .client
            .describe_tasks()
            .cluster(&self.cluster)
            .set_tasks(Some(task_arns.to_vec()))
            .send()
            .await
            .context("DescribeTasks call failed")?;
        Ok(resp
            .tasks()
            .iter()
            .filter_map(|t| {
                let arn = t.task_arn()?.to_string();
                Some(TaskDescription {
                    arn,
                    last_status: t.last_status().map(str::to_string),
                    timestamps: TaskTimestamps {
                        created: sdk_millis(t.created_at()),
                        started: sdk_millis(t.started_at()),
                        pull_started: sdk_millis(t.pull_started_at()),
                        pull_stopped: sdk_millis(t.pull_stopped_at()),
                    },
                })
            })
            .collect())
    }

    async fn stop_task(&self, task_arn: &str) -> Result<()> {
        self.client
            .stop_task()
            .cluster(&self.cluster)
            .task(task_arn)
            .reason("benchmark finished")
            .send()
            .await
            .with_context(|| format!("StopTask call failed for {task_arn}"))?;
        Ok(())
    }

    async fn list_container_instances(&self) -> Result<Vec<String>> {
        let resp = self
            .client
            .list_container_instances()
            .cluster(&self.cluster)
            .send()
            .await
            .context("ListContainerInstances call failed")?;
        Ok(resp.container_instance_arns().to_vec())
    }

    async fn container_instance_for_ec2(
        &self,
        ec2_instance_id: &str,
    ) -> Result<Option<String>> {
        let arns = self.list_container_instances().await?;
        if arns.is_empty() {
            return Ok(None);
        }
        let resp = self
            .client
            .describe_container_instances()
            .cluster(&self.cluster)
            .set_container_instances(Some(arns))
            .send()
            .await
            .context("DescribeContainerInstances call failed")?;
        Ok(resp
            .container_instances()
            .iter()
            .find(|ci| ci.ec2_instance_id() == Some(ec2_instance_id))
            .and_then(|ci| ci.container_instance_arn().map(str::to_string)))
    }
}
