// src/config.rs
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::constants;

/// Benchmark configuration. Every field has a built-in default (the Fargate
/// stack names); a YAML file only needs to name what it overrides. The EC2
/// subcommand swaps in its own resource-name defaults via [`BenchConfig::ec2`]
/// when no config file is given.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BenchConfig {
    /// AWS region the stack and cluster live in.
    #[serde(default = "default_region")]
    pub region: String,

    /// CloudFormation stack whose outputs carry the network/compute handles.
    #[serde(default = "default_stack_name")]
    pub stack_name: String,

    #[serde(default = "default_cluster")]
    pub cluster: String,

    #[serde(default = "default_task_definition")]
    pub task_definition: String,

    /// Number of tasks the concurrent benchmark launches.
    #[serde(default = "default_task_count")]
    pub task_count: usize,

    /// Tasks per bulk submission. RunTask caps this at 10.
    #[serde(default = "default_submit_batch")]
    pub submit_batch: usize,

    /// Identifiers per describe/wait call. DescribeTasks caps this at 100.
    #[serde(default = "default_describe_batch")]
    pub describe_batch: usize,

    /// Measured cold/hot rounds in the EC2 benchmark.
    #[serde(default = "default_rounds")]
    pub rounds: usize,

    #[serde(default = "default_running_poll_delay", with = "humantime_serde")]
    pub running_poll_delay: Duration,
    #[serde(default = "default_running_poll_attempts")]
    pub running_poll_attempts: u32,

    #[serde(default = "default_stopped_poll_delay", with = "humantime_serde")]
    pub stopped_poll_delay: Duration,
    #[serde(default = "default_stopped_poll_attempts")]
    pub stopped_poll_attempts: u32,

    /// Budget for a fresh EC2 instance to register with the cluster.
    #[serde(default = "default_register_poll_delay", with = "humantime_serde")]
    pub register_poll_delay: Duration,
    #[serde(default = "default_register_poll_attempts")]
    pub register_poll_attempts: u32,

    /// Budget for the resident container instance to appear after stack
    /// creation.
    #[serde(default = "default_resident_poll_delay", with = "humantime_serde")]
    pub resident_poll_delay: Duration,
    #[serde(default = "default_resident_poll_attempts")]
    pub resident_poll_attempts: u32,

    /// Settle time between EC2 cold/hot rounds.
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,

    /// Opaque provisioning scripts. Only their exit code is interpreted;
    /// when absent, the stack is assumed to already exist.
    #[serde(default)]
    pub create_script: Option<PathBuf>,
    #[serde(default)]
    pub delete_script: Option<PathBuf>,
}

fn default_region() -> String {
    constants::DEFAULT_REGION.to_string()
}
fn default_stack_name() -> String {
    constants::FARGATE_STACK_NAME.to_string()
}
fn default_cluster() -> String {
    constants::FARGATE_CLUSTER.to_string()
}
fn default_task_definition() -> String {
    constants::FARGATE_TASK_DEFINITION.to_string()
}
fn default_task_count() -> usize {
    constants::DEFAULT_TASK_COUNT
}
fn default_submit_batch() -> usize {
    constants::SUBMIT_BATCH_LIMIT
}
fn default_describe_batch() -> usize {
    constants::DESCRIBE_BATCH_LIMIT
}
fn default_rounds() -> usize {
    constants::DEFAULT_ROUNDS
}
fn default_running_poll_delay() -> Duration {
    constants::RUNNING_POLL_DELAY
}
fn default_running_poll_attempts() -> u32 {
    constants::RUNNING_POLL_ATTEMPTS
}
fn default_stopped_poll_delay() -> Duration {
    constants::STOPPED_POLL_DELAY
}
fn default_stopped_poll_attempts() -> u32 {
    constants::STOPPED_POLL_ATTEMPTS
}
fn default_register_poll_delay() -> Duration {
    constants::REGISTER_POLL_DELAY
}
fn default_register_poll_attempts() -> u32 {
    constants::REGISTER_POLL_ATTEMPTS
}
fn default_resident_poll_delay() -> Duration {
    constants::RESIDENT_POLL_DELAY
}
fn default_resident_poll_attempts() -> u32 {
    constants::RESIDENT_POLL_ATTEMPTS
}
fn default_settle_delay() -> Duration {
    constants::SETTLE_DELAY
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            stack_name: default_stack_name(),
            cluster: default_cluster(),
            task_definition: default_task_definition(),
            task_count: default_task_count(),
            submit_batch: default_submit_batch(),
            describe_batch: default_describe_batch(),
            rounds: default_rounds(),
            running_poll_delay: default_running_poll_delay(),
            running_poll_attempts: default_running_poll_attempts(),
            stopped_poll_delay: default_stopped_poll_delay(),
            stopped_poll_attempts: default_stopped_poll_attempts(),
            register_poll_delay: default_register_poll_delay(),
            register_poll_attempts: default_register_poll_attempts(),
            resident_poll_delay: default_resident_poll_delay(),
            resident_poll_attempts: default_resident_poll_attempts(),
            settle_delay: default_settle_delay(),
            create_script: None,
            delete_script: None,
        }
    }
}

impl BenchConfig {
    /// Defaults for the EC2-backed benchmark: same knobs, EC2 resource names.
    pub fn ec2() -> Self {
        Self {
            stack_name: constants::EC2_STACK_NAME.to_string(),
            cluster: constants::EC2_CLUSTER.to_string(),
            task_definition: constants::EC2_TASK_DEFINITION.to_string(),
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}
