// src/constants.rs
//
// Central location for all constants used throughout startup-bench
// This makes tuning and maintenance easier by having all magic numbers in one place

use std::time::Duration;

// =============================================================================
// Remote API limits
// =============================================================================

/// Maximum tasks one bulk RunTask call may request
/// User can override (downward) via config: submit_batch
pub const SUBMIT_BATCH_LIMIT: usize = 10;

/// Maximum identifiers one DescribeTasks call accepts
/// Wait and describe calls are chunked to this size
/// User can override via config: describe_batch
pub const DESCRIBE_BATCH_LIMIT: usize = 100;

// =============================================================================
// Benchmark defaults
// =============================================================================

/// Region the benchmark stacks are deployed in
pub const DEFAULT_REGION: &str = "us-east-2";

/// Tasks launched by the concurrent Fargate benchmark
pub const DEFAULT_TASK_COUNT: usize = 100;

/// Measured cold/hot rounds in the EC2 benchmark
pub const DEFAULT_ROUNDS: usize = 100;

/// Histogram bins for the rendered startup-time distributions
pub const HISTOGRAM_BINS: usize = 15;

// Fargate stack resource names
pub const FARGATE_STACK_NAME: &str = "fargate-test";
pub const FARGATE_CLUSTER: &str = "fargate-startup-test-cluster";
pub const FARGATE_TASK_DEFINITION: &str = "startup-test-task";

// EC2 stack resource names
pub const EC2_STACK_NAME: &str = "ec2-test";
pub const EC2_CLUSTER: &str = "ec2-startup-test-cluster";
pub const EC2_TASK_DEFINITION: &str = "ec2-startup-test-task";

// =============================================================================
// Poll budgets (fixed delay x bounded attempts; no exponential backoff)
// =============================================================================

/// Delay between polls while waiting for tasks to reach RUNNING
pub const RUNNING_POLL_DELAY: Duration = Duration::from_secs(2);
pub const RUNNING_POLL_ATTEMPTS: u32 = 100;

/// Delay between polls while waiting for tasks to reach STOPPED
pub const STOPPED_POLL_DELAY: Duration = Duration::from_secs(6);
pub const STOPPED_POLL_ATTEMPTS: u32 = 100;

/// Budget for a fresh EC2 instance to register with the ECS cluster
pub const REGISTER_POLL_DELAY: Duration = Duration::from_secs(20);
pub const REGISTER_POLL_ATTEMPTS: u32 = 20;

/// Budget for the resident (hot) container instance to appear after stack creation
pub const RESIDENT_POLL_DELAY: Duration = Duration::from_secs(30);
pub const RESIDENT_POLL_ATTEMPTS: u32 = 40;

/// Budget for a terminated EC2 instance to actually reach the terminated state
pub const TERMINATE_POLL_DELAY: Duration = Duration::from_secs(15);
pub const TERMINATE_POLL_ATTEMPTS: u32 = 40;

/// Settle time between EC2 cold/hot rounds
pub const SETTLE_DELAY: Duration = Duration::from_secs(30);
