// tests/config_tests.rs
use startup_bench::config::BenchConfig;
use std::time::Duration;

#[test]
fn test_empty_config_uses_fargate_defaults() {
    let cfg: BenchConfig = serde_yaml::from_str("{}").unwrap();
    assert_eq!(cfg.region, "us-east-2");
    assert_eq!(cfg.stack_name, "fargate-test");
    assert_eq!(cfg.cluster, "fargate-startup-test-cluster");
    assert_eq!(cfg.task_definition, "startup-test-task");
    assert_eq!(cfg.task_count, 100);
    assert_eq!(cfg.submit_batch, 10);
    assert_eq!(cfg.describe_batch, 100);
    assert_eq!(cfg.running_poll_delay, Duration::from_secs(2));
    assert_eq!(cfg.stopped_poll_delay, Duration::from_secs(6));
    assert!(cfg.create_script.is_none());
}

#[test]
fn test_partial_override_keeps_other_defaults() {
    let yaml = r#"
region: eu-west-1
task_count: 40
settle_delay: 45s
running_poll_attempts: 10
"#;
    let cfg: BenchConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.region, "eu-west-1");
    assert_eq!(cfg.task_count, 40);
    assert_eq!(cfg.settle_delay, Duration::from_secs(45));
    assert_eq!(cfg.running_poll_attempts, 10);
    // Untouched fields keep their defaults
    assert_eq!(cfg.cluster, "fargate-startup-test-cluster");
    assert_eq!(cfg.rounds, 100);
}

#[test]
fn test_humantime_durations_parse() {
    let yaml = r#"
running_poll_delay: 500ms
stopped_poll_delay: 2m
"#;
    let cfg: BenchConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.running_poll_delay, Duration::from_millis(500));
    assert_eq!(cfg.stopped_poll_delay, Duration::from_secs(120));
}

#[test]
fn test_ec2_defaults_swap_resource_names() {
    let cfg = BenchConfig::ec2();
    assert_eq!(cfg.stack_name, "ec2-test");
    assert_eq!(cfg.cluster, "ec2-startup-test-cluster");
    assert_eq!(cfg.task_definition, "ec2-startup-test-task");
    // Shared knobs stay identical to the Fargate defaults
    assert_eq!(cfg.region, "us-east-2");
    assert_eq!(cfg.submit_batch, 10);
}

#[test]
fn test_scripts_roundtrip() {
    let yaml = r#"
create_script: ./create.sh
delete_script: ./delete.sh
"#;
    let cfg: BenchConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(cfg.create_script.as_deref(), Some(std::path::Path::new("./create.sh")));
    assert_eq!(cfg.delete_script.as_deref(), Some(std::path::Path::new("./delete.sh")));
}
