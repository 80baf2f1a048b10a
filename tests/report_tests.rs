// tests/report_tests.rs

use startup_bench::coordinator::TaskReport;
use startup_bench::report::{append_summary_row, write_task_table};
use startup_bench::timestamps::TaskTimestamps;
use tempfile::TempDir;

#[test]
fn test_summary_csv_appends_with_single_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("startup_times.csv");

    append_summary_row(&path, 1, 12_000, 2_500).unwrap();
    append_summary_row(&path, 2, 11_400, 2_650).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "run,cold_start_ms,hot_start_ms,time_saved_ms");
    assert_eq!(lines[1], "1,12000,2500,9500");
    assert_eq!(lines[2], "2,11400,2650,8750");
}

#[test]
fn test_task_table_keeps_absent_values_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("task_times.tsv");

    let full = TaskTimestamps {
        created: Some(1_000),
        started: Some(3_500),
        pull_started: Some(1_500),
        pull_stopped: Some(3_000),
    };
    let cached = TaskTimestamps {
        created: Some(1_000),
        started: Some(2_200),
        pull_started: None,
        pull_stopped: None,
    };
    let reports = vec![
        TaskReport {
            arn: "arn:aws:ecs:task/0001".to_string(),
            timestamps: full,
            durations: full.durations(),
        },
        TaskReport {
            arn: "arn:aws:ecs:task/0002".to_string(),
            timestamps: cached,
            durations: cached.durations(),
        },
    ];
    write_task_table(&path, &reports).unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("task_arn\tcreated_ms"));
    assert_eq!(
        lines[1],
        "arn:aws:ecs:task/0001\t1000\t3500\t1500\t3000\t2500\t1500\t1000"
    );
    // Pre-cached image: pull timestamps and the dependent durations stay empty
    assert_eq!(lines[2], "arn:aws:ecs:task/0002\t1000\t2200\t\t\t1200\t\t");
}
