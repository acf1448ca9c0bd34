//! Sandbox integration tests.
//!
//! These require a running Docker daemon and the `python:3.10-alpine`
//! image, so they are ignored by default:
//!
//! ```sh
//! docker pull python:3.10-alpine
//! cargo test --test sandbox_docker -- --ignored
//! ```

use mentord::config::SandboxConfig;
use mentord::sandbox::{ExecutionStatus, SandboxExecutor, TestCase, run_test_suite};

async fn executor() -> SandboxExecutor {
    SandboxExecutor::connect(SandboxConfig::default())
        .await
        .expect("Docker must be running for these tests")
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn hello_world_succeeds() {
    let result = executor().await.execute("print('Hello')", "").await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output, "Hello\n");
    assert_eq!(result.exit_code, 0);
    assert!(result.error.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn stdin_is_injected() {
    let result = executor()
        .await
        .execute("a = input()\nb = input()\nprint(int(a) + int(b))", "5\n3")
        .await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.output.trim(), "8");
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn runaway_code_times_out() {
    let executor = executor().await;
    let result = executor.execute("import time; time.sleep(10)", "").await;

    assert_eq!(result.status, ExecutionStatus::Timeout);
    assert!(result.output.is_empty());
    assert!(result.error.contains("5 second"), "got: {}", result.error);
    assert!(result.execution_time >= 5.0);
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn crashes_become_error_results() {
    let result = executor().await.execute("raise ValueError('nope')", "").await;

    assert_eq!(result.status, ExecutionStatus::Error);
    assert_ne!(result.exit_code, 0);
    assert!(result.error.contains("Runtime Error: ValueError: nope"));
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn function_test_cases_pass_through_the_harness() {
    let executor = executor().await;
    let code = "def add(a, b):\n    return a + b";
    let cases = vec![
        TestCase {
            input: "1, 2".to_string(),
            expected_output: "3".to_string(),
            description: None,
        },
        TestCase {
            input: "5, 5".to_string(),
            expected_output: "10".to_string(),
            description: None,
        },
    ];

    let result = run_test_suite(&executor, code, &cases).await;

    assert_eq!(result.status, ExecutionStatus::Success);
    assert_eq!(result.test_results.len(), 2);
    assert!(result.test_results.iter().all(|case| case.passed));
    assert!(result.error.is_empty());
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn failing_case_marks_the_suite() {
    let executor = executor().await;
    let code = "def add(a, b):\n    return a - b";
    let cases = vec![TestCase {
        input: "1, 2".to_string(),
        expected_output: "3".to_string(),
        description: None,
    }];

    let result = run_test_suite(&executor, code, &cases).await;

    assert_eq!(result.status, ExecutionStatus::FailedTests);
    assert!(!result.test_results[0].passed);
    assert_eq!(result.test_results[0].actual_output, "-1");
}

#[tokio::test]
#[ignore = "requires Docker and the python:3.10-alpine image"]
async fn health_reports_limits() {
    let health = executor().await.health().await;

    assert!(health.docker_available);
    assert_eq!(health.resource_limits.memory_limit_mb, 128);
    assert_eq!(health.resource_limits.cpu_quota, 50_000);
    assert_eq!(health.resource_limits.timeout_secs, 5);
}
