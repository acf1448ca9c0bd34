//! Sandboxed execution of untrusted learner code.
//!
//! Every run gets a freshly created Docker container with the network
//! disabled, a 128 MiB memory cap, half a CPU core, a read-only root
//! filesystem with a small writable `/tmp` tmpfs, and a hard wall-clock
//! timeout. Containers are removed on every path, including timeout.
//!
//! Learner outcomes (crashes, timeouts, failed tests) are data, not errors:
//! [`SandboxExecutor::execute`] always produces an [`ExecutionResult`].
//! [`crate::error::SandboxError`] is reserved for the runtime itself being
//! unreachable.

pub mod runner;
pub mod wrapper;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bollard::Docker;
use bollard::container::{
    Config as ContainerConfig, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, WaitContainerOptions,
};
use bollard::models::HostConfig;
use futures::StreamExt;
use serde::Serialize;

use crate::config::SandboxConfig;
use crate::error::SandboxError;

pub use runner::{TestCase, TestCaseResult, run_test_suite};

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
    FailedTests,
}

/// Outcome of running learner code once (or once per test case).
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Captured stdout.
    pub output: String,
    /// Captured stderr, or an explanatory message for infra-level failures.
    pub error: String,
    /// Wall-clock seconds, rounded to milliseconds.
    pub execution_time: f64,
    pub exit_code: i64,
    /// Per-case outcomes when the run was driven by a test suite.
    pub test_results: Vec<TestCaseResult>,
}

impl ExecutionResult {
    fn infra_error(message: impl Into<String>, elapsed: f64) -> Self {
        Self {
            status: ExecutionStatus::Error,
            output: String::new(),
            error: message.into(),
            execution_time: round_ms(elapsed),
            exit_code: 1,
            test_results: Vec::new(),
        }
    }
}

/// Health snapshot of the sandbox subsystem.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxHealth {
    pub status: &'static str,
    pub docker_available: bool,
    pub image_available: bool,
    pub image_name: String,
    pub resource_limits: ResourceLimits,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceLimits {
    pub memory_limit_mb: i64,
    pub cpu_quota: i64,
    pub timeout_secs: u64,
}

impl SandboxHealth {
    pub fn is_healthy(&self) -> bool {
        self.docker_available && self.image_available
    }
}

/// Executes learner code in isolated, resource-capped containers.
pub struct SandboxExecutor {
    docker: Docker,
    config: SandboxConfig,
}

impl SandboxExecutor {
    /// Connect to the local container runtime and verify it responds.
    pub async fn connect(config: SandboxConfig) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()?;
        docker
            .ping()
            .await
            .map_err(|e| SandboxError::RuntimeUnavailable {
                reason: e.to_string(),
            })?;
        tracing::info!(image = %config.image, "sandbox runtime connected");
        Ok(Self { docker, config })
    }

    /// Execute one piece of learner code with the given stdin.
    ///
    /// Never fails: every failure mode maps onto the result's status and
    /// error fields.
    pub async fn execute(&self, code: &str, stdin: &str) -> ExecutionResult {
        let started = Instant::now();
        let wrapped = wrapper::wrap_user_code(code, stdin);

        let container_config = ContainerConfig {
            image: Some(self.config.image.clone()),
            cmd: Some(vec!["python".to_string(), "-c".to_string(), wrapped]),
            env: Some(vec![
                "PYTHONUNBUFFERED=1".to_string(),
                "PYTHONDONTWRITEBYTECODE=1".to_string(),
            ]),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                memory: Some(self.config.memory_limit_bytes),
                cpu_quota: Some(self.config.cpu_quota),
                readonly_rootfs: Some(true),
                tmpfs: Some(HashMap::from([(
                    "/tmp".to_string(),
                    "size=10M,mode=1777".to_string(),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let container_id = match self
            .docker
            .create_container::<String, String>(None, container_config)
            .await
        {
            Ok(response) => response.id,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                tracing::error!(image = %self.config.image, "sandbox image not present");
                return ExecutionResult::infra_error(
                    "Execution environment not available. Please contact the administrator.",
                    0.0,
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "container creation failed");
                return ExecutionResult::infra_error(
                    format!("Container execution failed: {e}"),
                    started.elapsed().as_secs_f64(),
                );
            }
        };

        if let Err(e) = self
            .docker
            .start_container(&container_id, None::<StartContainerOptions<String>>)
            .await
        {
            tracing::error!(error = %e, "container start failed");
            self.remove_quietly(&container_id).await;
            return ExecutionResult::infra_error(
                format!("Container execution failed: {e}"),
                started.elapsed().as_secs_f64(),
            );
        }

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let mut wait_stream = self
            .docker
            .wait_container(&container_id, None::<WaitContainerOptions<String>>);

        let exit_code = match tokio::time::timeout(timeout, wait_stream.next()).await {
            // Clean exit.
            Ok(Some(Ok(response))) => response.status_code,
            // bollard reports nonzero exits through the error channel.
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => code,
            Ok(Some(Err(e))) => {
                tracing::error!(error = %e, "container wait failed");
                self.stop_and_remove(&container_id).await;
                return ExecutionResult::infra_error(
                    format!("Unexpected error: {e}"),
                    started.elapsed().as_secs_f64(),
                );
            }
            Ok(None) => {
                self.stop_and_remove(&container_id).await;
                return ExecutionResult::infra_error(
                    "Unexpected error: container wait stream ended early",
                    started.elapsed().as_secs_f64(),
                );
            }
            // Wall clock exceeded: stop immediately, report timeout.
            Err(_) => {
                self.stop_and_remove(&container_id).await;
                let elapsed = started.elapsed().as_secs_f64();
                tracing::warn!(elapsed, "execution timed out");
                return ExecutionResult {
                    status: ExecutionStatus::Timeout,
                    output: String::new(),
                    error: format!(
                        "Execution exceeded {} second time limit",
                        self.config.timeout_secs
                    ),
                    execution_time: round_ms(elapsed),
                    exit_code: -1,
                    test_results: Vec::new(),
                };
            }
        };

        let stdout = self.collect_logs(&container_id, true, false).await;
        let stderr = self.collect_logs(&container_id, false, true).await;
        self.remove_quietly(&container_id).await;

        let elapsed = started.elapsed().as_secs_f64();
        let status = if exit_code == 0 {
            ExecutionStatus::Success
        } else {
            ExecutionStatus::Error
        };
        tracing::info!(?status, exit_code, elapsed, "execution completed");

        ExecutionResult {
            status,
            output: stdout,
            error: stderr,
            execution_time: round_ms(elapsed),
            exit_code,
            test_results: Vec::new(),
        }
    }

    /// Check runtime and image availability without running anything.
    pub async fn health(&self) -> SandboxHealth {
        let docker_available = self.docker.ping().await.is_ok();
        let image_available = docker_available
            && self
                .docker
                .inspect_image(&self.config.image)
                .await
                .is_ok();

        SandboxHealth {
            status: if docker_available && image_available {
                "healthy"
            } else {
                "unhealthy"
            },
            docker_available,
            image_available,
            image_name: self.config.image.clone(),
            resource_limits: ResourceLimits {
                memory_limit_mb: self.config.memory_limit_bytes / (1024 * 1024),
                cpu_quota: self.config.cpu_quota,
                timeout_secs: self.config.timeout_secs,
            },
        }
    }

    /// Read one of the container's log streams after exit.
    async fn collect_logs(&self, container_id: &str, stdout: bool, stderr: bool) -> String {
        let mut stream = self.docker.logs(
            container_id,
            Some(LogsOptions::<String> {
                stdout,
                stderr,
                ..Default::default()
            }),
        );

        let mut collected = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::StdErr { message }) => {
                    collected.push_str(&String::from_utf8_lossy(&message));
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "log collection failed");
                    break;
                }
            }
        }
        collected
    }

    async fn stop_and_remove(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .stop_container(container_id, Some(StopContainerOptions { t: 0 }))
            .await
        {
            tracing::debug!(error = %e, "container stop failed (may have exited)");
        }
        self.remove_quietly(container_id).await;
    }

    async fn remove_quietly(&self, container_id: &str) {
        if let Err(e) = self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            tracing::warn!(error = %e, container_id, "container removal failed");
        }
    }
}

fn round_ms(seconds: f64) -> f64 {
    (seconds * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Success).unwrap(),
            "\"success\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::FailedTests).unwrap(),
            "\"failed_tests\""
        );
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::Timeout).unwrap(),
            "\"timeout\""
        );
    }

    #[test]
    fn infra_error_shape() {
        let result = ExecutionResult::infra_error("boom", 0.1234567);
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.error, "boom");
        assert_eq!(result.exit_code, 1);
        assert_eq!(result.execution_time, 0.123);
        assert!(result.output.is_empty());
    }

    #[test]
    fn round_ms_truncates_to_millis() {
        assert_eq!(round_ms(1.2345678), 1.235);
        assert_eq!(round_ms(0.0), 0.0);
    }
}
