//! Code-execution endpoints with behavioral-telemetry side effects.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::DataFusionEngine;
use crate::sandbox::{
    ExecutionResult, ExecutionStatus, SandboxHealth, TestCase, TestCaseResult, run_test_suite,
};
use crate::server::AppState;

/// Request body for `/api/execution/run`.
#[derive(Debug, Deserialize)]
pub struct ExecutionRequest {
    pub session_id: String,
    pub problem_id: String,
    pub code: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub test_cases: Option<Vec<TestCase>>,
    #[serde(default)]
    pub telemetry: Option<ExecutionTelemetry>,
}

/// Telemetry shipped alongside an execution request.
#[derive(Debug, Deserialize)]
pub struct ExecutionTelemetry {
    #[serde(default)]
    pub last_run_timestamp: Option<DateTime<Utc>>,
    /// Forward-compatible extras the fusion engine may consume later.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Execution-side behavioral flags fed to the fusion pipeline.
#[derive(Debug, Serialize)]
pub struct BehavioralFlags {
    pub last_run_was_error: bool,
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_interval_seconds: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rapid_iteration: Option<bool>,
}

/// Response body for `/api/execution/run`.
#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub status: ExecutionStatus,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time: f64,
    pub exit_code: i64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub test_results: Vec<TestCaseResult>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behavioral_flags: Option<BehavioralFlags>,
}

/// Execute learner code in the sandbox, optionally against test cases.
///
/// Side effects are scheduled as background tasks and are not synchronized
/// with the response: the session-code snapshot for chat context, and the
/// execution event log.
pub async fn run_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResponse>, (StatusCode, String)> {
    let executor = state.executor.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Execution service unavailable".to_string(),
    ))?;

    tracing::info!(
        session_id = %request.session_id,
        problem_id = %request.problem_id,
        "execution request"
    );

    // Snapshot the code for chat context retrieval.
    {
        let code_store = Arc::clone(&state.code_store);
        let session_id = request.session_id.clone();
        let problem_id = request.problem_id.clone();
        let code = request.code.clone();
        tokio::spawn(async move {
            code_store.store(&session_id, &problem_id, &code).await;
        });
    }

    let result = match &request.test_cases {
        Some(cases) if !cases.is_empty() => {
            run_test_suite(executor, &request.code, cases).await
        }
        _ => {
            executor
                .execute(&request.code, request.stdin.as_deref().unwrap_or(""))
                .await
        }
    };

    let behavioral_flags = analyze_execution_behavior(&result, request.telemetry.as_ref());

    // Record the run for retrospective analysis, off the response path.
    {
        let session_id = request.session_id;
        let problem_id = request.problem_id;
        let status = result.status;
        let execution_time = result.execution_time;
        tokio::spawn(async move {
            tracing::info!(
                session_id = %session_id,
                problem_id = %problem_id,
                event_type = "run_attempt",
                ?status,
                execution_time,
                "execution event recorded"
            );
        });
    }

    Ok(Json(ExecutionResponse {
        status: result.status,
        output: result.output,
        error: if result.error.is_empty() {
            None
        } else {
            Some(result.error)
        },
        execution_time: result.execution_time,
        exit_code: result.exit_code,
        test_results: result.test_results,
        timestamp: Utc::now(),
        behavioral_flags,
    }))
}

/// Sandbox health: runtime reachability, image presence, limits.
pub async fn health_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SandboxHealth>, (StatusCode, String)> {
    let executor = state.executor.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "Execution service unavailable".to_string(),
    ))?;

    let health = executor.health().await;
    if !health.is_healthy() {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "Execution service unavailable".to_string(),
        ));
    }
    Ok(Json(health))
}

/// Derive behavioral flags from the execution outcome and shipped telemetry.
///
/// Feeds the cognitive tree (`last_run_was_error`) and the iteration tree
/// (run intervals). Returns `None` when no telemetry was shipped.
fn analyze_execution_behavior(
    result: &ExecutionResult,
    telemetry: Option<&ExecutionTelemetry>,
) -> Option<BehavioralFlags> {
    let telemetry = telemetry?;

    let now = Utc::now();
    let interval = telemetry
        .last_run_timestamp
        .map(|last_run| (now - last_run).num_milliseconds() as f64 / 1000.0);

    Some(BehavioralFlags {
        last_run_was_error: result.status == ExecutionStatus::Error,
        execution_time: result.execution_time,
        timestamp: now,
        last_run_interval_seconds: interval,
        rapid_iteration: interval
            .filter(|secs| *secs < DataFusionEngine::RAPID_ITERATION_THRESHOLD_SECS)
            .map(|_| true),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result_with_status(status: ExecutionStatus) -> ExecutionResult {
        ExecutionResult {
            status,
            output: String::new(),
            error: String::new(),
            execution_time: 0.2,
            exit_code: 0,
            test_results: Vec::new(),
        }
    }

    #[test]
    fn no_telemetry_means_no_flags() {
        let result = result_with_status(ExecutionStatus::Success);
        assert!(analyze_execution_behavior(&result, None).is_none());
    }

    #[test]
    fn error_status_sets_the_error_flag() {
        let telemetry = ExecutionTelemetry {
            last_run_timestamp: None,
            extra: HashMap::new(),
        };
        let flags = analyze_execution_behavior(
            &result_with_status(ExecutionStatus::Error),
            Some(&telemetry),
        )
        .unwrap();
        assert!(flags.last_run_was_error);
        assert!(flags.last_run_interval_seconds.is_none());
        assert!(flags.rapid_iteration.is_none());
    }

    #[test]
    fn recent_run_flags_rapid_iteration() {
        let telemetry = ExecutionTelemetry {
            last_run_timestamp: Some(Utc::now() - chrono::Duration::seconds(3)),
            extra: HashMap::new(),
        };
        let flags = analyze_execution_behavior(
            &result_with_status(ExecutionStatus::Success),
            Some(&telemetry),
        )
        .unwrap();
        assert_eq!(flags.rapid_iteration, Some(true));
        assert!(flags.last_run_interval_seconds.unwrap() < 10.0);
    }

    #[test]
    fn old_run_does_not_flag_rapid_iteration() {
        let telemetry = ExecutionTelemetry {
            last_run_timestamp: Some(Utc::now() - chrono::Duration::seconds(60)),
            extra: HashMap::new(),
        };
        let flags = analyze_execution_behavior(
            &result_with_status(ExecutionStatus::Success),
            Some(&telemetry),
        )
        .unwrap();
        assert!(flags.rapid_iteration.is_none());
        assert!(flags.last_run_interval_seconds.unwrap() >= 59.0);
    }
}
