//! Telemetry analysis endpoint: raw metrics in, CES and states out.
//!
//! The frontend only collects and buffers raw behavioral signals; this
//! handler runs the fusion engine and the CES calculator and returns the
//! flattened result.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::behavior::SessionMetrics;
use crate::server::AppState;

/// Raw telemetry from the frontend.
#[derive(Debug, Deserialize)]
pub struct TelemetryRequest {
    pub session_id: String,
    pub problem_id: String,

    pub session_duration_minutes: f64,
    pub total_keystrokes: u64,
    pub total_run_attempts: u64,
    pub total_idle_minutes: f64,
    pub focus_violation_count: u64,
    pub net_code_change: i64,

    pub last_edit_size_chars: u64,
    pub last_run_interval_seconds: f64,
    pub is_semantic_change: bool,
    pub current_idle_duration: f64,
    pub is_window_focused: bool,
    pub last_run_was_error: bool,
    #[serde(default)]
    pub recent_burst_size_chars: u64,
}

/// Computed behavioral insights.
#[derive(Debug, Serialize)]
pub struct TelemetryResponse {
    // Raw rates before fusion adjustments.
    pub kpm: f64,
    pub ad: f64,
    pub ir: f64,
    pub fvc: u64,

    pub ces: f64,
    pub ces_classification: &'static str,

    pub provenance_state: &'static str,
    pub iteration_state: &'static str,
    pub cognitive_state: &'static str,

    // Effective metrics after fusion adjustments.
    pub effective_kpm: f64,
    pub effective_ad: f64,
    pub effective_ir: f64,
    pub integrity_penalty: f64,

    pub timestamp: DateTime<Utc>,
}

pub async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TelemetryRequest>,
) -> Json<TelemetryResponse> {
    tracing::info!(
        session_id = %request.session_id,
        problem_id = %request.problem_id,
        "processing telemetry"
    );

    let metrics = SessionMetrics {
        duration_minutes: request.session_duration_minutes,
        total_keystrokes: request.total_keystrokes,
        total_run_attempts: request.total_run_attempts,
        total_idle_minutes: request.total_idle_minutes,
        focus_violation_count: request.focus_violation_count,
        net_code_change: request.net_code_change,
        last_edit_size_chars: request.last_edit_size_chars,
        last_run_interval_seconds: request.last_run_interval_seconds,
        is_semantic_change: request.is_semantic_change,
        current_idle_duration: request.current_idle_duration,
        is_window_focused: request.is_window_focused,
        last_run_was_error: request.last_run_was_error,
        recent_burst_size_chars: request.recent_burst_size_chars,
    };

    let insights = state.fusion.analyze(&metrics);
    let ces_result = state.ces.calculate(&metrics, &insights);

    tracing::info!(
        ces = ces_result.ces,
        classification = ces_result.classification.label(),
        "CES computed"
    );

    let rate = |value: f64| {
        if metrics.duration_minutes > 0.0 {
            value / metrics.duration_minutes
        } else {
            0.0
        }
    };

    Json(TelemetryResponse {
        kpm: rate(metrics.total_keystrokes as f64),
        ad: rate(metrics.total_run_attempts as f64),
        ir: rate(metrics.total_idle_minutes),
        fvc: metrics.focus_violation_count,
        ces: ces_result.ces,
        ces_classification: ces_result.classification.label(),
        provenance_state: insights.provenance_state.label(),
        iteration_state: insights.iteration_state.label(),
        cognitive_state: insights.cognitive_state.label(),
        effective_kpm: ces_result.effective_kpm,
        effective_ad: ces_result.effective_ad,
        effective_ir: ces_result.effective_ir,
        integrity_penalty: insights.integrity_penalty,
        timestamp: Utc::now(),
    })
}
