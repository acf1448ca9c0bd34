//! Raw per-session telemetry carrier.

use serde::{Deserialize, Serialize};

/// Raw telemetry for one learner session, as collected by the frontend.
///
/// The frontend only counts and buffers; every interpretation (spam
/// detection, paste suspicion, idle contextualization) happens server-side
/// in the fusion engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Elapsed session wall-clock, in minutes.
    pub duration_minutes: f64,
    /// Every logical keypress counted.
    pub total_keystrokes: u64,
    /// Count of executions submitted.
    pub total_run_attempts: u64,
    /// Sum of idle segments, in minutes.
    pub total_idle_minutes: f64,
    /// Tab-switch / window-blur events.
    pub focus_violation_count: u64,
    /// Final code length in characters.
    pub net_code_change: i64,
    /// Size of the most recent contiguous insertion, in characters.
    pub last_edit_size_chars: u64,
    /// Gap between the two most recent runs, in seconds.
    pub last_run_interval_seconds: f64,
    /// Whether the code meaningfully differs from the prior run.
    pub is_semantic_change: bool,
    /// Length of the in-progress idle segment, in seconds.
    pub current_idle_duration: f64,
    /// Whether the editor window currently has focus.
    pub is_window_focused: bool,
    /// Whether the last execution ended in an error.
    pub last_run_was_error: bool,
    /// Characters typed in a trailing ~5-second window.
    #[serde(default)]
    pub recent_burst_size_chars: u64,
}
