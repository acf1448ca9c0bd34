//! Data fusion engine: three decision trees over one telemetry snapshot.
//!
//! Classifies how the current code got there (provenance), the learner's
//! run-rerun cadence (iteration), and their attentional posture (cognitive),
//! then derives effective metrics with non-productive activity removed.
//!
//! Thresholds are calibrated for novice programmers on short algorithmic
//! exercises (20-80 line solutions, 15-60 minute sessions) and do not
//! generalize beyond that domain.

use std::str::FromStr;

use serde::Serialize;

use crate::behavior::metrics::SessionMetrics;

/// Classification of how the present code got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProvenanceState {
    IncrementalEdit,
    AuthenticRefactoring,
    AmbiguousEdit,
    SuspectedPaste,
    Spamming,
}

impl ProvenanceState {
    /// Human-readable label used on the wire and in prompts.
    pub fn label(&self) -> &'static str {
        match self {
            ProvenanceState::IncrementalEdit => "Incremental Edit",
            ProvenanceState::AuthenticRefactoring => "Authentic Refactoring",
            ProvenanceState::AmbiguousEdit => "Ambiguous Large Edit",
            ProvenanceState::SuspectedPaste => "Suspected External Paste",
            ProvenanceState::Spamming => "Spamming",
        }
    }
}

impl FromStr for ProvenanceState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INCREMENTAL_EDIT" => Ok(ProvenanceState::IncrementalEdit),
            "AUTHENTIC_REFACTORING" => Ok(ProvenanceState::AuthenticRefactoring),
            "AMBIGUOUS_EDIT" => Ok(ProvenanceState::AmbiguousEdit),
            "SUSPECTED_PASTE" => Ok(ProvenanceState::SuspectedPaste),
            "SPAMMING" => Ok(ProvenanceState::Spamming),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Classification of the learner's run-rerun cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IterationState {
    Normal,
    DeliberateDebugging,
    VerificationRun,
    MicroIteration,
    RapidGuessing,
}

impl IterationState {
    pub fn label(&self) -> &'static str {
        match self {
            IterationState::Normal => "Normal",
            IterationState::DeliberateDebugging => "Deliberate Debugging",
            IterationState::VerificationRun => "Verification Run",
            IterationState::MicroIteration => "Micro-Iteration",
            IterationState::RapidGuessing => "Rapid-Fire Guessing",
        }
    }
}

impl FromStr for IterationState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(IterationState::Normal),
            "DELIBERATE_DEBUGGING" => Ok(IterationState::DeliberateDebugging),
            "VERIFICATION_RUN" => Ok(IterationState::VerificationRun),
            "MICRO_ITERATION" => Ok(IterationState::MicroIteration),
            "RAPID_GUESSING" => Ok(IterationState::RapidGuessing),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Classification of the learner's current attentional posture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CognitiveState {
    Active,
    ReflectivePause,
    PassiveIdle,
    Disengagement,
}

impl CognitiveState {
    pub fn label(&self) -> &'static str {
        match self {
            CognitiveState::Active => "Active",
            CognitiveState::ReflectivePause => "Reflective Pause",
            CognitiveState::PassiveIdle => "Passive Idle",
            CognitiveState::Disengagement => "Disengagement",
        }
    }
}

impl FromStr for CognitiveState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(CognitiveState::Active),
            "REFLECTIVE_PAUSE" => Ok(CognitiveState::ReflectivePause),
            "PASSIVE_IDLE" => Ok(CognitiveState::PassiveIdle),
            "DISENGAGEMENT" => Ok(CognitiveState::Disengagement),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Parse error for a behavioral state tag sent by the frontend.
#[derive(Debug, thiserror::Error)]
#[error("unknown behavioral state: {0}")]
pub struct UnknownState(pub String);

/// Fused behavioral insights derived from one telemetry snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionInsights {
    pub provenance_state: ProvenanceState,
    pub iteration_state: IterationState,
    pub cognitive_state: CognitiveState,

    /// Keystrokes per minute after spam nullification.
    pub effective_kpm: f64,
    /// Attempt density (runs per minute) after the guessing discount.
    pub effective_ad: f64,
    /// Idle ratio after reflective-pause exclusion.
    pub effective_ir: f64,
    /// 0.5 when a paste is suspected, 0.0 otherwise.
    pub integrity_penalty: f64,
}

/// Stateless classifier over [`SessionMetrics`].
///
/// Each call evaluates the current snapshot only; flags never carry over
/// between ticks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataFusionEngine;

impl DataFusionEngine {
    /// For novice solutions (250-500 chars typical), a 30-char insertion is
    /// 6-12% of the solution arriving at once; incremental novice edits run
    /// 5-15 chars.
    pub const LARGE_INSERTION_THRESHOLD: u64 = 30;

    /// Continuous-input burst band. 50-100 chars in a ~5s window is atypical
    /// for reflective novice workflows.
    pub const BURST_TYPING_MIN: u64 = 50;
    pub const BURST_TYPING_MAX: u64 = 100;

    /// Efficiency ratio = net_code_change / total_keystrokes. Novices land
    /// around 0.20-0.40 through trial and error; below 0.05 is key-mashing.
    pub const SPAM_KEYSTROKE_MINIMUM: u64 = 200;
    pub const SPAM_EFFICIENCY_THRESHOLD: f64 = 0.05;

    /// Minimum time to observe output, comprehend it, and formulate a change.
    pub const RAPID_ITERATION_THRESHOLD_SECS: f64 = 10.0;

    /// Rapid-fire attempts still give feedback; they keep 80% weight.
    pub const RAPID_GUESSING_PENALTY: f64 = 0.8;

    /// Gate that opens the idle-context branch.
    pub const REFLECTIVE_PAUSE_MIN_SECS: f64 = 30.0;

    /// Part of the published calibration but not consulted by the
    /// classifier: past the 30s gate the focus signal decides instead.
    pub const DISENGAGEMENT_THRESHOLD_SECS: f64 = 120.0;

    pub fn new() -> Self {
        Self
    }

    /// Classify one telemetry snapshot and derive effective metrics.
    pub fn analyze(&self, metrics: &SessionMetrics) -> FusionInsights {
        let (provenance_state, effective_kpm, integrity_penalty) =
            self.classify_provenance(metrics);
        let (iteration_state, effective_ad) = self.classify_iteration(metrics);
        let (cognitive_state, effective_ir) = self.classify_cognitive(metrics);

        FusionInsights {
            provenance_state,
            iteration_state,
            cognitive_state,
            effective_kpm,
            effective_ad,
            effective_ir,
            integrity_penalty,
        }
    }

    /// Provenance & authenticity tree.
    ///
    /// Defaults to `IncrementalEdit` with no penalty; later rules only
    /// overwrite earlier ones where their guards explicitly permit.
    fn classify_provenance(&self, metrics: &SessionMetrics) -> (ProvenanceState, f64, f64) {
        let mut provenance = ProvenanceState::IncrementalEdit;
        let mut integrity_penalty = 0.0;

        let raw_kpm = if metrics.duration_minutes > 0.0 {
            metrics.total_keystrokes as f64 / metrics.duration_minutes
        } else {
            0.0
        };

        // Large insertions: how many recent keystrokes produced this edit?
        // A 100-char edit backed by 10 keystrokes was not typed here.
        if metrics.last_edit_size_chars > Self::LARGE_INSERTION_THRESHOLD {
            let keystroke_to_insertion_ratio =
                metrics.recent_burst_size_chars as f64 / metrics.last_edit_size_chars as f64;

            if keystroke_to_insertion_ratio < 0.2
                && metrics.focus_violation_count > 0
                && metrics.last_edit_size_chars > 50
            {
                // Very large insertion + tab-switch + almost no typing.
                provenance = ProvenanceState::SuspectedPaste;
                integrity_penalty = 0.5;
            } else if keystroke_to_insertion_ratio > 0.8 {
                // The learner typed it: authentic refactor/rewrite.
                provenance = ProvenanceState::AuthenticRefactoring;
            } else {
                // Could be an internal block move or fast typing.
                provenance = ProvenanceState::AmbiguousEdit;
            }
        }

        let efficiency_ratio = if metrics.total_keystrokes > 50 {
            metrics.net_code_change as f64 / metrics.total_keystrokes as f64
        } else {
            1.0
        };

        let is_burst_typing = (Self::BURST_TYPING_MIN..=Self::BURST_TYPING_MAX)
            .contains(&metrics.recent_burst_size_chars);

        // Secondary paste check: lots of code, extremely few keystrokes,
        // multiple focus violations. Never overwrites an already-set paste
        // or spam verdict.
        if metrics.net_code_change > 200
            && (metrics.total_keystrokes as f64) < metrics.net_code_change as f64 * 0.3
            && metrics.focus_violation_count > 2
            && provenance != ProvenanceState::SuspectedPaste
            && provenance != ProvenanceState::Spamming
        {
            provenance = ProvenanceState::SuspectedPaste;
            integrity_penalty = 0.5;
        }

        let effective_kpm = if metrics.total_keystrokes > Self::SPAM_KEYSTROKE_MINIMUM
            && efficiency_ratio < Self::SPAM_EFFICIENCY_THRESHOLD
        {
            // High keystroke volume with negligible code retention:
            // nullify the KPM contribution entirely.
            provenance = ProvenanceState::Spamming;
            0.0
        } else if is_burst_typing && efficiency_ratio < 0.15 {
            // Burst typing with low efficiency keeps half credit and only
            // promotes to Spamming from the default state.
            if provenance == ProvenanceState::IncrementalEdit {
                provenance = ProvenanceState::Spamming;
            }
            raw_kpm * 0.5
        } else {
            raw_kpm
        };

        (provenance, effective_kpm, integrity_penalty)
    }

    /// Iteration quality tree.
    fn classify_iteration(&self, metrics: &SessionMetrics) -> (IterationState, f64) {
        let iteration;
        let mut effective_runs = metrics.total_run_attempts as f64;

        if metrics.last_run_interval_seconds < Self::RAPID_ITERATION_THRESHOLD_SECS {
            if !metrics.is_semantic_change {
                // Quick re-run of effectively the same code.
                iteration = IterationState::RapidGuessing;
                effective_runs *= Self::RAPID_GUESSING_PENALTY;
            } else if metrics.last_run_was_error {
                // A fast re-run after an error is trial and error even when
                // the code changed; reading the error alone takes longer
                // than this interval.
                iteration = IterationState::RapidGuessing;
                effective_runs *= Self::RAPID_GUESSING_PENALTY;
            } else {
                iteration = IterationState::MicroIteration;
            }
        } else if metrics.is_semantic_change {
            iteration = IterationState::DeliberateDebugging;
        } else {
            iteration = IterationState::VerificationRun;
        }

        let effective_ad = if metrics.duration_minutes > 0.0 {
            effective_runs / metrics.duration_minutes
        } else {
            0.0
        };

        (iteration, effective_ad)
    }

    /// Cognitive state tree: contextualizes the in-progress idle segment.
    fn classify_cognitive(&self, metrics: &SessionMetrics) -> (CognitiveState, f64) {
        let mut cognitive = CognitiveState::Active;
        let mut adjusted_idle_minutes = metrics.total_idle_minutes;

        if metrics.current_idle_duration > Self::REFLECTIVE_PAUSE_MIN_SECS {
            if !metrics.is_window_focused {
                cognitive = CognitiveState::Disengagement;
            } else if metrics.last_run_was_error {
                // Reading the error message and planning a fix is productive:
                // exclude this pause from the idle penalty.
                cognitive = CognitiveState::ReflectivePause;
                let current_pause_min = metrics.current_idle_duration / 60.0;
                adjusted_idle_minutes = (metrics.total_idle_minutes - current_pause_min).max(0.0);
            } else {
                cognitive = CognitiveState::PassiveIdle;
            }
        }

        let effective_ir = if metrics.duration_minutes > 0.0 {
            adjusted_idle_minutes / metrics.duration_minutes
        } else {
            0.0
        };

        (cognitive, effective_ir)
    }
}
