//! Cognitive Engagement Score calculation.
//!
//! Consumes the fusion engine's effective metrics, normalizes each by
//! clamped min-max, applies fixed weights and the integrity penalty, and
//! clamps the result to [-1, 1].

use serde::Serialize;

use crate::behavior::fusion::FusionInsights;
use crate::behavior::metrics::SessionMetrics;

/// Engagement classification derived from the final score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CesClassification {
    High,
    Moderate,
    Low,
    DisengagedSuspicious,
}

impl CesClassification {
    /// Human-readable label used on the wire.
    pub fn label(&self) -> &'static str {
        match self {
            CesClassification::High => "High Engagement",
            CesClassification::Moderate => "Moderate Engagement",
            CesClassification::Low => "Low Engagement",
            CesClassification::DisengagedSuspicious => "Disengaged/Suspicious",
        }
    }
}

/// Result of one CES computation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CesResult {
    /// Final score in [-1, 1], rounded to 4 decimal places.
    pub ces: f64,
    pub classification: CesClassification,

    // Debug echo of the effective metrics that produced the score.
    pub effective_kpm: f64,
    pub effective_ad: f64,
    pub effective_ir: f64,
}

/// Pure CES computation over fused insights.
#[derive(Debug, Clone, Copy, Default)]
pub struct CesCalculator;

impl CesCalculator {
    // Normalization ranges, tuned for the novice exercise domain.
    pub const MIN_KPM: f64 = 5.0;
    pub const MAX_KPM: f64 = 24.0;
    pub const MIN_AD: f64 = 0.05;
    pub const MAX_AD: f64 = 0.50;
    pub const MIN_IR: f64 = 0.0;
    pub const MAX_IR: f64 = 0.60;
    pub const MIN_FVC: f64 = 0.0;
    pub const MAX_FVC: f64 = 10.0;

    // Weights: productive signals minus disengagement signals.
    pub const W_KPM: f64 = 0.40;
    pub const W_AD: f64 = 0.30;
    pub const W_IR: f64 = 0.20;
    pub const W_FVC: f64 = 0.10;

    pub fn new() -> Self {
        Self
    }

    /// Compute the CES from effective metrics.
    ///
    /// KPM, AD, and IR use the fused effective values; FVC uses the raw
    /// count since focus violations are never excused by context.
    pub fn calculate(&self, metrics: &SessionMetrics, insights: &FusionInsights) -> CesResult {
        let kpm_norm = normalize(insights.effective_kpm, Self::MIN_KPM, Self::MAX_KPM);
        let ad_norm = normalize(insights.effective_ad, Self::MIN_AD, Self::MAX_AD);
        let ir_norm = normalize(insights.effective_ir, Self::MIN_IR, Self::MAX_IR);
        let fvc_norm = normalize(
            metrics.focus_violation_count as f64,
            Self::MIN_FVC,
            Self::MAX_FVC,
        );

        let productive_score = Self::W_KPM * kpm_norm + Self::W_AD * ad_norm;
        let penalty_score = Self::W_IR * ir_norm + Self::W_FVC * fvc_norm;

        let ces = (productive_score - penalty_score - insights.integrity_penalty).clamp(-1.0, 1.0);
        let ces = round4(ces);

        CesResult {
            ces,
            classification: classify(ces),
            effective_kpm: round2(insights.effective_kpm),
            effective_ad: round2(insights.effective_ad),
            effective_ir: round2(insights.effective_ir),
        }
    }
}

/// Clamped min-max normalization into [0, 1].
fn normalize(value: f64, min: f64, max: f64) -> f64 {
    if max - min == 0.0 {
        return 0.0;
    }
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

fn classify(score: f64) -> CesClassification {
    if score > 0.5 {
        CesClassification::High
    } else if score > 0.2 {
        CesClassification::Moderate
    } else if score > 0.0 {
        CesClassification::Low
    } else {
        CesClassification::DisengagedSuspicious
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
