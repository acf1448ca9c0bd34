//! Scope and intervention policies for the pedagogical firewall.
//!
//! The scope policy is the fast path: a lowercased pattern sweep that
//! rejects clearly off-topic or unethical queries, flags solution-seeking
//! for the Socratic prompt to handle, and passes everything ambiguous to
//! the model-based validator. Guide learning, never give solutions.

use std::sync::LazyLock;

use regex::Regex;

use crate::behavior::{CognitiveState, IterationState};

/// Why the scope policy allowed or rejected a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeReason {
    OutOfScopeDomain,
    BorderlineSolutionSeeking,
    LearningOriented,
    NeedsLlmValidation,
}

impl ScopeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeReason::OutOfScopeDomain => "OUT_OF_SCOPE_DOMAIN",
            ScopeReason::BorderlineSolutionSeeking => "BORDERLINE_SOLUTION_SEEKING",
            ScopeReason::LearningOriented => "LEARNING_ORIENTED",
            ScopeReason::NeedsLlmValidation => "NEEDS_LLM_VALIDATION",
        }
    }
}

/// Outcome of the fast-path filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeDecision {
    pub allowed: bool,
    pub reason: ScopeReason,
}

/// Keywords that indicate learning-oriented queries (in scope).
const LEARNING_KEYWORDS: &[&str] = &[
    // Understanding
    "how", "why", "what", "explain", "understand", "confused", "difference", "between", "mean",
    "means",
    // Problem-solving
    "hint", "stuck", "help", "approach", "strategy", "think", "start", "beginning", "idea",
    // Debugging
    "error", "bug", "wrong", "not working", "issue", "problem", "debug", "fix", "fail",
    // Concepts
    "algorithm", "complexity", "time", "space", "data structure", "loop", "recursion", "variable",
    "function",
];

/// Patterns that indicate solution-seeking (borderline: the Socratic prompt
/// still constrains the reply, so these are allowed but flagged).
static SOLUTION_SEEKING_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(write|code|implement|complete)\s+(the\s+)?(code|solution|function|program)",
        r"(?i)\bgive\s+me\s+(the\s+)?(answer|solution|code)",
        r"(?i)\bsolve\s+(this|the)\s+problem",
        r"(?i)\bshow\s+me\s+(the\s+)?(solution|code|answer)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid solution-seeking pattern"))
    .collect()
});

/// Patterns clearly out of scope.
static OUT_OF_SCOPE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Non-programming topics
        r"(?i)\b(weather|news|sports|recipe|movie|music)\b",
        // Unethical requests
        r"(?i)\b(hack|cheat|steal|plagiarize|copy)\b",
        // Personal information
        r"(?i)\b(personal|address|phone|email|password)\b",
        // Professional-advice domains
        r"(?i)\b(medical|legal|financial)\s+advice\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid out-of-scope pattern"))
    .collect()
});

/// Pattern-based fast-path filter for user queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopePolicy;

impl ScopePolicy {
    /// Sweep the query before any model call.
    pub fn quick_filter(query: &str) -> ScopeDecision {
        if OUT_OF_SCOPE_PATTERNS.iter().any(|p| p.is_match(query)) {
            return ScopeDecision {
                allowed: false,
                reason: ScopeReason::OutOfScopeDomain,
            };
        }

        // Solution-seeking is allowed through: the Socratic prompt redirects
        // it instead of refusing outright.
        if SOLUTION_SEEKING_PATTERNS.iter().any(|p| p.is_match(query)) {
            return ScopeDecision {
                allowed: true,
                reason: ScopeReason::BorderlineSolutionSeeking,
            };
        }

        let query_lower = query.to_lowercase();
        if LEARNING_KEYWORDS.iter().any(|kw| query_lower.contains(kw)) {
            return ScopeDecision {
                allowed: true,
                reason: ScopeReason::LearningOriented,
            };
        }

        ScopeDecision {
            allowed: true,
            reason: ScopeReason::NeedsLlmValidation,
        }
    }
}

/// Decides when behavioral state warrants proactive help.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterventionPolicy;

impl InterventionPolicy {
    /// Urgency at which the tutor proactively intervenes.
    const INTERVENTION_URGENCY_FLOOR: u8 = 2;

    fn urgency(cognitive: CognitiveState) -> u8 {
        match cognitive {
            CognitiveState::Active => 0,
            CognitiveState::ReflectivePause => 1,
            CognitiveState::PassiveIdle => 2,
            CognitiveState::Disengagement => 3,
        }
    }

    /// Whether proactive intervention is needed for this state pair.
    pub fn should_intervene(cognitive: CognitiveState, iteration: IterationState) -> bool {
        let mut urgency = Self::urgency(cognitive);

        // Problematic iteration patterns raise urgency even when the
        // learner looks attentive.
        if matches!(
            iteration,
            IterationState::RapidGuessing | IterationState::MicroIteration
        ) {
            urgency = urgency.max(2);
        }

        urgency >= Self::INTERVENTION_URGENCY_FLOOR
    }
}
