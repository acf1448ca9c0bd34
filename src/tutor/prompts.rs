//! Prompt assembly for the Socratic tutor.
//!
//! Produces a `(system, user)` pair. The system prompt carries the persona,
//! the problem statement, an optional truncated code block, and a one-line
//! behavioral summary with a single state-specific tail clause. The user
//! prompt is always the learner's raw query; conversation history is passed
//! to the provider separately, never concatenated here.

use crate::behavior::{CognitiveState, IterationState, ProvenanceState};

/// Max characters of learner code embedded in the prompt (~200 tokens).
const MAX_CODE_CONTEXT_CHARS: usize = 800;

/// System prompt for the model-based scope validator.
pub const SCOPE_VALIDATOR_SYSTEM: &str = "\
You are a scope validator. Determine if the user's request is about:
1. Getting help with algorithmic/coding problems
2. Understanding code concepts, debugging, or learning
3. Asking for hints or explanations

Respond with ONLY 'IN_SCOPE' or 'OUT_OF_SCOPE'. No explanations.";

/// Canned reply for rejected queries. Returned verbatim, never generated.
pub const OUT_OF_SCOPE_RESPONSE: &str = "\
I'm here to help you learn programming!

I can help you with:
- Understanding what the problem is asking
- Thinking about how to solve it step-by-step
- Fixing errors in your code
- Explaining programming concepts in simple terms

I can't help with:
- Questions not about programming
- Giving you the complete answer (that would prevent you from learning!)

What would you like help with in your coding problem?";

/// Fallback reply when the provider fails after retries.
pub const LLM_FAILURE_RESPONSE: &str = "I'm having trouble processing your request right now. \
Please try rephrasing your question or try again in a moment.";

/// Behavioral context attached to a chat request.
#[derive(Debug, Clone, Copy, Default)]
pub struct BehavioralContext {
    pub cognitive_state: Option<CognitiveState>,
    pub iteration_state: Option<IterationState>,
    pub provenance_state: Option<ProvenanceState>,
}

/// Build the Socratic `(system, user)` prompt pair.
pub fn build_socratic_prompt(
    user_query: &str,
    problem_description: &str,
    current_code: Option<&str>,
    behavior: &BehavioralContext,
) -> (String, String) {
    let behavioral_context = summarize_behavior(behavior);
    let code_context = current_code.map(code_block).unwrap_or_default();

    let mut system = format!(
        "You are a friendly programming tutor helping absolute beginners learn to code.

YOUR APPROACH:
- Guide students with simple questions and hints
- Use everyday language - avoid technical jargon
- Break down problems into tiny, manageable steps
- Encourage and reassure - beginners need confidence
- NEVER give complete solutions - help them discover it
- Focus on understanding WHY, not just HOW
- When code is provided, refer to it specifically to help debug or explain

REMEMBER: Your student is a complete NOVICE who might not know:
- What variables, loops, or functions are yet
- How to read error messages
- Basic programming concepts
- Where to even start

Problem: {problem_description}

{code_context}
Student's context: {behavioral_context}

Be patient, kind, and break everything down into baby steps."
    );

    if let Some(adjustment) = state_adjustment(behavior) {
        system.push_str(adjustment);
    }

    (system, user_query.to_string())
}

/// One-line behavioral summary. Uneventful states (NORMAL iteration,
/// INCREMENTAL_EDIT provenance) are omitted to keep tokens down.
fn summarize_behavior(behavior: &BehavioralContext) -> String {
    let mut parts = Vec::new();

    if let Some(cognitive) = behavior.cognitive_state {
        parts.push(format!("Cognitive: {}", cognitive.label()));
    }
    if let Some(iteration) = behavior.iteration_state {
        if iteration != IterationState::Normal {
            parts.push(format!("Iteration: {}", iteration.label()));
        }
    }
    if let Some(provenance) = behavior.provenance_state {
        if provenance != ProvenanceState::IncrementalEdit {
            parts.push(format!("Code Pattern: {}", provenance.label()));
        }
    }

    if parts.is_empty() {
        "Normal engagement".to_string()
    } else {
        parts.join(", ")
    }
}

/// Format the learner's code, truncated to keep the token count manageable.
fn code_block(code: &str) -> String {
    let snippet = match code.char_indices().nth(MAX_CODE_CONTEXT_CHARS) {
        Some((idx, _)) => format!("{}\n... (code truncated)", &code[..idx]),
        None => code.to_string(),
    };
    format!("Student's current code:\n```python\n{snippet}\n```\n")
}

/// Single state-specific tail clause, selected by priority:
/// integrity concerns first, then guessing, then the cognitive state.
fn state_adjustment(behavior: &BehavioralContext) -> Option<&'static str> {
    match behavior.provenance_state {
        Some(ProvenanceState::SuspectedPaste) => {
            return Some(
                "\nNOTE: Ask the student to explain what this code does in their own words. \
                 Focus on understanding, not memorizing.",
            );
        }
        Some(ProvenanceState::Spamming) => {
            return Some(
                "\nNOTE: Encourage thoughtful edits over random changes. Help the student \
                 slow down and make one deliberate change at a time.",
            );
        }
        _ => {}
    }

    if behavior.iteration_state == Some(IterationState::RapidGuessing) {
        return Some(
            "\nNOTE: The student is trying things randomly. Help them slow down and think \
             about what the problem is asking for in simple terms.",
        );
    }

    match behavior.cognitive_state {
        Some(CognitiveState::Disengagement) => Some(
            "\nNOTE: The student seems stuck or discouraged. Be extra encouraging and give \
             them a small, concrete step to try right now.",
        ),
        Some(CognitiveState::Active) => Some(
            "\nNOTE: The student is engaged and learning. Give subtle hints that help them \
             discover the answer themselves.",
        ),
        _ => None,
    }
}
