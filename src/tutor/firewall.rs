//! Pedagogical firewall: the gating pipeline in front of the LLM.
//!
//! Every chat flow passes the same stages: pattern-based scope filter,
//! model-based scope validation for ambiguous queries (fail open),
//! behavioral intervention decision, Socratic prompt assembly, completion.
//! An allowed reply is always produced by the model under the Socratic
//! prompt; rejected queries get one canned message and no model call.
//!
//! Stateless across requests: each interaction is independent.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::behavior::CognitiveState;
use crate::session::SessionCodeStore;
use crate::tutor::llm::{ChatMessage, LlmClient};
use crate::tutor::policy::{InterventionPolicy, ScopePolicy, ScopeReason};
use crate::tutor::prompts::{
    BehavioralContext, LLM_FAILURE_RESPONSE, OUT_OF_SCOPE_RESPONSE, build_socratic_prompt,
};

/// Sampling temperature for Socratic replies: balanced creativity.
const SOCRATIC_TEMPERATURE: f32 = 0.7;

/// Max characters of learner code embedded in a synthetic hint query.
const HINT_CODE_EXCERPT_CHARS: usize = 200;

/// Context bundle for a single chat interaction.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    pub user_query: String,
    pub problem_description: String,
    /// Prior turns, forwarded to the provider, never concatenated into the prompt.
    pub chat_history: Vec<ChatMessage>,
    /// Learner code supplied with the request. When absent and a session is
    /// known, the latest snapshot from the session code store is used.
    pub current_code: Option<String>,
    pub behavior: BehavioralContext,
    pub session_id: Option<String>,
    pub problem_id: Option<String>,
}

/// Structured reply from the firewall.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: String,
    pub is_allowed: bool,
    pub reasoning: Option<String>,
    pub intervention_triggered: bool,
}

impl ChatReply {
    fn rejected(reason: &str) -> Self {
        Self {
            message: OUT_OF_SCOPE_RESPONSE.to_string(),
            is_allowed: false,
            reasoning: Some(reason.to_string()),
            intervention_triggered: false,
        }
    }
}

/// Orchestrates scope gating, behavioral adaptation, and Socratic tutoring.
#[derive(Clone)]
pub struct PedagogicalFirewall {
    llm: Arc<LlmClient>,
    code_store: Arc<SessionCodeStore>,
}

impl PedagogicalFirewall {
    pub fn new(llm: Arc<LlmClient>, code_store: Arc<SessionCodeStore>) -> Self {
        Self { llm, code_store }
    }

    /// Model identifier behind the firewall (for health reporting).
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// Full request pipeline for a non-streaming chat.
    pub async fn process_request(&self, context: &ChatContext) -> ChatReply {
        tracing::info!(problem_id = ?context.problem_id, "processing chat request");

        // Stage 1: pattern-based fast path. Rejections never reach the model.
        let decision = ScopePolicy::quick_filter(&context.user_query);
        if !decision.allowed {
            tracing::warn!(reason = decision.reason.as_str(), "request blocked by policy");
            return ChatReply::rejected(decision.reason.as_str());
        }

        // Stage 2: model-based validation for queries the patterns could not
        // place. A validator failure allows the request through.
        if decision.reason == ScopeReason::NeedsLlmValidation
            && !self.llm.validate_scope(&context.user_query).await
        {
            tracing::info!("request rejected by scope validator");
            return ChatReply::rejected("LLM_VALIDATION_FAILED");
        }

        // Stage 3: does the behavioral state warrant proactive help?
        let intervention_triggered = intervention_mode(&context.behavior);
        if intervention_triggered {
            tracing::info!(
                cognitive = ?context.behavior.cognitive_state,
                iteration = ?context.behavior.iteration_state,
                "intervention triggered"
            );
        }

        // Stage 4: Socratic completion with behavioral context and history.
        let current_code = self.resolve_code(context).await;
        let (system_prompt, user_prompt) = build_socratic_prompt(
            &context.user_query,
            &context.problem_description,
            current_code.as_deref(),
            &context.behavior,
        );

        match self
            .llm
            .complete(
                &system_prompt,
                &user_prompt,
                &context.chat_history,
                SOCRATIC_TEMPERATURE,
            )
            .await
        {
            Ok(message) => ChatReply {
                message,
                is_allowed: true,
                reasoning: Some(decision.reason.as_str().to_string()),
                intervention_triggered,
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to generate Socratic response");
                // The fallback reply carries no behavioral adaptation, so it
                // does not claim an intervention either.
                ChatReply {
                    message: LLM_FAILURE_RESPONSE.to_string(),
                    is_allowed: true,
                    reasoning: Some("LLM_ERROR".to_string()),
                    intervention_triggered: false,
                }
            }
        }
    }

    /// Streaming variant: identical gating, chunks delivered as they arrive.
    ///
    /// A rejected query yields the canned message once; a mid-stream failure
    /// appends a brief apology and ends the stream.
    pub fn stream_response(&self, context: ChatContext) -> ReceiverStream<String> {
        let (tx, rx) = mpsc::channel(64);
        let firewall = self.clone();
        tokio::spawn(async move {
            firewall.stream_pipeline(context, tx).await;
        });
        ReceiverStream::new(rx)
    }

    async fn stream_pipeline(&self, context: ChatContext, tx: mpsc::Sender<String>) {
        tracing::info!(problem_id = ?context.problem_id, "processing streaming request");

        let decision = ScopePolicy::quick_filter(&context.user_query);
        if !decision.allowed {
            tracing::warn!(reason = decision.reason.as_str(), "request blocked by policy");
            let _ = tx.send(OUT_OF_SCOPE_RESPONSE.to_string()).await;
            return;
        }

        if decision.reason == ScopeReason::NeedsLlmValidation
            && !self.llm.validate_scope(&context.user_query).await
        {
            tracing::info!("request rejected by scope validator");
            let _ = tx.send(OUT_OF_SCOPE_RESPONSE.to_string()).await;
            return;
        }

        let current_code = self.resolve_code(&context).await;
        let (system_prompt, user_prompt) = build_socratic_prompt(
            &context.user_query,
            &context.problem_description,
            current_code.as_deref(),
            &context.behavior,
        );

        let mut stream = match self
            .llm
            .stream_complete(
                &system_prompt,
                &user_prompt,
                &context.chat_history,
                SOCRATIC_TEMPERATURE,
            )
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to open completion stream");
                let _ = tx.send(format!("\n\n{LLM_FAILURE_RESPONSE}")).await;
                return;
            }
        };

        use futures::StreamExt;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(content) => {
                    // A closed receiver means the client disconnected; stop
                    // polling the provider.
                    if tx.send(content).await.is_err() {
                        tracing::debug!("stream client disconnected");
                        return;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "stream failed mid-response");
                    let _ = tx.send(format!("\n\n{LLM_FAILURE_RESPONSE}")).await;
                    return;
                }
            }
        }

        tracing::info!("streaming response completed");
    }

    /// Proactive hint for a struggling learner.
    ///
    /// Builds a synthetic "I'm stuck" query (with a short code excerpt when
    /// available), defaults the cognitive state to disengagement, and runs
    /// the standard pipeline.
    pub async fn generate_hint(
        &self,
        problem_description: &str,
        current_code: Option<&str>,
        cognitive_state: Option<CognitiveState>,
    ) -> String {
        let user_query = match current_code {
            Some(code) => {
                let excerpt: String = code.chars().take(HINT_CODE_EXCERPT_CHARS).collect();
                format!(
                    "I'm stuck. Here's my current code:\n```\n{excerpt}...\n```\nWhat should I focus on?"
                )
            }
            None => "I'm stuck and need a hint to get started.".to_string(),
        };

        let context = ChatContext {
            user_query,
            problem_description: problem_description.to_string(),
            behavior: BehavioralContext {
                cognitive_state: Some(cognitive_state.unwrap_or(CognitiveState::Disengagement)),
                ..Default::default()
            },
            ..Default::default()
        };

        self.process_request(&context).await.message
    }

    async fn resolve_code(&self, context: &ChatContext) -> Option<String> {
        if context.current_code.is_some() {
            return context.current_code.clone();
        }
        match (&context.session_id, &context.problem_id) {
            (Some(session_id), Some(problem_id)) => {
                self.code_store.get(session_id, problem_id).await
            }
            _ => None,
        }
    }
}

/// Intervention requires both behavioral axes to be known.
fn intervention_mode(behavior: &BehavioralContext) -> bool {
    match (behavior.cognitive_state, behavior.iteration_state) {
        (Some(cognitive), Some(iteration)) => {
            InterventionPolicy::should_intervene(cognitive, iteration)
        }
        _ => false,
    }
}
