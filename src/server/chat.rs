//! Chat endpoints: one-shot, streaming (SSE), full Socratic ask, and
//! proactive hints. All flows go through the pedagogical firewall.

use std::convert::Infallible;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::behavior::CognitiveState;
use crate::server::AppState;
use crate::tutor::{BehavioralContext, ChatContext, ChatMessage, PedagogicalFirewall};

/// Fallback problem statement when a chat request carries none.
const GENERIC_PROBLEM: &str = "a short programming exercise";

/// Behavioral telemetry attached to an ask request.
#[derive(Debug, Default, Deserialize)]
pub struct BehavioralContextDto {
    pub cognitive_state: Option<String>,
    pub iteration_state: Option<String>,
    pub provenance_state: Option<String>,
}

impl BehavioralContextDto {
    /// Parse the frontend's state tags, dropping (and logging) unknown ones.
    fn into_context(self) -> BehavioralContext {
        BehavioralContext {
            cognitive_state: parse_state(self.cognitive_state.as_deref()),
            iteration_state: parse_state(self.iteration_state.as_deref()),
            provenance_state: parse_state(self.provenance_state.as_deref()),
        }
    }
}

fn parse_state<T: FromStr>(tag: Option<&str>) -> Option<T> {
    let tag = tag?;
    match T::from_str(tag) {
        Ok(state) => Some(state),
        Err(_) => {
            tracing::warn!(tag, "ignoring unknown behavioral state tag");
            None
        }
    }
}

/// Request for the one-shot and streaming chat endpoints.
#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub message: String,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub problem_id: Option<String>,
    #[serde(default)]
    pub problem_description: Option<String>,
}

impl ChatMessageRequest {
    fn into_chat_context(self) -> ChatContext {
        ChatContext {
            user_query: self.message,
            problem_description: self
                .problem_description
                .unwrap_or_else(|| GENERIC_PROBLEM.to_string()),
            chat_history: self.chat_history,
            current_code: None,
            behavior: BehavioralContext::default(),
            session_id: self.session_id,
            problem_id: self.problem_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatMessageResponse {
    pub response: String,
}

/// Request for the full Socratic ask endpoint.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub problem_id: String,
    pub problem_description: String,
    pub user_query: String,
    #[serde(default)]
    pub behavioral_context: Option<BehavioralContextDto>,
    #[serde(default)]
    pub current_code: Option<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// AI tutor response.
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub is_allowed: bool,
    pub intervention_triggered: bool,
    pub timestamp: DateTime<Utc>,
}

/// Request for a proactive hint.
#[derive(Debug, Deserialize)]
pub struct HintRequest {
    pub problem_id: String,
    pub problem_description: String,
    #[serde(default)]
    pub current_code: Option<String>,
    #[serde(default)]
    pub cognitive_state: Option<String>,
}

fn require_firewall(
    state: &AppState,
) -> Result<&PedagogicalFirewall, (StatusCode, String)> {
    state.firewall.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "AI tutoring service is unavailable. Check the LLM API configuration.".to_string(),
    ))
}

/// One-shot chat. Code context comes from the session store when the
/// request names a session and problem.
pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<Json<ChatMessageResponse>, (StatusCode, String)> {
    let firewall = require_firewall(&state)?;

    let reply = firewall.process_request(&request.into_chat_context()).await;
    Ok(Json(ChatMessageResponse {
        response: reply.message,
    }))
}

/// Streaming chat over SSE: one `{"content": …}` frame per chunk, blank-line
/// separated, terminated by a `[DONE]` sentinel.
pub async fn stream_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let firewall = require_firewall(&state)?;

    let chunks = firewall.stream_response(request.into_chat_context());

    let stream = chunks
        .map(|content| {
            let frame = serde_json::json!({ "content": content }).to_string();
            Event::default().data(frame)
        })
        .chain(futures::stream::once(futures::future::ready(
            Event::default().data("[DONE]"),
        )))
        .map(Ok::<_, Infallible>);

    Ok((
        [("Cache-Control", "no-cache"), ("X-Accel-Buffering", "no")],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    ))
}

/// Full Socratic tutoring with behavioral context.
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AskRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let firewall = require_firewall(&state)?;

    tracing::info!(
        problem_id = %request.problem_id,
        query_len = request.user_query.len(),
        "ask request"
    );

    let context = ChatContext {
        user_query: request.user_query,
        problem_description: request.problem_description,
        chat_history: request.chat_history,
        current_code: request.current_code,
        behavior: request
            .behavioral_context
            .unwrap_or_default()
            .into_context(),
        session_id: request.session_id,
        problem_id: Some(request.problem_id),
    };

    let reply = firewall.process_request(&context).await;
    Ok(Json(ChatResponse {
        message: reply.message,
        is_allowed: reply.is_allowed,
        intervention_triggered: reply.intervention_triggered,
        timestamp: Utc::now(),
    }))
}

/// Proactive hint when the learner is stuck. Intervention is always on.
pub async fn hint_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HintRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let firewall = require_firewall(&state)?;

    tracing::info!(problem_id = %request.problem_id, "hint request");

    let cognitive_state = parse_state::<CognitiveState>(request.cognitive_state.as_deref());
    let message = firewall
        .generate_hint(
            &request.problem_description,
            request.current_code.as_deref(),
            cognitive_state,
        )
        .await;

    Ok(Json(ChatResponse {
        message,
        is_allowed: true,
        intervention_triggered: true,
        timestamp: Utc::now(),
    }))
}

/// Tutoring service health: firewall presence and the active model.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    match &state.firewall {
        Some(firewall) => Json(serde_json::json!({
            "status": "operational",
            "model": firewall.model(),
        })),
        None => Json(serde_json::json!({
            "status": "unavailable",
            "reason": "LLM API key not configured",
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::{IterationState, ProvenanceState};

    #[test]
    fn behavioral_dto_parses_known_tags() {
        let dto = BehavioralContextDto {
            cognitive_state: Some("DISENGAGEMENT".to_string()),
            iteration_state: Some("RAPID_GUESSING".to_string()),
            provenance_state: Some("SUSPECTED_PASTE".to_string()),
        };
        let context = dto.into_context();
        assert_eq!(context.cognitive_state, Some(CognitiveState::Disengagement));
        assert_eq!(context.iteration_state, Some(IterationState::RapidGuessing));
        assert_eq!(
            context.provenance_state,
            Some(ProvenanceState::SuspectedPaste)
        );
    }

    #[test]
    fn behavioral_dto_drops_unknown_tags() {
        let dto = BehavioralContextDto {
            cognitive_state: Some("NOT_A_STATE".to_string()),
            iteration_state: None,
            provenance_state: Some("INCREMENTAL_EDIT".to_string()),
        };
        let context = dto.into_context();
        assert_eq!(context.cognitive_state, None);
        assert_eq!(
            context.provenance_state,
            Some(ProvenanceState::IncrementalEdit)
        );
    }

    #[test]
    fn chat_request_defaults_the_problem_description() {
        let request: ChatMessageRequest =
            serde_json::from_str(r#"{"message": "help me"}"#).unwrap();
        let context = request.into_chat_context();
        assert_eq!(context.problem_description, GENERIC_PROBLEM);
        assert!(context.chat_history.is_empty());
        assert!(context.session_id.is_none());
    }

    #[test]
    fn chat_request_accepts_history_and_session() {
        let request: ChatMessageRequest = serde_json::from_str(
            r#"{
                "message": "and now?",
                "chat_history": [
                    {"role": "user", "content": "first"},
                    {"role": "assistant", "content": "second"}
                ],
                "session_id": "s1",
                "problem_id": "p1"
            }"#,
        )
        .unwrap();
        let context = request.into_chat_context();
        assert_eq!(context.chat_history.len(), 2);
        assert_eq!(context.session_id.as_deref(), Some("s1"));
        assert_eq!(context.problem_id.as_deref(), Some("p1"));
    }
}
