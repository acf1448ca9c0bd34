//! AI activity generation endpoint (forced tool calling).

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;

use crate::server::AppState;
use crate::tutor::activity::{
    ACTIVITY_GENERATION_SYSTEM, GeneratedActivity, activity_generation_tool,
};

#[derive(Debug, Deserialize)]
pub struct GenerateActivityRequest {
    pub prompt: String,
}

/// Generate a structured coding activity from a natural-language prompt.
pub async fn activity_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GenerateActivityRequest>,
) -> Result<Json<GeneratedActivity>, (StatusCode, String)> {
    let llm = state.llm.as_ref().ok_or((
        StatusCode::SERVICE_UNAVAILABLE,
        "AI generation service is unavailable. Check the LLM API configuration.".to_string(),
    ))?;

    let tool = activity_generation_tool();
    let invocation = llm
        .complete_with_tools(ACTIVITY_GENERATION_SYSTEM, &request.prompt, &[tool], 0.7)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "activity generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Activity generation failed: {e}"),
            )
        })?;

    let activity = GeneratedActivity::from_tool_arguments(&invocation.arguments).map_err(|e| {
        tracing::error!(error = %e, "generated activity rejected");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to parse generated activity: {e}"),
        )
    })?;

    tracing::info!(title = %activity.title, "activity generated");
    Ok(Json(activity))
}
