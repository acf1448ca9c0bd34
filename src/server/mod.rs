//! Axum HTTP surface for the backend.
//!
//! Handlers hold explicit dependency handles through [`AppState`]; a handle
//! that failed to initialize at startup (no Docker, no API key) degrades the
//! matching endpoints to 503 instead of failing the whole process.

pub mod chat;
pub mod execution;
pub mod generate;
pub mod telemetry;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{Method, header},
    routing::{get, post},
};
use tower_http::cors::{AllowHeaders, CorsLayer};

use crate::behavior::{CesCalculator, DataFusionEngine};
use crate::sandbox::SandboxExecutor;
use crate::session::SessionCodeStore;
use crate::tutor::{LlmClient, PedagogicalFirewall};

/// Shared state for all handlers.
pub struct AppState {
    /// Sandbox executor; `None` when the container runtime was unavailable
    /// at startup.
    pub executor: Option<Arc<SandboxExecutor>>,
    /// Chat firewall; `None` when no LLM API key is configured.
    pub firewall: Option<PedagogicalFirewall>,
    /// Raw LLM client for the activity-generation flow.
    pub llm: Option<Arc<LlmClient>>,
    pub code_store: Arc<SessionCodeStore>,
    pub fusion: DataFusionEngine,
    pub ces: CesCalculator,
}

/// Build the API router with CORS restricted to the learning frontend.
pub fn router(state: Arc<AppState>, cors_origin: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(
            cors_origin
                .parse::<header::HeaderValue>()
                .unwrap_or_else(|_| header::HeaderValue::from_static("http://localhost:5173")),
        )
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::list([header::CONTENT_TYPE]))
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/execution/run", post(execution::run_handler))
        .route("/api/execution/health", get(execution::health_handler))
        .route("/api/telemetry/analyze", post(telemetry::analyze_handler))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/chat/stream", post(chat::stream_handler))
        .route("/api/chat/ask", post(chat::ask_handler))
        .route("/api/chat/hint", post(chat::hint_handler))
        .route("/api/chat/health", get(chat::health_handler))
        .route("/api/ai/generate-activity", post(generate::activity_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .layer(cors)
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "mentord" }))
}
