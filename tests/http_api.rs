//! Router-level tests: telemetry analysis end to end, degraded 503
//! behavior, and the SSE chat framing.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use mentord::behavior::{CesCalculator, DataFusionEngine};
use mentord::server::{AppState, router};
use mentord::session::SessionCodeStore;

/// State with no sandbox and no LLM: the degraded configuration.
fn degraded_state() -> Arc<AppState> {
    Arc::new(AppState {
        executor: None,
        firewall: None,
        llm: None,
        code_store: Arc::new(SessionCodeStore::new()),
        fusion: DataFusionEngine::new(),
        ces: CesCalculator::new(),
    })
}

fn app(state: Arc<AppState>) -> Router {
    router(state, "http://localhost:5173")
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, value)
}

fn telemetry_body() -> Value {
    json!({
        "session_id": "s1",
        "problem_id": "p1",
        "session_duration_minutes": 10.0,
        "total_keystrokes": 150,
        "total_run_attempts": 3,
        "total_idle_minutes": 1.0,
        "focus_violation_count": 0,
        "net_code_change": 120,
        "last_edit_size_chars": 10,
        "last_run_interval_seconds": 25.0,
        "is_semantic_change": true,
        "current_idle_duration": 5.0,
        "is_window_focused": true,
        "last_run_was_error": false,
        "recent_burst_size_chars": 0
    })
}

#[tokio::test]
async fn root_health_is_always_up() {
    let response = app(degraded_state())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn telemetry_analysis_returns_ces_and_states() {
    let (status, body) =
        post_json(app(degraded_state()), "/api/telemetry/analyze", telemetry_body()).await;

    assert_eq!(status, StatusCode::OK);

    // Raw rates.
    assert_eq!(body["kpm"], 15.0);
    assert_eq!(body["ad"], 0.3);
    assert_eq!(body["fvc"], 0);

    // Fused states as human-readable labels.
    assert_eq!(body["provenance_state"], "Incremental Edit");
    assert_eq!(body["iteration_state"], "Deliberate Debugging");
    assert_eq!(body["cognitive_state"], "Active");

    // Effective metrics and the bounded score.
    assert_eq!(body["effective_kpm"], 15.0);
    assert_eq!(body["effective_ad"], 0.3);
    assert_eq!(body["integrity_penalty"], 0.0);
    let ces = body["ces"].as_f64().unwrap();
    assert!((ces - 0.3439).abs() < 0.001, "got {ces}");
    assert_eq!(body["ces_classification"], "Moderate Engagement");
}

#[tokio::test]
async fn paste_telemetry_is_classified_suspicious() {
    let mut body = telemetry_body();
    body["session_duration_minutes"] = json!(5.0);
    body["total_keystrokes"] = json!(20);
    body["total_run_attempts"] = json!(1);
    body["focus_violation_count"] = json!(2);
    body["net_code_change"] = json!(400);
    body["last_edit_size_chars"] = json!(300);
    body["last_run_interval_seconds"] = json!(60.0);
    body["recent_burst_size_chars"] = json!(15);

    let (status, body) = post_json(app(degraded_state()), "/api/telemetry/analyze", body).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["provenance_state"], "Suspected External Paste");
    assert_eq!(body["integrity_penalty"], 0.5);
    assert!(body["ces"].as_f64().unwrap() <= -0.1);
    assert_eq!(body["ces_classification"], "Disengaged/Suspicious");
}

#[tokio::test]
async fn execution_endpoints_degrade_to_503_without_docker() {
    let (status, _) = post_json(
        app(degraded_state()),
        "/api/execution/run",
        json!({ "session_id": "s", "problem_id": "p", "code": "print(1)" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let response = app(degraded_state())
        .oneshot(
            Request::builder()
                .uri("/api/execution/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn chat_endpoints_degrade_to_503_without_an_api_key() {
    let (status, _) = post_json(
        app(degraded_state()),
        "/api/chat",
        json!({ "message": "why is my loop broken?" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = post_json(
        app(degraded_state()),
        "/api/ai/generate-activity",
        json!({ "prompt": "make an exercise" }),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn chat_health_reports_unavailable_without_a_key() {
    let response = app(degraded_state())
        .oneshot(
            Request::builder()
                .uri("/api/chat/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "unavailable");
}

mod with_mock_llm {
    use super::*;

    use axum::extract::State;
    use axum::response::IntoResponse;
    use secrecy::SecretString;

    use mentord::config::LlmConfig;
    use mentord::tutor::{LlmClient, PedagogicalFirewall};

    /// Provider stub answering a fixed completion, as SSE when streaming is
    /// requested.
    async fn completion_handler(
        State(reply): State<&'static str>,
        axum::Json(body): axum::Json<Value>,
    ) -> axum::response::Response {
        if body["stream"] == json!(true) {
            let delta = json!({ "choices": [{ "delta": { "content": reply } }] });
            let sse_body = format!("data: {delta}\n\ndata: [DONE]\n\n");
            return ([(header::CONTENT_TYPE, "text/event-stream")], sse_body).into_response();
        }
        axum::Json(json!({
            "id": "chatcmpl-test",
            "choices": [{
                "message": { "role": "assistant", "content": reply },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
        }))
        .into_response()
    }

    async fn state_with_llm(reply: &'static str) -> Arc<AppState> {
        let provider = Router::new()
            .route("/v1/chat/completions", axum::routing::post(completion_handler))
            .with_state(reply);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, provider).await.unwrap();
        });

        let llm = Arc::new(
            LlmClient::new(LlmConfig {
                api_key: Some(SecretString::from("test-key")),
                base_url: format!("http://127.0.0.1:{port}"),
                model: "test-model".to_string(),
                max_retries: 0,
                retry_initial_delay_ms: 1,
            })
            .unwrap(),
        );
        let code_store = Arc::new(SessionCodeStore::new());

        Arc::new(AppState {
            executor: None,
            firewall: Some(PedagogicalFirewall::new(
                Arc::clone(&llm),
                Arc::clone(&code_store),
            )),
            llm: Some(llm),
            code_store,
            fusion: DataFusionEngine::new(),
            ces: CesCalculator::new(),
        })
    }

    #[tokio::test]
    async fn ask_reports_intervention_for_disengaged_learners() {
        let state = state_with_llm("Try one tiny step.").await;
        let (status, body) = post_json(
            app(state),
            "/api/chat/ask",
            json!({
                "problem_id": "p1",
                "problem_description": "Sum a list",
                "user_query": "why does my loop print nothing?",
                "behavioral_context": {
                    "cognitive_state": "DISENGAGEMENT",
                    "iteration_state": "NORMAL"
                }
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Try one tiny step.");
        assert_eq!(body["is_allowed"], true);
        assert_eq!(body["intervention_triggered"], true);
    }

    #[tokio::test]
    async fn out_of_scope_chat_gets_the_canned_reply() {
        let state = state_with_llm("should never be seen").await;
        let (status, body) = post_json(
            app(state),
            "/api/chat",
            json!({ "message": "what's the weather today?" }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let response = body["response"].as_str().unwrap();
        assert!(response.contains("I can't help with"));
        assert!(!response.contains("should never be seen"));
    }

    #[tokio::test]
    async fn hint_always_flags_intervention() {
        let state = state_with_llm("Start with the first element.").await;
        let (status, body) = post_json(
            app(state),
            "/api/chat/hint",
            json!({
                "problem_id": "p1",
                "problem_description": "Sum a list",
                "current_code": "def total(xs):\n    pass"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Start with the first element.");
        assert_eq!(body["intervention_triggered"], true);
    }

    #[tokio::test]
    async fn stream_frames_content_and_terminates_with_done() {
        let state = state_with_llm("chunked reply").await;
        let response = app(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat/stream")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(
                        json!({ "message": "how do I debug this error?" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
        assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.contains(r#"data: {"content":"chunked reply"}"#));
        assert!(text.trim_end().ends_with("data: [DONE]"));
    }
}
