//! Async client for an OpenAI-compatible chat-completions provider.
//!
//! One provider, three request modes: plain completion, streaming deltas,
//! and forced tool calling. Rate limits and timeouts are retried with
//! jittered exponential backoff; every other provider failure is terminal
//! for the request. Scope validation fails open: the Socratic system prompt
//! is the second gate and is never bypassed.

use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use futures::stream::BoxStream;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{ConfigError, LlmError};
use crate::tutor::prompts::SCOPE_VALIDATOR_SYSTEM;

/// Soft input budget; larger prompts warn but are still sent.
const MAX_INPUT_TOKENS: usize = 1000;
/// Output cap for tutoring replies.
const MAX_OUTPUT_TOKENS: u32 = 500;
/// Output cap for structured tool-call generation.
const TOOL_MAX_OUTPUT_TOKENS: u32 = 4000;

const COMPLETE_TIMEOUT: Duration = Duration::from_secs(10);
const TOOL_TIMEOUT: Duration = Duration::from_secs(15);
const STREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Definition of a tool offered to the model.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool call returned by the model: name plus raw JSON arguments.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: String,
}

/// Client for one OpenAI-compatible chat-completions endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_retries: u32,
    retry_initial_delay_ms: u64,
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl LlmClient {
    /// Create a client from configuration. Requires an API key.
    pub fn new(config: LlmConfig) -> Result<Self, ConfigError> {
        let api_key = config.api_key.ok_or_else(|| ConfigError::MissingRequired {
            key: "llm.api_key".to_string(),
            hint: "Set the LLM_API_KEY environment variable".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::ParseError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url,
            model: config.model,
            max_retries: config.max_retries,
            retry_initial_delay_ms: config.retry_initial_delay_ms,
        })
    }

    /// The model identifier sent with every request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Generate a completion with history and retry handling.
    pub async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        chat_history: &[ChatMessage],
        temperature: f32,
    ) -> Result<String, LlmError> {
        warn_if_over_budget(system_prompt, user_prompt);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(system_prompt, chat_history, user_prompt),
            temperature,
            max_tokens: MAX_OUTPUT_TOKENS,
            stream: None,
            tools: None,
            tool_choice: None,
        };

        let response = self.send_with_retry(&request, COMPLETE_TIMEOUT).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "no choices in response".to_string(),
            })?;

        if let Some(usage) = response.usage {
            tracing::info!(
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "completion succeeded"
            );
        }

        choice
            .message
            .content
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "empty completion content".to_string(),
            })
    }

    /// Model-based scope validation. Fails open: any failure allows the
    /// query through, since the Socratic prompt still constrains output.
    pub async fn validate_scope(&self, user_query: &str) -> bool {
        match self
            .complete(SCOPE_VALIDATOR_SYSTEM, user_query, &[], 0.0)
            .await
        {
            Ok(text) => is_in_scope_verdict(&text),
            Err(e) => {
                tracing::error!(error = %e, "scope validation failed, allowing request");
                true
            }
        }
    }

    /// Generate a streaming completion.
    ///
    /// Yields each non-empty content delta exactly once, in arrival order.
    /// The `[DONE]` sentinel terminates the stream.
    pub async fn stream_complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        chat_history: &[ChatMessage],
        temperature: f32,
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        warn_if_over_budget(system_prompt, user_prompt);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(system_prompt, chat_history, user_prompt),
            temperature,
            max_tokens: MAX_OUTPUT_TOKENS,
            stream: Some(true),
            tools: None,
            tool_choice: None,
        };

        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .timeout(STREAM_TIMEOUT)
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let response = check_status(response).await?;

        let stream = response
            .bytes_stream()
            .eventsource()
            .take_while(|event| {
                let done = matches!(event, Ok(ev) if ev.data == "[DONE]");
                futures::future::ready(!done)
            })
            .filter_map(|event| {
                let item = match event {
                    Ok(ev) => parse_stream_delta(&ev.data).transpose(),
                    Err(e) => Some(Err(LlmError::Provider {
                        reason: format!("stream decode error: {e}"),
                    })),
                };
                futures::future::ready(item)
            });

        Ok(stream.boxed())
    }

    /// Generate a completion that must resolve to a tool call.
    pub async fn complete_with_tools(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        tools: &[ToolDefinition],
        temperature: f32,
    ) -> Result<ToolInvocation, LlmError> {
        warn_if_over_budget(system_prompt, user_prompt);

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(system_prompt, &[], user_prompt),
            temperature,
            max_tokens: TOOL_MAX_OUTPUT_TOKENS,
            stream: None,
            tools: Some(tools.iter().map(ApiTool::from).collect()),
            tool_choice: Some("required".to_string()),
        };

        let response = self.send_with_retry(&request, TOOL_TIMEOUT).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse {
                reason: "no choices in response".to_string(),
            })?;

        if let Some(usage) = response.usage {
            tracing::info!(
                input_tokens = usage.prompt_tokens,
                output_tokens = usage.completion_tokens,
                "tool completion succeeded"
            );
        }

        let call = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .next()
            .ok_or(LlmError::MissingToolCall)?;

        Ok(ToolInvocation {
            name: call.function.name,
            arguments: call.function.arguments,
        })
    }

    /// Send a chat-completions request, retrying transient failures.
    async fn send_with_retry(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let mut delay_ms = self.retry_initial_delay_ms;

        for attempt in 0..=self.max_retries {
            match self.send_once(request, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    if let LlmError::RateLimited {
                        retry_after: Some(after),
                    } = &e
                    {
                        delay_ms = after.as_millis() as u64;
                    }
                    tracing::warn!(
                        attempt = attempt + 1,
                        max = self.max_retries + 1,
                        delay_ms,
                        error = %e,
                        "transient LLM failure, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                    // Exponential backoff with ±25% jitter.
                    let jitter = (delay_ms as f64 * 0.25) as i64;
                    let signed = if rand::random::<bool>() { jitter } else { -jitter };
                    delay_ms = ((delay_ms as i64 * 2).saturating_add(signed)).max(1) as u64;
                }
                Err(e) => return Err(e),
            }
        }

        Err(LlmError::Unexpected {
            reason: "retry loop exhausted without a terminal result".to_string(),
        })
    }

    async fn send_once(
        &self,
        request: &ChatCompletionRequest,
        timeout: Duration,
    ) -> Result<ChatCompletionResponse, LlmError> {
        let response = self
            .client
            .post(self.api_url("chat/completions"))
            .timeout(timeout)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let response = check_status(response).await?;

        response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse {
                reason: format!("JSON parse error: {e}"),
            })
    }

    /// Join the base URL with a `v1/` API path, tolerating bases that
    /// already end in `/v1`.
    fn api_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/v1/{}", base, path.trim_start_matches('/'))
    }
}

/// `[system, ...history, user]`, the only message order the tutor uses.
fn build_messages(
    system_prompt: &str,
    chat_history: &[ChatMessage],
    user_prompt: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(chat_history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(chat_history);
    messages.push(ChatMessage::user(user_prompt));
    messages
}

/// Rough token estimate (~4 chars per token) against the soft input budget.
fn warn_if_over_budget(system_prompt: &str, user_prompt: &str) {
    let estimated = (system_prompt.len() + user_prompt.len()) / 4;
    if estimated > MAX_INPUT_TOKENS {
        tracing::warn!(
            estimated_tokens = estimated,
            limit = MAX_INPUT_TOKENS,
            "input may exceed token budget"
        );
    }
}

fn is_in_scope_verdict(response: &str) -> bool {
    response.trim().to_uppercase().contains("IN_SCOPE")
}

fn classify_transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            elapsed: Duration::from_secs(0),
        }
    } else {
        LlmError::Provider {
            reason: e.to_string(),
        }
    }
}

/// Map HTTP status codes onto the error taxonomy, preserving Retry-After.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 401 {
        return Err(LlmError::AuthFailed);
    }
    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(LlmError::RateLimited { retry_after });
    }

    let body = response.text().await.unwrap_or_default();
    Err(LlmError::Provider {
        reason: format!("HTTP {}: {}", status, truncate_chars(&body, 200)),
    })
}

/// Parse one SSE data payload into its content delta, if any.
fn parse_stream_delta(data: &str) -> Result<Option<String>, LlmError> {
    let chunk: ChatCompletionChunk =
        serde_json::from_str(data).map_err(|e| LlmError::InvalidResponse {
            reason: format!("stream chunk parse error: {e}"),
        })?;

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty());

    Ok(content)
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// OpenAI-compatible Chat Completions API types

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ApiTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for ApiTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: ApiToolFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatCompletionChoice>,
    usage: Option<ChatCompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChoice {
    message: ChatCompletionMessage,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    function: ApiToolCallFunction,
}

#[derive(Debug, Deserialize)]
struct ApiToolCallFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChatCompletionChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunkChoice {
    delta: ChatCompletionDelta,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_client(base_url: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_key: Some(SecretString::from("test-key")),
            base_url: base_url.to_string(),
            model: "test-model".to_string(),
            max_retries: 2,
            retry_initial_delay_ms: 10,
        })
        .unwrap()
    }

    #[test]
    fn client_requires_an_api_key() {
        let err = LlmClient::new(LlmConfig {
            api_key: None,
            base_url: "https://api.example.com".to_string(),
            model: "m".to_string(),
            max_retries: 2,
            retry_initial_delay_ms: 10,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingRequired { .. }));
    }

    #[test]
    fn api_url_joining() {
        let client = test_client("https://api.example.com");
        assert_eq!(
            client.api_url("chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );

        let client = test_client("https://api.groq.com/openai/v1");
        assert_eq!(
            client.api_url("chat/completions"),
            "https://api.groq.com/openai/v1/chat/completions"
        );

        let client = test_client("https://api.example.com/");
        assert_eq!(
            client.api_url("/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn messages_are_system_history_user() {
        let history = vec![
            ChatMessage::user("earlier question"),
            ChatMessage::assistant("earlier answer"),
        ];
        let messages = build_messages("sys", &history, "now");

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "earlier question");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3].role, Role::User);
        assert_eq!(messages[3].content, "now");
    }

    #[test]
    fn roles_serialize_lowercase() {
        let json = serde_json::to_string(&ChatMessage::system("x")).unwrap();
        assert!(json.contains(r#""role":"system""#));
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert!(json.contains(r#""role":"assistant""#));
    }

    #[test]
    fn scope_verdict_is_case_and_whitespace_tolerant() {
        assert!(is_in_scope_verdict("IN_SCOPE"));
        assert!(is_in_scope_verdict("  in_scope\n"));
        assert!(is_in_scope_verdict("The verdict is IN_SCOPE."));
        assert!(!is_in_scope_verdict("OUT_OF_SCOPE"));
        // Note: OUT_OF_SCOPE does not contain IN_SCOPE as a substring
        // because of the underscore boundary.
        assert!(!is_in_scope_verdict(""));
    }

    #[test]
    fn stream_delta_parsing() {
        let data = r#"{"choices":[{"delta":{"content":"Hel"}}]}"#;
        assert_eq!(parse_stream_delta(data).unwrap(), Some("Hel".to_string()));

        // Role-only chunk carries no content.
        let data = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_stream_delta(data).unwrap(), None);

        // Empty content is filtered out.
        let data = r#"{"choices":[{"delta":{"content":""}}]}"#;
        assert_eq!(parse_stream_delta(data).unwrap(), None);

        assert!(parse_stream_delta("not json").is_err());
    }

    #[test]
    fn tool_serialization_shape() {
        let tool = ToolDefinition {
            name: "generate".to_string(),
            description: "makes things".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        };
        let json = serde_json::to_value(ApiTool::from(&tool)).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "generate");
        assert_eq!(json["function"]["parameters"]["type"], "object");
    }

    #[test]
    fn tool_choice_serialized_only_when_present() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![],
            temperature: 0.7,
            max_tokens: 500,
            stream: None,
            tools: None,
            tool_choice: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("tool_choice"));
        assert!(!json.contains("stream"));

        let request = ChatCompletionRequest {
            tool_choice: Some("required".to_string()),
            stream: Some(true),
            ..request
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""tool_choice":"required""#));
        assert!(json.contains(r#""stream":true"#));
    }

    #[test]
    fn truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("こんにちは", 2), "こん");
    }
}
