//! OpenAI-compatible inference client.
//!
//! Provides typed request/response structures, the [`InferenceClient`] trait
//! used by every environment, an HTTP implementation ([`LlmClient`]) for
//! `/chat/completions` and `/completions`, and a deterministic
//! [`ScriptedClient`] for driving rollouts in tests.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

/// Prefix of in-band sentinel responses such as `[ERROR] max_tokens_reached`.
///
/// Sentinels are returned as ordinary response text so multi-turn loops can
/// stop cleanly instead of erroring out mid-rollout.
pub const ERROR_PREFIX: &str = "[ERROR]";

// ---------------------------------------------------------------------------
// Messages and sampling parameters
// ---------------------------------------------------------------------------

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
}

impl ChatMessage {
    /// Convenience constructor for a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Convenience constructor for a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Convenience constructor for an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Sampling parameters forwarded to the inference server.
///
/// Unset optional fields are omitted from request bodies so the server's own
/// defaults apply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingArgs {
    /// Number of completions to request per prompt.
    pub n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    /// Stop sequences that end generation.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Server-specific parameters passed through verbatim as `extra_body`.
    #[serde(rename = "extra_body", skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl Default for SamplingArgs {
    fn default() -> Self {
        Self {
            n: 1,
            temperature: None,
            max_tokens: None,
            top_p: None,
            frequency_penalty: None,
            presence_penalty: None,
            stop: Vec::new(),
            extra: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

fn n_is_zero(n: &u32) -> bool {
    *n == 0
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "n_is_zero")]
    pub n: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub stop: &'a [String],
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra_body: &'a Map<String, Value>,
}

impl<'a> ChatCompletionRequest<'a> {
    fn new(model: &'a str, messages: &'a [ChatMessage], sampling: &'a SamplingArgs) -> Self {
        Self {
            model,
            messages,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            n: sampling.n,
            stop: &sampling.stop,
            extra_body: &sampling.extra,
        }
    }
}

/// Request body for `POST /completions`.
#[derive(Debug, Serialize)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "n_is_zero")]
    pub n: u32,
    #[serde(skip_serializing_if = "<[String]>::is_empty")]
    pub stop: &'a [String],
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub extra_body: &'a Map<String, Value>,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, prompt: &'a str, sampling: &'a SamplingArgs) -> Self {
        Self {
            model,
            prompt,
            temperature: sampling.temperature,
            max_tokens: sampling.max_tokens,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            n: sampling.n,
            stop: &sampling.stop,
            extra_body: &sampling.extra,
        }
    }
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A single chat completion choice returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: usize,
    /// The generated message.
    pub message: ChatMessage,
    /// The reason generation stopped (e.g. `"stop"`, `"length"`).
    #[serde(default)]
    pub finish_reason: String,
}

/// Response body from `POST /chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Usage,
}

/// A single text completion choice returned by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    #[serde(default)]
    pub index: usize,
    /// The generated text.
    pub text: String,
    #[serde(default)]
    pub finish_reason: String,
}

/// Response body from `POST /completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    pub choices: Vec<CompletionChoice>,
    #[serde(default)]
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Client trait
// ---------------------------------------------------------------------------

/// Interface environments use to sample model responses.
///
/// Implementations return the text of the first choice. Recoverable server
/// conditions (context overflow, truncation) surface as in-band sentinels
/// prefixed with [`ERROR_PREFIX`] rather than as errors.
#[allow(async_fn_in_trait)]
pub trait InferenceClient: Send + Sync {
    /// Request a chat completion for a message list.
    async fn create_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sampling: &SamplingArgs,
    ) -> Result<String>;

    /// Request a text completion for a raw prompt.
    async fn create_completion(
        &self,
        model: &str,
        prompt: &str,
        sampling: &SamplingArgs,
    ) -> Result<String>;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible inference server.
///
/// Wraps [`reqwest::Client`] with the base URL and API key needed to call
/// `/chat/completions` and `/completions`.
#[derive(Debug, Clone)]
pub struct LlmClient {
    /// The base URL for API requests (e.g. `"http://localhost:8000/v1"`).
    pub api_base: String,
    /// The API key used for bearer authentication.
    pub api_key: String,
    /// The underlying HTTP client.
    pub http: reqwest::Client,
}

impl LlmClient {
    /// Create a client pointing at `base_url` with a 30 second request timeout.
    ///
    /// Empty arguments fall back to `"http://localhost:8000/v1"` and
    /// `"local"`, matching a locally served vLLM-style endpoint.
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self::with_timeout(base_url, api_key, Duration::from_secs(30))
    }

    /// Create a client with an explicit request timeout.
    pub fn with_timeout(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        let base_url = if base_url.is_empty() {
            "http://localhost:8000/v1"
        } else {
            base_url
        };
        let api_key = if api_key.is_empty() { "local" } else { api_key };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");

        Self {
            api_base: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        }
    }

    /// Poll `GET {base_url}/models` until the server responds with 200 OK.
    ///
    /// A zero `retry_interval` defaults to 2 seconds. Fails once
    /// `total_timeout` has elapsed without a successful response.
    pub async fn check_server(
        &self,
        total_timeout: Duration,
        retry_interval: Duration,
    ) -> Result<()> {
        let retry_interval = if retry_interval.is_zero() {
            Duration::from_secs(2)
        } else {
            retry_interval
        };
        let url = format!("{}/models", self.api_base);
        let deadline = Instant::now() + total_timeout;

        loop {
            match self.http.get(&url).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                    info!(url, "inference server is available");
                    return Ok(());
                }
                Ok(resp) => debug!(url, status = resp.status().as_u16(), "server not ready"),
                Err(err) => debug!(url, error = %err, "server not reachable"),
            }

            if Instant::now() > deadline {
                anyhow::bail!("server not available after {total_timeout:?}");
            }
            tokio::time::sleep(retry_interval).await;
        }
    }
}

impl InferenceClient for LlmClient {
    async fn create_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sampling: &SamplingArgs,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(model, num_messages = messages.len(), "sending chat completion request");

        let request = ChatCompletionRequest::new(model, messages, sampling);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to send chat completion request")?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST
                && text.contains("context_length_exceeded")
            {
                return Ok(format!("{ERROR_PREFIX} context_length_exceeded"));
            }
            anyhow::bail!("unexpected status code {}: {}", status.as_u16(), text);
        }

        let chat_resp: ChatCompletionResponse = resp
            .json()
            .await
            .context("failed to decode chat completion response")?;

        let Some(choice) = chat_resp.choices.first() else {
            anyhow::bail!("no choices in response");
        };

        if choice.finish_reason == "length" {
            warn!(model, "generation truncated at max_tokens");
            return Ok(format!("{ERROR_PREFIX} max_tokens_reached"));
        }

        info!(
            model,
            prompt_tokens = chat_resp.usage.prompt_tokens,
            completion_tokens = chat_resp.usage.completion_tokens,
            "chat completion succeeded"
        );
        Ok(choice.message.content.clone())
    }

    async fn create_completion(
        &self,
        model: &str,
        prompt: &str,
        sampling: &SamplingArgs,
    ) -> Result<String> {
        let url = format!("{}/completions", self.api_base);
        debug!(model, prompt_len = prompt.len(), "sending completion request");

        let request = CompletionRequest::new(model, prompt, sampling);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("failed to send completion request")?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let text = resp.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::BAD_REQUEST
                && text.contains("context_length_exceeded")
            {
                return Ok(format!("{ERROR_PREFIX} context_length_exceeded"));
            }
            anyhow::bail!("unexpected status code {}: {}", status.as_u16(), text);
        }

        let comp_resp: CompletionResponse = resp
            .json()
            .await
            .context("failed to decode completion response")?;

        let Some(choice) = comp_resp.choices.first() else {
            anyhow::bail!("no choices in response");
        };

        if choice.finish_reason == "length" {
            warn!(model, "generation truncated at max_tokens");
            return Ok(format!("{ERROR_PREFIX} max_tokens_reached"));
        }

        info!(
            model,
            prompt_tokens = comp_resp.usage.prompt_tokens,
            completion_tokens = comp_resp.usage.completion_tokens,
            "completion succeeded"
        );
        Ok(choice.text.clone())
    }
}

// ---------------------------------------------------------------------------
// Scripted client
// ---------------------------------------------------------------------------

/// A request recorded by [`ScriptedClient`].
#[derive(Debug, Clone)]
pub enum ScriptedRequest {
    /// A chat completion request with the full message list.
    Chat(Vec<ChatMessage>),
    /// A text completion request with the raw prompt.
    Text(String),
}

/// Deterministic client that replays a fixed queue of responses.
///
/// Each call pops the next queued response and records the request it was
/// given, so tests can assert both the transcript the environment built and
/// the order of model calls. Runs out of responses loudly.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ScriptedRequest>>,
}

impl ScriptedClient {
    /// Create a client that serves `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// The requests recorded so far, in call order.
    pub fn requests(&self) -> Vec<ScriptedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The number of queued responses not yet served.
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn next_response(&self) -> Result<String> {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("scripted client has no responses left"))
    }
}

impl InferenceClient for ScriptedClient {
    async fn create_chat_completion(
        &self,
        _model: &str,
        messages: &[ChatMessage],
        _sampling: &SamplingArgs,
    ) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScriptedRequest::Chat(messages.to_vec()));
        self.next_response()
    }

    async fn create_completion(
        &self,
        _model: &str,
        prompt: &str,
        _sampling: &SamplingArgs,
    ) -> Result<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ScriptedRequest::Text(prompt.to_string()));
        self.next_response()
    }
}

// ---------------------------------------------------------------------------
// Client dispatch
// ---------------------------------------------------------------------------

/// All supported client implementations behind one concrete type.
#[derive(Debug)]
pub enum AnyClient {
    Http(LlmClient),
    Scripted(ScriptedClient),
}

impl InferenceClient for AnyClient {
    async fn create_chat_completion(
        &self,
        model: &str,
        messages: &[ChatMessage],
        sampling: &SamplingArgs,
    ) -> Result<String> {
        match self {
            AnyClient::Http(c) => c.create_chat_completion(model, messages, sampling).await,
            AnyClient::Scripted(c) => c.create_chat_completion(model, messages, sampling).await,
        }
    }

    async fn create_completion(
        &self,
        model: &str,
        prompt: &str,
        sampling: &SamplingArgs,
    ) -> Result<String> {
        match self {
            AnyClient::Http(c) => c.create_completion(model, prompt, sampling).await,
            AnyClient::Scripted(c) => c.create_completion(model, prompt, sampling).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are helpful.");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.content, "You are helpful.");

        let usr = ChatMessage::user("Hello");
        assert_eq!(usr.role, Role::User);

        let asst = ChatMessage::assistant("Hi there");
        assert_eq!(asst.role, Role::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn test_sampling_args_default_omits_unset_fields() {
        let json = serde_json::to_value(SamplingArgs::default()).unwrap();
        assert_eq!(json, serde_json::json!({"n": 1}));
    }

    #[test]
    fn test_chat_request_serialization() {
        let messages = vec![ChatMessage::user("hi")];
        let sampling = SamplingArgs {
            temperature: Some(0.7),
            max_tokens: Some(256),
            ..SamplingArgs::default()
        };
        let request = ChatCompletionRequest::new("test-model", &messages, &sampling);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "test-model");
        assert_eq!(json["n"], 1);
        assert!((json["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-9);
        assert_eq!(json["max_tokens"], 256);
        assert!(json.get("top_p").is_none());
        assert!(json.get("stop").is_none());
        assert!(json.get("extra_body").is_none());
    }

    #[test]
    fn test_chat_request_includes_extra_body() {
        let messages = vec![ChatMessage::user("hi")];
        let mut sampling = SamplingArgs::default();
        sampling
            .extra
            .insert("skip_special_tokens".to_string(), Value::Bool(false));
        let request = ChatCompletionRequest::new("m", &messages, &sampling);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["extra_body"]["skip_special_tokens"], false);
    }

    #[tokio::test]
    async fn test_scripted_client_pops_in_order() {
        let client = ScriptedClient::new(["first", "second"]);
        let sampling = SamplingArgs::default();

        let r1 = client
            .create_chat_completion("m", &[ChatMessage::user("a")], &sampling)
            .await
            .unwrap();
        let r2 = client
            .create_chat_completion("m", &[ChatMessage::user("b")], &sampling)
            .await
            .unwrap();
        assert_eq!(r1, "first");
        assert_eq!(r2, "second");
        assert_eq!(client.remaining(), 0);

        let err = client
            .create_chat_completion("m", &[ChatMessage::user("c")], &sampling)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no responses left"));
    }

    #[tokio::test]
    async fn test_scripted_client_records_requests() {
        let client = ScriptedClient::new(["ok", "ok"]);
        let sampling = SamplingArgs::default();
        client
            .create_chat_completion("m", &[ChatMessage::user("q")], &sampling)
            .await
            .unwrap();
        client.create_completion("m", "raw prompt", &sampling).await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        match &requests[0] {
            ScriptedRequest::Chat(messages) => assert_eq!(messages[0].content, "q"),
            other => panic!("expected chat request, got {other:?}"),
        }
        match &requests[1] {
            ScriptedRequest::Text(prompt) => assert_eq!(prompt, "raw prompt"),
            other => panic!("expected text request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_chat_completion_success() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .and(matchers::header("authorization", "Bearer test-key"))
            .and(matchers::body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hi"}],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "hello"},
                    "finish_reason": "stop",
                }],
                "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5},
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "test-key");
        let response = client
            .create_chat_completion("test-model", &[ChatMessage::user("hi")], &SamplingArgs::default())
            .await
            .unwrap();
        assert_eq!(response, "hello");
    }

    #[tokio::test]
    async fn test_chat_completion_truncation_sentinel() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "message": {"role": "assistant", "content": "partial"},
                    "finish_reason": "length",
                }],
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        let response = client
            .create_chat_completion("m", &[ChatMessage::user("hi")], &SamplingArgs::default())
            .await
            .unwrap();
        assert_eq!(response, "[ERROR] max_tokens_reached");
    }

    #[tokio::test]
    async fn test_chat_completion_context_length_sentinel() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_string(r#"{"error": "context_length_exceeded"}"#),
            )
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        let response = client
            .create_chat_completion("m", &[ChatMessage::user("hi")], &SamplingArgs::default())
            .await
            .unwrap();
        assert_eq!(response, "[ERROR] context_length_exceeded");
    }

    #[tokio::test]
    async fn test_chat_completion_error_status() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        let err = client
            .create_chat_completion("m", &[ChatMessage::user("hi")], &SamplingArgs::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unexpected status code 500"));
    }

    #[tokio::test]
    async fn test_chat_completion_no_choices() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [],
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        let err = client
            .create_chat_completion("m", &[ChatMessage::user("hi")], &SamplingArgs::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no choices in response"));
    }

    #[tokio::test]
    async fn test_completion_endpoint() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::path("/completions"))
            .and(matchers::body_partial_json(serde_json::json!({
                "model": "m",
                "prompt": "Once upon",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "text": " a time", "finish_reason": "stop"}],
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        let response = client
            .create_completion("m", "Once upon", &SamplingArgs::default())
            .await
            .unwrap();
        assert_eq!(response, " a time");
    }

    #[tokio::test]
    async fn test_check_server_ok() {
        let server = MockServer::start().await;
        Mock::given(matchers::method("GET"))
            .and(matchers::path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"id": "test-model"}],
            })))
            .mount(&server)
            .await;

        let client = LlmClient::new(&server.uri(), "k");
        client
            .check_server(Duration::from_secs(5), Duration::from_millis(50))
            .await
            .unwrap();
    }

    #[test]
    fn test_empty_base_url_falls_back_to_local_default() {
        let client = LlmClient::new("", "");
        assert_eq!(client.api_base, "http://localhost:8000/v1");
        assert_eq!(client.api_key, "local");
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LlmClient::new("https://api.example.com/v1/", "key");
        assert_eq!(client.api_base, "https://api.example.com/v1");
    }
}
