//! Chat-completion client for OpenAI-compatible LLM servers.
//!
//! vLLM, Ollama and hosted API endpoints all expose `POST {api_base}/chat/completions`,
//! so a single HTTP client covers every provider SynthKit supports. The core
//! crate only sees the [`ChatClient`] trait, which keeps it testable with
//! scripted in-memory clients.
//!
//! The client never retries. It classifies failures so the caller's retry
//! policy can decide: timeouts, connection failures, HTTP 429 and 5xx become
//! [`SynthError::Provider`] (transient), other 4xx become
//! [`SynthError::ProviderRejected`], and an undecodable body becomes
//! [`SynthError::MalformedResponse`].

use std::future::Future;
use std::time::Instant;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use synthkit_shared::{ProviderKind, ProviderSettings, Result, SynthError};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("SynthKit/", env!("CARGO_PKG_VERSION"));

/// How much of an error body to keep in error messages.
const ERROR_BODY_PREVIEW: usize = 300;

// ---------------------------------------------------------------------------
// ChatClient trait
// ---------------------------------------------------------------------------

/// A single chat message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// Sampling parameters for one completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub temperature: f64,
    pub top_p: Option<f64>,
    pub max_tokens: u32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: Some(0.95),
            max_tokens: 4096,
        }
    }
}

/// Anything that can turn a conversation into the assistant's reply text.
pub trait ChatClient: Send + Sync {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> impl Future<Output = Result<String>> + Send;
}

impl<C: ChatClient> ChatClient for &C {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> impl Future<Output = Result<String>> + Send {
        (**self).chat(messages, options)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// ---------------------------------------------------------------------------
// OpenAiCompatibleClient
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat-completions server.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: Client,
    kind: ProviderKind,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleClient {
    /// Build a client from resolved provider settings.
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout)
            .build()
            .map_err(|e| SynthError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            kind: settings.kind,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            api_key: settings.api_key.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let body = ChatCompletionsRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            top_p: options.top_p,
            max_tokens: options.max_tokens,
        };

        let started = Instant::now();
        let response = self
            .authorize(self.http.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| classify_transport_error(&url, &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SynthError::Provider(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(classify_status(&url, status, &text));
        }

        let content = extract_content(&text)?;
        debug!(
            provider = %self.kind,
            model = %self.model,
            latency_ms = started.elapsed().as_millis() as u64,
            chars = content.len(),
            "chat completion received"
        );
        Ok(content)
    }
}

impl ChatClient for OpenAiCompatibleClient {
    fn chat(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> impl Future<Output = Result<String>> + Send {
        self.complete(messages, options)
    }
}

// ---------------------------------------------------------------------------
// Server check
// ---------------------------------------------------------------------------

/// Result of probing a provider's `/models` endpoint.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub api_base: String,
    /// Model ids the server reports, possibly empty.
    pub models: Vec<String>,
}

impl ServerStatus {
    pub fn serves(&self, model: &str) -> bool {
        self.models.iter().any(|m| m == model)
    }
}

/// Check that the configured server is reachable and list its models.
#[instrument(skip_all, fields(provider = %settings.kind, api_base = %settings.api_base))]
pub async fn check_server(settings: &ProviderSettings) -> Result<ServerStatus> {
    let client = OpenAiCompatibleClient::new(settings)?;
    let url = format!("{}/models", client.api_base);

    let response = client
        .authorize(client.http.get(&url))
        .send()
        .await
        .map_err(|e| classify_transport_error(&url, &e))?;

    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| SynthError::Provider(format!("{url}: failed to read body: {e}")))?;

    if !status.is_success() {
        return Err(classify_status(&url, status, &text));
    }

    // Some servers answer with a non-standard body; reachability is what matters.
    let models = serde_json::from_str::<ModelList>(&text)
        .map(|list| list.data.into_iter().map(|m| m.id).collect())
        .unwrap_or_default();

    info!(models = ?models, "server is reachable");
    Ok(ServerStatus {
        api_base: client.api_base,
        models,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classify_transport_error(url: &str, e: &reqwest::Error) -> SynthError {
    let what = if e.is_timeout() {
        "request timed out"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    SynthError::Provider(format!("{url}: {what}: {e}"))
}

fn classify_status(url: &str, status: StatusCode, body: &str) -> SynthError {
    let preview: String = body.chars().take(ERROR_BODY_PREVIEW).collect();
    let message = format!("{url}: HTTP {status}: {preview}");
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SynthError::Provider(message)
    } else {
        SynthError::ProviderRejected(message)
    }
}

/// Pull the assistant text out of a completion body.
///
/// Accepts the OpenAI shape (`choices[0].message.content`) and the Llama API
/// shape (`completion_message.content`, either a string or `{ "text": ... }`).
fn extract_content(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| SynthError::MalformedResponse(format!("completion body is not JSON: {e}")))?;

    let content = value
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .or_else(|| {
            let content = value.pointer("/completion_message/content")?;
            content
                .as_str()
                .or_else(|| content.get("text").and_then(|t| t.as_str()))
        })
        .ok_or_else(|| {
            SynthError::MalformedResponse("completion body has no message content".into())
        })?;

    if content.trim().is_empty() {
        return Err(SynthError::MalformedResponse("completion was empty".into()));
    }
    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(api_base: String) -> ProviderSettings {
        ProviderSettings {
            kind: ProviderKind::Vllm,
            api_base,
            model: "test-model".into(),
            api_key: None,
            timeout: Duration::from_secs(5),
        }
    }

    fn openai_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "cmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    #[test]
    fn extract_openai_content() {
        let body = openai_body("hello").to_string();
        assert_eq!(extract_content(&body).unwrap(), "hello");
    }

    #[test]
    fn extract_llama_api_content() {
        let body = r#"{"completion_message": {"content": {"type": "text", "text": "hi there"}}}"#;
        assert_eq!(extract_content(body).unwrap(), "hi there");

        let body = r#"{"completion_message": {"content": "plain"}}"#;
        assert_eq!(extract_content(body).unwrap(), "plain");
    }

    #[test]
    fn extract_rejects_missing_or_empty_content() {
        assert!(matches!(
            extract_content(r#"{"choices": []}"#),
            Err(SynthError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_content(&openai_body("   ").to_string()),
            Err(SynthError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_content("<html>oops</html>"),
            Err(SynthError::MalformedResponse(_))
        ));
    }

    #[test]
    fn status_classification() {
        let e = classify_status("u", StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(e.is_transient());
        let e = classify_status("u", StatusCode::BAD_GATEWAY, "");
        assert!(e.is_transient());
        let e = classify_status("u", StatusCode::UNAUTHORIZED, "bad key");
        assert!(matches!(e, SynthError::ProviderRejected(_)));
        assert!(!e.is_transient());
    }

    #[tokio::test]
    async fn chat_posts_model_and_messages() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "model": "test-model",
                "messages": [{ "role": "user", "content": "ping" }],
                "max_tokens": 128
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("pong")))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompatibleClient::new(&settings(format!("{}/v1/", server.uri()))).unwrap();
        let options = CompletionOptions {
            temperature: 0.1,
            top_p: None,
            max_tokens: 128,
        };
        let reply = client.chat(&[ChatMessage::user("ping")], &options).await.unwrap();
        assert_eq!(reply, "pong");
    }

    #[tokio::test]
    async fn chat_sends_bearer_key() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(openai_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let mut s = settings(server.uri());
        s.kind = ProviderKind::ApiEndpoint;
        s.api_key = Some("sk-test".into());
        let client = OpenAiCompatibleClient::new(&s).unwrap();
        let reply = client
            .chat(&[ChatMessage::user("hi")], &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "ok");
    }

    #[tokio::test]
    async fn chat_maps_server_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/unavailable/chat/completions"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/denied/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/garbled/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let msgs = [ChatMessage::user("x")];
        let opts = CompletionOptions::default();

        let client = OpenAiCompatibleClient::new(&settings(format!("{}/unavailable", server.uri()))).unwrap();
        let err = client.chat(&msgs, &opts).await.unwrap_err();
        assert!(matches!(err, SynthError::Provider(_)));
        assert!(err.to_string().contains("overloaded"));

        let client = OpenAiCompatibleClient::new(&settings(format!("{}/denied", server.uri()))).unwrap();
        let err = client.chat(&msgs, &opts).await.unwrap_err();
        assert!(matches!(err, SynthError::ProviderRejected(_)));

        let client = OpenAiCompatibleClient::new(&settings(format!("{}/garbled", server.uri()))).unwrap();
        let err = client.chat(&msgs, &opts).await.unwrap_err();
        assert!(matches!(err, SynthError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn chat_timeout_is_transient() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(openai_body("late"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let mut s = settings(server.uri());
        s.timeout = Duration::from_millis(100);
        let client = OpenAiCompatibleClient::new(&s).unwrap();
        let err = client
            .chat(&[ChatMessage::user("x")], &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn check_server_lists_models() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{ "id": "test-model", "object": "model" }]
            })))
            .mount(&server)
            .await;

        let status = check_server(&settings(format!("{}/v1", server.uri()))).await.unwrap();
        assert!(status.serves("test-model"));
        assert!(!status.serves("other"));
    }

    #[tokio::test]
    async fn check_server_unreachable() {
        // Port 9 (discard) is almost never listening.
        let err = check_server(&settings("http://127.0.0.1:9/v1".into())).await.unwrap_err();
        assert!(matches!(err, SynthError::Provider(_)));
    }
}
