//! OpenAI-compatible chat completion provider
//!
//! Works against any backend exposing `POST {base_url}/chat/completions`,
//! which covers hosted proxies, Gemini's OpenAI endpoint and local servers.
//! The first choice's message content is parsed as JSON; fenced blocks are
//! unwrapped and non-JSON content is returned as a JSON string.

use crate::error::{Error, Result};
use crate::provider::{GenerationRequest, Provider};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for one chat completion backend
#[derive(Clone)]
pub struct OpenAiCompatConfig {
    /// Provider name used in logs
    pub name: String,
    /// API base URL, without the `/chat/completions` suffix
    pub base_url: Url,
    /// Model identifier
    pub model: String,
    /// Bearer token
    pub api_key: Option<SecretString>,
    /// Request timeout
    pub timeout: Duration,
    /// Ask for a JSON object response
    pub json_mode: bool,
}

impl OpenAiCompatConfig {
    /// Create a new configuration
    pub fn new(name: impl Into<String>, base_url: Url, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url,
            model: model.into(),
            api_key: None,
            timeout: Duration::from_secs(120),
            json_mode: true,
        }
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Toggle JSON response mode
    pub fn with_json_mode(mut self, json_mode: bool) -> Self {
        self.json_mode = json_mode;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.as_str().trim_end_matches('/'))
    }
}

impl std::fmt::Debug for OpenAiCompatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***REDACTED***"))
            .field("timeout", &self.timeout)
            .field("json_mode", &self.json_mode)
            .finish()
    }
}

/// Chat completion provider
pub struct OpenAiCompatProvider {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatProvider {
    /// Create a provider with its own HTTP client
    pub fn new(config: OpenAiCompatConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }

    async fn complete(&self, request: &ChatRequest<'_>) -> Result<String> {
        let mut http = self.client.post(self.config.endpoint()).json(request);
        if let Some(key) = &self.config.api_key {
            http = http.bearer_auth(key.expose_secret());
        }

        let response = http.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::provider(
                &self.config.name,
                format!("Request failed with status {}: {}", status, error_text),
            ));
        }

        let completion: ChatResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::provider(&self.config.name, "response contained no message content"))
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn invoke(&self, request: &GenerationRequest) -> Result<serde_json::Value> {
        let mut messages = Vec::with_capacity(2);
        if !request.instructions.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: &request.instructions,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &request.prompt,
        });

        let body = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: self.config.json_mode.then_some(ResponseFormat { kind: "json_object" }),
        };

        tracing::debug!(provider = %self.config.name, model = %self.config.model, "Sending chat completion");
        let content = self.complete(&body).await?;
        Ok(parse_content(&content))
    }
}

/// Parse model output as JSON, unwrapping a fenced block when present
pub fn parse_content(content: &str) -> serde_json::Value {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced).unwrap_or_else(|_| serde_json::Value::String(trimmed.to_string()))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn provider_for(server: &mockito::ServerGuard) -> OpenAiCompatProvider {
        let base = Url::parse(&format!("{}/v1", server.url())).unwrap();
        OpenAiCompatProvider::new(
            OpenAiCompatConfig::new("test-backend", base, "test-model").with_api_key("sk-test"),
        )
        .unwrap()
    }

    fn completion(content: &str) -> String {
        json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
    }

    #[tokio::test]
    async fn parses_json_content() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "test-model",
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": "Generate titles" },
                    { "role": "user", "content": "transcript" }
                ]
            })))
            .with_status(200)
            .with_body(completion(r#"{"titles": ["A", "B"]}"#))
            .create_async()
            .await;

        let provider = provider_for(&server);
        let out = provider
            .invoke(&GenerationRequest::new("Generate titles", "transcript"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(out, json!({ "titles": ["A", "B"] }));
    }

    #[tokio::test]
    async fn non_success_status_is_a_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body("rate limited")
            .create_async()
            .await;

        let err = provider_for(&server)
            .invoke(&GenerationRequest::new("", "hi"))
            .await
            .unwrap_err();

        match err {
            Error::Provider { provider, message } => {
                assert_eq!(provider, "test-backend");
                assert!(message.contains("429"));
                assert!(message.contains("rate limited"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_choices_are_rejected() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .invoke(&GenerationRequest::new("", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no message content"));
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let value = parse_content("```json\n{\"description\": \"x\"}\n```");
        assert_eq!(value, json!({ "description": "x" }));
    }

    #[test]
    fn prose_becomes_a_string() {
        assert_eq!(parse_content("  00:00 Intro\n"), json!("00:00 Intro"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = OpenAiCompatConfig::new("x", Url::parse("https://example.com/v1").unwrap(), "m")
            .with_api_key("sk-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("REDACTED"));
    }
}
