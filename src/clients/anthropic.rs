use crate::contexts::{CompletionRequest, SynthesisError, TextCompletion};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: [Message<'a>; 1],
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client used as the code synthesis capability
#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AnthropicClient {
    /// Creates a new client.
    ///
    /// # Arguments
    /// * `api_key` - Anthropic API key; without one every request fails with `MissingApiKey`
    /// * `base_url` - API root, normally `ANTHROPIC_BASE_URL`
    /// * `timeout` - Upper bound for a whole request including the response body
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SynthesisError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url.trim_end_matches('/'))
    }
}

impl TextCompletion for AnthropicClient {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn complete(&self, request: &CompletionRequest) -> Result<String, SynthesisError> {
        let api_key = self.api_key.as_deref().ok_or(SynthesisError::MissingApiKey)?;

        let body = MessagesRequest {
            model: &request.model,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: &request.system,
            messages: [Message {
                role: "user",
                content: &request.user,
            }],
        };

        debug!("Sending request to Anthropic API");
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to send request to Anthropic API");
                SynthesisError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = %status, body = %message, "Anthropic API returned error");
            return Err(SynthesisError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let text = response.text().await?;
        parse_reply(&text)
    }
}

/// Concatenates the text blocks of a Messages API response body
fn parse_reply(body: &str) -> Result<String, SynthesisError> {
    let parsed: MessagesResponse = serde_json::from_str(body)
        .map_err(|e| SynthesisError::MalformedResponse(e.to_string()))?;

    let text: String = parsed
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .filter_map(|block| block.text)
        .collect();

    debug!(reply_len = text.len(), "Received response from Anthropic");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "claude-test".to_string(),
            system: "Only code.".to_string(),
            user: "News content: rates".to_string(),
            temperature: 0.7,
            max_tokens: 512,
        }
    }

    #[test]
    fn parse_reply_joins_text_blocks() {
        let body = r#"{"id":"msg_1","content":[
            {"type":"text","text":"```python\n"},
            {"type":"tool_use","id":"t","name":"x","input":{}},
            {"type":"text","text":"print(1)\n```"}
        ]}"#;

        assert_eq!(parse_reply(body).unwrap(), "```python\nprint(1)\n```");
    }

    #[test]
    fn parse_reply_rejects_non_json() {
        assert!(matches!(
            parse_reply("<html>gateway</html>"),
            Err(SynthesisError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_without_request() {
        let client = AnthropicClient::new(None, "http://127.0.0.1:9", Duration::from_secs(1)).unwrap();

        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(SynthesisError::MissingApiKey)));
    }

    #[tokio::test]
    async fn sends_messages_request_and_returns_text() {
        let server = serve_once(
            "200 OK",
            r#"{"content":[{"type":"text","text":"from manim import *"}]}"#,
        )
        .await;
        let client = AnthropicClient::new(
            Some("sk-test".to_string()),
            server.base_url.clone(),
            Duration::from_secs(5),
        )
        .unwrap();

        let reply = client.complete(&request()).await.unwrap();
        let raw_request = server.request().await;

        assert_eq!(reply, "from manim import *");
        assert!(raw_request.starts_with("POST /v1/messages "));
        let lower = raw_request.to_ascii_lowercase();
        assert!(lower.contains("x-api-key: sk-test"));
        assert!(lower.contains("anthropic-version: 2023-06-01"));
        assert!(raw_request.contains(r#""model":"claude-test""#));
        assert!(raw_request.contains(r#""system":"Only code.""#));
        assert!(raw_request.contains(r#""role":"user""#));
        assert!(raw_request.contains(r#""content":"News content: rates""#));
        assert!(raw_request.contains(r#""max_tokens":512"#));
    }

    #[tokio::test]
    async fn error_status_maps_to_api_error() {
        let server = serve_once(
            "401 Unauthorized",
            r#"{"type":"error","error":{"type":"authentication_error"}}"#,
        )
        .await;
        let client = AnthropicClient::new(
            Some("bad".to_string()),
            server.base_url.clone(),
            Duration::from_secs(5),
        )
        .unwrap();

        let result = client.complete(&request()).await;

        match result {
            Err(SynthesisError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert!(message.contains("authentication_error"));
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let client = AnthropicClient::new(
            Some("sk".to_string()),
            "http://127.0.0.1:1",
            Duration::from_secs(2),
        )
        .unwrap();

        let result = client.complete(&request()).await;

        assert!(matches!(result, Err(SynthesisError::Transport(_))));
    }
}
