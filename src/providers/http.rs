//! HTTP completion client for OpenAI-compatible `/v1/chat/completions`
//! endpoints (Ollama, LM Studio, and hosted APIs all speak this shape).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_http_response, CompletionClient, CompletionRequest, ProviderError};

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Chat completion request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    /// Model name.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<ChatMessage>,
    /// Disable streaming.
    pub stream: bool,
    /// Maximum tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A message in chat format.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system" or "user".
    pub role: String,
    /// Message content.
    pub content: String,
}

/// Chat completion response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    /// Completion choices; the first is used.
    pub choices: Vec<ChatChoice>,
}

/// One completion choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    /// The generated message.
    pub message: ChatResponseMessage,
}

/// The message part of a choice.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    /// Generated text.
    pub content: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Completion client for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpCompletionClient {
    /// Create a client for `base_url` and `model` with a bounded
    /// per-call timeout.
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

/// Build the wire request from a completion request.
#[doc(hidden)]
pub fn build_request(model: &str, request: &CompletionRequest) -> ChatRequest {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system".to_owned(),
            content: system.clone(),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_owned(),
        content: request.prompt.clone(),
    });

    ChatRequest {
        model: model.to_owned(),
        messages,
        stream: false,
        max_tokens: request.max_tokens,
    }
}

/// Parse the wire response into completion text.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body cannot be deserialized or
/// contains no choices.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let resp: ChatResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;
    resp.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ProviderError::Parse("response contained no choices".to_owned()))
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = build_request(&self.model, &request);

        let mut http_request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        // One deadline covers the whole exchange, send and body read.
        let deadline = self.timeout;
        let exchange = async {
            let response = http_request.send().await?;
            check_http_response(response).await
        };
        let body = tokio::time::timeout(deadline, exchange)
            .await
            .map_err(|_| ProviderError::Timeout {
                seconds: deadline.as_secs(),
            })??;

        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_request_injects_system_message() {
        let request = CompletionRequest::new("hello").with_system("be terse");
        let wire = build_request("llama3", &request);

        assert_eq!(wire.model, "llama3");
        assert!(!wire.stream);
        assert_eq!(wire.messages.len(), 2);
        assert_eq!(wire.messages[0].role, "system");
        assert_eq!(wire.messages[0].content, "be terse");
        assert_eq!(wire.messages[1].role, "user");
        assert_eq!(wire.messages[1].content, "hello");
    }

    #[test]
    fn build_request_without_system() {
        let wire = build_request("llama3", &CompletionRequest::new("hello"));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, "user");
    }

    #[test]
    fn parse_response_takes_first_choice() {
        let body = r#"{"choices": [{"message": {"role": "assistant", "content": "first"}},
                                    {"message": {"role": "assistant", "content": "second"}}]}"#;
        let text = parse_response(body).expect("should parse");
        assert_eq!(text, "first");
    }

    #[test]
    fn parse_response_rejects_empty_choices() {
        let err = parse_response(r#"{"choices": []}"#).expect_err("should fail");
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[test]
    fn parse_response_rejects_invalid_json() {
        let err = parse_response("not json").expect_err("should fail");
        assert!(matches!(err, ProviderError::Parse(_)));
    }

    #[tokio::test]
    async fn deadline_bounds_the_whole_exchange() {
        use std::time::Instant;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind stub server");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            // Headers arrive late, then the body never does.
            tokio::time::sleep(Duration::from_millis(300)).await;
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n")
                .await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = HttpCompletionClient::new(
            format!("http://{addr}"),
            "llama3",
            None,
            Duration::from_millis(400),
        );
        let started = Instant::now();
        let err = client
            .complete(CompletionRequest::new("hello"))
            .await
            .expect_err("stalled body should time out");

        assert!(matches!(err, ProviderError::Timeout { .. }));
        assert!(
            started.elapsed() < Duration::from_millis(600),
            "send and body read must share one deadline"
        );
    }
}
