//! Model client abstraction.
//!
//! Defines the [`CompletionClient`] trait used by both the extraction
//! fallback and the planner. The model endpoint is treated as an opaque,
//! possibly slow, possibly failing collaborator: every call carries a
//! bounded timeout, and callers recover locally from failure rather than
//! propagating it past the orchestrator.

use async_trait::async_trait;

pub mod http;

/// A single-shot completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (injected before the user prompt).
    pub system: Option<String>,
    /// User prompt.
    pub prompt: String,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// A plain prompt with no system message.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: None,
        }
    }

    /// Attach a system prompt.
    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Errors returned by model and enrichment clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Upstream responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Raw response body, truncated.
        body: String,
    },
    /// The bounded call deadline elapsed.
    #[error("provider call timed out after {seconds}s")]
    Timeout {
        /// Configured deadline in seconds.
        seconds: u64,
    },
}

/// Core model client interface.
///
/// Implementations must be `Send + Sync` so engines can share them
/// across sessions.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a completion and return its raw text.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport failure, non-success
    /// status, unparseable response, or timeout.
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}

/// Check HTTP response status and return body text or a structured error.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure,
/// `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: truncate_body(&body),
        });
    }
    Ok(body)
}

fn truncate_body(raw: &str) -> String {
    const MAX_ERROR_BODY_CHARS: usize = 256;
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = collapsed
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }
    collapsed
}
