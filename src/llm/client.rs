use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use std::fmt::Debug;
use std::time::Duration;
use tracing::debug;

use super::ChatMessage;
use crate::config::Endpoint;
use crate::core::{ErrorKind, TokenUsage};

/// Fixed per-request timeout, deliberately shorter than any caller-side
/// lifetime so a hung endpoint always resolves to a Timeout failure.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A successful completion extracted from the endpoint response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub usage: Option<TokenUsage>,
}

/// A dispatch failure, already classified for the execution record.
#[derive(Debug, Clone)]
pub struct CompletionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CompletionError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompletionError {
            kind,
            message: message.into(),
        }
    }
}

/// Seam between the execution service and the network. The production
/// implementation speaks HTTP; tests substitute a scripted client.
#[async_trait]
pub trait CompletionClient: Debug + Send + Sync {
    async fn complete(
        &self,
        endpoint: &Endpoint,
        messages: &[ChatMessage],
    ) -> Result<Completion, CompletionError>;
}

/// Completion client for OpenAI-compatible chat endpoints.
#[derive(Debug, Default)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
}

impl HttpCompletionClient {
    pub fn new() -> Self {
        HttpCompletionClient {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    /// Posts the messages to `{base_url}/chat/completions` with the
    /// endpoint's API key as bearer credential.
    ///
    /// Any fault - connection error, timeout, non-2xx status, unexpected
    /// body shape - is returned as a classified `CompletionError`.
    async fn complete(
        &self,
        endpoint: &Endpoint,
        messages: &[ChatMessage],
    ) -> Result<Completion, CompletionError> {
        let url = endpoint.chat_completions_url();
        let request_body = json!({
            "model": endpoint.model,
            "messages": messages,
        });

        debug!("dispatching {} messages to {}", messages.len(), url);

        let res = self
            .http
            .post(&url)
            .bearer_auth(&endpoint.api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let payload: serde_json::Value = res.json().await.map_err(|e| {
            CompletionError::new(
                ErrorKind::ParseError,
                format!("response body is not valid JSON: {}", e),
            )
        })?;

        parse_completion(&payload)
    }
}

/// Maps a reqwest transport error onto the failure taxonomy.
fn classify_transport_error(err: reqwest::Error) -> CompletionError {
    if err.is_timeout() {
        CompletionError::new(ErrorKind::Timeout, "request exceeded 30s")
    } else if err.is_connect() {
        CompletionError::new(
            ErrorKind::NetworkError,
            format!("connection failed: {}", err),
        )
    } else {
        CompletionError::new(ErrorKind::NetworkError, err.to_string())
    }
}

/// Maps a non-success HTTP status onto the failure taxonomy.
fn classify_status(status: StatusCode, body: &str) -> CompletionError {
    let kind = if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ErrorKind::Unauthorized
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ErrorKind::RateLimited
    } else {
        ErrorKind::ServerError
    };
    CompletionError::new(kind, format!("HTTP {}: {}", status.as_u16(), body.trim()))
}

/// Extracts the completion text and optional token usage from a success
/// body. Any other shape is a parse failure.
fn parse_completion(payload: &serde_json::Value) -> Result<Completion, CompletionError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            CompletionError::new(
                ErrorKind::ParseError,
                "no completion content in endpoint response",
            )
        })?;

    let usage = payload
        .get("usage")
        .and_then(|u| serde_json::from_value::<TokenUsage>(u.clone()).ok());

    Ok(Completion {
        content: content.trim().to_string(),
        usage,
    })
}
