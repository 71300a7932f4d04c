use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::version::VersionRef;
use crate::errors::{Error, Result};

/// Unique identifier for an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        RecordId(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(RecordId)
            .map_err(|_| Error::not_found(format!("no execution record with id '{}'", s)))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of a failed dispatch, mapped from the HTTP status or the
/// transport error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Timeout,
    Unauthorized,
    RateLimited,
    ServerError,
    NetworkError,
    ParseError,
}

impl ErrorKind {
    /// Short actionable advice shown next to the failure message.
    pub fn advice(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "request exceeded the 30s limit",
            ErrorKind::Unauthorized => "check the endpoint API key",
            ErrorKind::RateLimited => "endpoint is rate limiting, retry later",
            ErrorKind::ServerError => "the endpoint returned an error status",
            ErrorKind::NetworkError => "could not reach the endpoint",
            ErrorKind::ParseError => "the endpoint response was not understood",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::ParseError => "ParseError",
        };
        write!(f, "{}", name)
    }
}

/// Token counts reported by the endpoint, when present.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: Option<u32>,
    #[serde(default)]
    pub completion_tokens: Option<u32>,
    #[serde(default)]
    pub total_tokens: Option<u32>,
}

/// Terminal result of one execution: either a completion or a classified
/// failure, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        response: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<TokenUsage>,
    },
    Failure {
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    /// The response text for successful outcomes.
    pub fn response(&self) -> Option<&str> {
        match self {
            Outcome::Success { response, .. } => Some(response),
            Outcome::Failure { .. } => None,
        }
    }
}

/// Immutable record of one execution attempt, successful or failed.
///
/// Records are owned by the history ledger and reference their version; they
/// are removed only when the owning task is cascade-deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: RecordId,
    pub version: VersionRef,
    pub executed_at: DateTime<Utc>,
    /// The merged variable mapping used for this run.
    pub inputs: HashMap<String, String>,
    /// The rendered user prompt that was dispatched.
    pub rendered_prompt: String,
    pub model: String,
    pub outcome: Outcome,
}
