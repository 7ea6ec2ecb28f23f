use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::{ChunkStream, CompletionRequest, CompletionResponse};

/// Errors surfaced by an LLM provider
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// `status` is `None` when no request was sent (missing key)
    #[error("Authentication failed: {message}")]
    Auth {
        status: Option<u16>,
        message: String,
    },

    #[error("Rate limited by provider: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Provider upstream failure (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unreadable provider response: {0}")]
    Protocol(String),

    #[error("Provider configuration error: {0}")]
    Config(String),
}

/// HTTP-style class of a provider failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// The request was refused (4xx, auth, rate limit)
    Client,
    /// The provider or something behind it failed (5xx, bad payloads)
    Upstream,
    /// The connection itself failed
    Transport,
}

impl ProviderError {
    /// Classify a non-success HTTP status into a provider error.
    ///
    /// The message is pulled from an OpenAI-style `{"error": {"message": ...}}`
    /// body when present, otherwise from the raw body text.
    pub fn from_status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let message = extract_error_message(body).unwrap_or_else(|| format!("HTTP {}", status));
        match status {
            401 | 403 => ProviderError::Auth {
                status: Some(status),
                message,
            },
            429 => ProviderError::RateLimited {
                message,
                retry_after,
            },
            400..=499 => ProviderError::Rejected { status, message },
            _ => ProviderError::Upstream { status, message },
        }
    }

    pub fn status_class(&self) -> StatusClass {
        match self {
            ProviderError::Auth { .. }
            | ProviderError::RateLimited { .. }
            | ProviderError::Rejected { .. }
            | ProviderError::Config(_) => StatusClass::Client,
            ProviderError::Upstream { .. } | ProviderError::Protocol(_) => StatusClass::Upstream,
            ProviderError::Transport(_) => StatusClass::Transport,
        }
    }

    /// HTTP status reported by the provider, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Auth { status, .. } => *status,
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::Rejected { status, .. } | ProviderError::Upstream { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(message) = value
            .get("error")
            .and_then(|e| e.get("message").or(Some(e)))
            .and_then(|m| m.as_str())
        {
            return Some(message.to_string());
        }
    }

    if trimmed.len() > 500 {
        let mut end = 500;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        Some(format!("{}...", &trimmed[..end]))
    } else {
        Some(trimmed.to_string())
    }
}

/// Connection settings for a provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`)
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Connect and idle-read limit; also a total deadline for blocking calls (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional request headers
    pub headers: HashMap<String, String>,
}

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout: Some(Duration::from_secs(300)),
            headers: HashMap::new(),
        }
    }
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_api_key_env(mut self, env: impl Into<String>) -> Self {
        self.api_key_env = env.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, key: String, value: String) -> Self {
        self.headers.insert(key, value);
        self
    }
}

/// The core abstraction over an LLM completion provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable name of the provider
    fn name(&self) -> &str;

    /// Issue one blocking completion call and return the whole response
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Open a streamed completion.
    ///
    /// The returned stream yields deltas in arrival order and a single
    /// [`StreamEvent::Done`](crate::StreamEvent::Done) when the provider
    /// signals the end. Each call opens a fresh provider stream.
    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError>;

    /// Check if the provider can be used (credentials present)
    async fn is_available(&self) -> bool;
}
