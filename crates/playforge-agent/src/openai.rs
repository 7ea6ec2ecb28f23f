use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    decode_event_stream, ChunkStream, CompletionRequest, CompletionResponse, Provider,
    ProviderConfig, ProviderError,
};

/// Provider speaking the OpenAI chat completions protocol
pub struct OpenAiProvider {
    client: Client,
    config: ProviderConfig,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "is_false")]
    stream: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl<'a> ChatRequest<'a> {
    fn from_request(request: &'a CompletionRequest, stream: bool) -> Self {
        Self {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            response_format: request.response_format.as_ref().map(|f| f.to_openai()),
            stream,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        // Idle limits only; a streamed body may legitimately outlive `timeout`
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.connect_timeout(timeout).read_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProviderError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn api_key(&self) -> Result<String, ProviderError> {
        std::env::var(&self.config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ProviderError::Auth {
                status: None,
                message: format!(
                    "API key not found in environment variable {}",
                    self.config.api_key_env
                ),
            })
    }

    /// Send a chat request and turn any non-success status into a typed error.
    ///
    /// Blocking calls get `timeout` as a total deadline; streams only as an idle limit.
    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, ProviderError> {
        let api_key = self.api_key()?;

        debug!(
            endpoint = %self.endpoint(),
            model = body.model,
            stream = body.stream,
            structured = body.response_format.is_some(),
            "Sending chat completion request"
        );

        let mut request = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .json(body);
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }
        if let (false, Some(timeout)) = (body.stream, self.config.timeout) {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = response.text().await.unwrap_or_default();
            let error = ProviderError::from_status(status.as_u16(), &text, retry_after);
            warn!(status = status.as_u16(), error = %error, "Provider returned an error");
            return Err(error);
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = ChatRequest::from_request(request, false);
        let response = self.send(&body).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Protocol(format!("Failed to decode completion: {}", e)))?;

        let Some(choice) = parsed.choices.into_iter().next() else {
            return Ok(CompletionResponse {
                content: None,
                model: parsed.model,
                finish_reason: None,
            });
        };

        if let Some(ref refusal) = choice.message.refusal {
            warn!(refusal = %refusal, "Model refused the request");
        }

        Ok(CompletionResponse {
            content: choice.message.content,
            model: parsed.model,
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
        let body = ChatRequest::from_request(request, true);
        let response = self.send(&body).await?;
        Ok(Box::pin(decode_event_stream(response.bytes_stream())))
    }

    async fn is_available(&self) -> bool {
        self.api_key().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResponseFormat;

    #[test]
    fn test_chat_request_body_for_structured_call() {
        let request = CompletionRequest::new("You are a planner", "Give me ideas", "gpt-5-nano")
            .with_response_format(ResponseFormat::new(
                "Ideas",
                serde_json::json!({"type": "object"}),
            ));
        let body = serde_json::to_value(ChatRequest::from_request(&request, false)).unwrap();

        assert_eq!(body["model"], "gpt-5-nano");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a planner");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_chat_request_body_for_stream() {
        let request = CompletionRequest::new("sys", "user", "gpt-5-mini");
        let body = serde_json::to_value(ChatRequest::from_request(&request, true)).unwrap();

        assert_eq!(body["stream"], true);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let provider =
            OpenAiProvider::new(ProviderConfig::new("http://localhost:11434/v1/")).unwrap();
        assert_eq!(
            provider.endpoint(),
            "http://localhost:11434/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_missing_api_key_is_auth_error() {
        let config = ProviderConfig::default().with_api_key_env("PLAYFORGE_TEST_UNSET_KEY");
        let provider = OpenAiProvider::new(config).unwrap();

        assert!(!provider.is_available().await);
        let err = provider
            .complete(&CompletionRequest::new("s", "u", "m"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth { status: None, .. }));
    }

    /// Serve one SSE response whose chunks are spaced `gap` apart, then close
    async fn serve_slow_stream(chunks: Vec<String>, gap: Duration) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // Headers and the small JSON body arrive well within a few reads
            while !String::from_utf8_lossy(&request).contains("\"stream\":true") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for chunk in chunks {
                tokio::time::sleep(gap).await;
                socket.write_all(chunk.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            socket.shutdown().await.unwrap();
        });
        format!("http://{}/v1", addr)
    }

    #[tokio::test]
    async fn test_stream_outlives_timeout_while_chunks_keep_arriving() {
        use crate::StreamEvent;
        use futures::StreamExt;

        let mut chunks: Vec<String> = (0..6)
            .map(|i| {
                let payload = serde_json::json!({
                    "choices": [{"index": 0, "delta": {"content": format!("c{}", i)}}]
                });
                format!("data: {}\n\n", payload)
            })
            .collect();
        chunks.push("data: [DONE]\n\n".to_string());
        let base_url = serve_slow_stream(chunks, Duration::from_millis(300)).await;

        std::env::set_var("PLAYFORGE_TEST_SLOW_STREAM_KEY", "sk-test");
        let config = ProviderConfig::new(base_url)
            .with_api_key_env("PLAYFORGE_TEST_SLOW_STREAM_KEY")
            .with_timeout(Duration::from_secs(1));
        let provider = OpenAiProvider::new(config).unwrap();

        let stream = provider
            .stream(&CompletionRequest::new("sys", "user", "gpt-5-mini"))
            .await
            .unwrap();
        let events: Vec<_> = stream.collect().await;

        assert_eq!(events.len(), 7, "{:?}", events);
        assert_eq!(events[0], Ok(StreamEvent::Delta("c0".into())));
        assert_eq!(events[5], Ok(StreamEvent::Delta("c5".into())));
        assert_eq!(events[6], Ok(StreamEvent::Done));
    }

    #[test]
    fn test_chat_response_decoding() {
        let raw = r#"{"id":"x","model":"gpt-4o-mini","choices":[{"index":0,"message":{"role":"assistant","content":"{\"questions\":[]}","refusal":null},"finish_reason":"stop"}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"questions\":[]}")
        );
        assert_eq!(parsed.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
