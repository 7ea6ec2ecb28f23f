use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use playforge_agent::{ChunkStream, CompletionRequest, Provider, ResponseFormat, StreamEvent};
use playforge_prompts::{parse_structured, PromptPair, StructuredOutput};

use crate::PipelineError;

/// Called with each streamed text delta, in arrival order
pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Issues one schema-constrained request and validates the reply
pub struct StructuredClient<'a> {
    provider: &'a dyn Provider,
}

impl<'a> StructuredClient<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    pub async fn request<T: StructuredOutput>(
        &self,
        prompt: &PromptPair,
        model: &str,
    ) -> Result<T, PipelineError> {
        let request = CompletionRequest::new(&prompt.system, &prompt.user, model)
            .with_response_format(ResponseFormat::new(T::NAME, T::shape().to_json_schema()));

        debug!(provider = self.provider.name(), schema = T::NAME, model, "Structured request");
        let response = self.provider.complete(&request).await?;

        let content = response
            .non_empty_content()
            .ok_or(PipelineError::EmptyResponse)?;

        parse_structured::<T>(content).map_err(|e| {
            warn!(schema = T::NAME, error = %e, "Structured response rejected");
            e.into()
        })
    }
}

/// Opens streamed completions
pub struct StreamingClient<'a> {
    provider: &'a dyn Provider,
}

impl<'a> StreamingClient<'a> {
    pub fn new(provider: &'a dyn Provider) -> Self {
        Self { provider }
    }

    pub async fn open(
        &self,
        prompt: &PromptPair,
        model: &str,
        cancel: CancellationToken,
    ) -> Result<TextStream, PipelineError> {
        let request = CompletionRequest::new(&prompt.system, &prompt.user, model);
        debug!(provider = self.provider.name(), model, "Opening stream");
        let inner = self.provider.stream(&request).await?;
        Ok(TextStream::new(inner, cancel))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Open,
    Finished,
    Abandoned,
    Failed,
}

/// Ordered text accumulation over a provider stream.
///
/// Only the provider's end-of-stream marker finishes a stream. A transport
/// error, or the byte stream ending without the marker, fails it. Once the
/// cancellation token fires the stream is abandoned and nothing more is
/// read from the provider.
pub struct TextStream {
    inner: ChunkStream,
    cancel: CancellationToken,
    buffer: String,
    chunks: usize,
    state: StreamState,
}

impl TextStream {
    pub fn new(inner: ChunkStream, cancel: CancellationToken) -> Self {
        Self {
            inner,
            cancel,
            buffer: String::new(),
            chunks: 0,
            state: StreamState::Open,
        }
    }

    /// The next text delta.
    ///
    /// Returns `None` once the stream has finished or been abandoned; check
    /// [`TextStream::is_finished`] to tell the two apart.
    pub async fn next_chunk(&mut self) -> Option<Result<String, PipelineError>> {
        if self.state != StreamState::Open {
            return None;
        }
        if self.cancel.is_cancelled() {
            self.state = StreamState::Abandoned;
            return None;
        }

        let next = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            item = self.inner.next() => Some(item),
        };
        let Some(item) = next else {
            self.state = StreamState::Abandoned;
            return None;
        };

        match item {
            Some(Ok(StreamEvent::Delta(text))) => {
                self.buffer.push_str(&text);
                self.chunks += 1;
                Some(Ok(text))
            }
            Some(Ok(StreamEvent::Done)) => {
                self.state = StreamState::Finished;
                None
            }
            Some(Err(e)) => {
                self.state = StreamState::Failed;
                Some(Err(PipelineError::StreamError(e.to_string())))
            }
            None => {
                self.state = StreamState::Failed;
                Some(Err(PipelineError::StreamError(
                    "stream ended without an end-of-stream marker".to_string(),
                )))
            }
        }
    }

    /// Text received so far
    pub fn accumulated(&self) -> &str {
        &self.buffer
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    pub fn is_abandoned(&self) -> bool {
        self.state == StreamState::Abandoned
    }

    /// The full text, only if the end-of-stream marker was seen
    pub fn into_text(self) -> Option<String> {
        match self.state {
            StreamState::Finished => Some(self.buffer),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use playforge_agent::{CompletionResponse, ProviderError};
    use playforge_prompts::IdeaList;
    use std::sync::Mutex;

    fn events(items: Vec<Result<StreamEvent, ProviderError>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    fn delta(text: &str) -> Result<StreamEvent, ProviderError> {
        Ok(StreamEvent::Delta(text.to_string()))
    }

    struct FixedProvider {
        content: Option<String>,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            request: &CompletionRequest,
        ) -> Result<CompletionResponse, ProviderError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(CompletionResponse {
                content: self.content.clone(),
                model: None,
                finish_reason: None,
            })
        }

        async fn stream(&self, _request: &CompletionRequest) -> Result<ChunkStream, ProviderError> {
            Ok(events(vec![delta("ok"), Ok(StreamEvent::Done)]))
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn prompt() -> PromptPair {
        PromptPair {
            system: "system".to_string(),
            user: "user".to_string(),
        }
    }

    #[tokio::test]
    async fn test_structured_request_sends_schema() {
        let provider = FixedProvider {
            content: Some(
                r#"{"ideas":[{"id":1,"title":"A","description":"a"},{"id":2,"title":"B","description":"b"},{"id":3,"title":"C","description":"c"}]}"#
                    .to_string(),
            ),
            requests: Mutex::new(Vec::new()),
        };
        let client = StructuredClient::new(&provider);
        let ideas: IdeaList = client.request(&prompt(), "gpt-5-nano").await.unwrap();
        assert_eq!(ideas.ideas.len(), 3);

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let format = requests[0].response_format.as_ref().unwrap();
        assert_eq!(format.name, "Ideas");
        assert_eq!(requests[0].model, "gpt-5-nano");
    }

    #[tokio::test]
    async fn test_structured_request_empty_content() {
        for content in [None, Some("   ".to_string())] {
            let provider = FixedProvider {
                content,
                requests: Mutex::new(Vec::new()),
            };
            let err = StructuredClient::new(&provider)
                .request::<IdeaList>(&prompt(), "m")
                .await
                .unwrap_err();
            assert_eq!(err, PipelineError::EmptyResponse);
        }
    }

    #[tokio::test]
    async fn test_text_stream_accumulates_in_order() {
        let mut stream = TextStream::new(
            events(vec![
                delta("<!DOCTYPE html>"),
                delta("<html>"),
                delta("</html>"),
                Ok(StreamEvent::Done),
            ]),
            CancellationToken::new(),
        );

        let mut seen = Vec::new();
        while let Some(chunk) = stream.next_chunk().await {
            seen.push(chunk.unwrap());
        }
        assert_eq!(seen, vec!["<!DOCTYPE html>", "<html>", "</html>"]);
        assert!(stream.is_finished());
        assert_eq!(stream.chunk_count(), 3);
        assert_eq!(
            stream.into_text().as_deref(),
            Some("<!DOCTYPE html><html></html>")
        );
    }

    #[tokio::test]
    async fn test_text_stream_without_done_marker_fails() {
        let mut stream = TextStream::new(events(vec![delta("partial")]), CancellationToken::new());
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), "partial");
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::StreamError(_)));
        assert!(stream.next_chunk().await.is_none());
        assert!(stream.into_text().is_none());
    }

    #[tokio::test]
    async fn test_text_stream_transport_error_fails() {
        let mut stream = TextStream::new(
            events(vec![
                delta("a"),
                Err(ProviderError::Transport("connection reset".into())),
                delta("never read"),
            ]),
            CancellationToken::new(),
        );
        assert!(stream.next_chunk().await.unwrap().is_ok());
        let err = stream.next_chunk().await.unwrap().unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        assert!(stream.next_chunk().await.is_none());
        assert_eq!(stream.accumulated(), "a");
    }

    #[tokio::test]
    async fn test_text_stream_stops_reading_after_cancel() {
        let cancel = CancellationToken::new();
        let mut stream = TextStream::new(
            events(vec![delta("one"), delta("two"), Ok(StreamEvent::Done)]),
            cancel.clone(),
        );
        assert_eq!(stream.next_chunk().await.unwrap().unwrap(), "one");
        cancel.cancel();
        assert!(stream.next_chunk().await.is_none());
        assert!(stream.is_abandoned());
        assert_eq!(stream.accumulated(), "one");
        assert!(stream.into_text().is_none());
    }

    #[tokio::test]
    async fn test_text_stream_cancel_unblocks_pending_read() {
        let cancel = CancellationToken::new();
        let pending = stream::pending::<Result<StreamEvent, ProviderError>>();
        let mut stream = TextStream::new(Box::pin(pending), cancel.clone());
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            trigger.cancel();
        });
        assert!(stream.next_chunk().await.is_none());
        assert!(stream.is_abandoned());
    }
}
