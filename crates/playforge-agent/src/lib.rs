mod openai;
mod request;
mod sse;
mod traits;

pub use openai::OpenAiProvider;
pub use request::{ChunkStream, CompletionRequest, CompletionResponse, ResponseFormat, StreamEvent};
pub use sse::{decode_event_stream, SseDecoder};
pub use traits::{Provider, ProviderConfig, ProviderError, StatusClass};

/// Create the default HTTP provider from a configuration
pub fn create_provider(config: ProviderConfig) -> Result<Box<dyn Provider>, ProviderError> {
    Ok(Box::new(OpenAiProvider::new(config)?))
}
