use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::ProviderError;

/// A single prompt pair sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub model: String,
    /// Output schema for structured calls; `None` for free-form text
    #[serde(default)]
    pub response_format: Option<ResponseFormat>,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            model: model.into(),
            response_format: None,
        }
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn is_structured(&self) -> bool {
        self.response_format.is_some()
    }
}

/// A named JSON schema the provider must constrain its output to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseFormat {
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// Render as an OpenAI `response_format` object
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": true,
                "schema": self.schema,
            }
        })
    }
}

/// Result of a blocking completion call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Text content of the first choice; `None` when the provider sent nothing
    pub content: Option<String>,
    pub model: Option<String>,
    pub finish_reason: Option<String>,
}

impl CompletionResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Content with surrounding whitespace removed, `None` if blank
    pub fn non_empty_content(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// One event from a streamed completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A piece of text, to be appended in arrival order
    Delta(String),
    /// The provider's explicit end-of-stream marker
    Done,
}

/// Lazily produced stream events
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ProviderError>> + Send>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_format_to_openai() {
        let format = ResponseFormat::new("Ideas", serde_json::json!({"type": "object"}));
        let value = format.to_openai();
        assert_eq!(value["type"], "json_schema");
        assert_eq!(value["json_schema"]["name"], "Ideas");
        assert_eq!(value["json_schema"]["strict"], true);
        assert_eq!(value["json_schema"]["schema"]["type"], "object");
    }

    #[test]
    fn test_non_empty_content() {
        assert_eq!(CompletionResponse::default().non_empty_content(), None);
        assert_eq!(CompletionResponse::text("  \n").non_empty_content(), None);
        assert_eq!(
            CompletionResponse::text(" {\"a\":1} ").non_empty_content(),
            Some("{\"a\":1}")
        );
    }

    #[test]
    fn test_structured_flag() {
        let request = CompletionRequest::new("sys", "user", "gpt-4o-mini");
        assert!(!request.is_structured());
        let request = request.with_response_format(ResponseFormat::new(
            "Requirements",
            serde_json::json!({}),
        ));
        assert!(request.is_structured());
    }
}
