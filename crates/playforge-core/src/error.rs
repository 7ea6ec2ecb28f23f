use thiserror::Error;

use playforge_agent::ProviderError;
use playforge_prompts::{PromptError, ValidationError};

use crate::Stage;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Provider returned no content")]
    EmptyResponse,

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Response violates schema at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("Stream failed: {0}")]
    StreamError(String),

    #[error("Cannot advance from {stage}: {reason}")]
    PreconditionNotMet { stage: Stage, reason: String },

    #[error("{operation} is not available during {stage}")]
    WrongStage {
        operation: &'static str,
        stage: Stage,
    },

    #[error("{stage} generation is already in progress")]
    GenerationInFlight { stage: Stage },
}

impl PipelineError {
    /// Whether re-invoking the same stage's generation step may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Provider(_)
                | PipelineError::EmptyResponse
                | PipelineError::MalformedResponse(_)
                | PipelineError::SchemaViolation { .. }
                | PipelineError::StreamError(_)
        )
    }
}

impl From<PromptError> for PipelineError {
    fn from(err: PromptError) -> Self {
        match err {
            PromptError::InvalidInput(message) => PipelineError::InvalidInput(message),
        }
    }
}

impl From<ValidationError> for PipelineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::Malformed(message) => PipelineError::MalformedResponse(message),
            ValidationError::SchemaViolation { path, reason } => {
                PipelineError::SchemaViolation { path, reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::EmptyResponse.is_retryable());
        assert!(PipelineError::StreamError("reset".into()).is_retryable());
        assert!(PipelineError::Provider(ProviderError::RateLimited {
            message: "slow down".into(),
            retry_after: None,
        })
        .is_retryable());
        assert!(!PipelineError::InvalidInput("x".into()).is_retryable());
        assert!(!PipelineError::PreconditionNotMet {
            stage: Stage::ConceptSelection,
            reason: "no concept".into(),
        }
        .is_retryable());
    }

    #[test]
    fn test_validation_errors_map_to_taxonomy() {
        let err: PipelineError = ValidationError::Malformed("eof".into()).into();
        assert!(matches!(err, PipelineError::MalformedResponse(_)));

        let err: PipelineError = ValidationError::SchemaViolation {
            path: "$.ideas".into(),
            reason: "expected exactly 3 items, found 2".into(),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Response violates schema at $.ideas: expected exactly 3 items, found 2"
        );
    }
}
