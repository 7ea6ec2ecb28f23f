//! One operation per provider-backed stage transition.
//!
//! Each takes the borrowed session subset it needs and returns either a
//! validated artifact or an open stream. None of them touch a [`Session`];
//! committing results is the pipeline's job.
//!
//! [`Session`]: crate::Session

use tokio_util::sync::CancellationToken;

use playforge_agent::Provider;
use playforge_prompts::{IdeaList, QuestionList, StageInputs, StagePrompts};

use crate::{PipelineError, StreamingClient, StructuredClient, TextStream};

/// Concept to exactly three game ideas
pub async fn generate_ideas(
    provider: &dyn Provider,
    inputs: &StageInputs<'_>,
    model: &str,
) -> Result<IdeaList, PipelineError> {
    let prompt = StagePrompts::ideas(inputs)?;
    StructuredClient::new(provider).request(&prompt, model).await
}

/// Concept and idea to exactly five three-option questions
pub async fn generate_requirements(
    provider: &dyn Provider,
    inputs: &StageInputs<'_>,
    model: &str,
) -> Result<QuestionList, PipelineError> {
    let prompt = StagePrompts::requirements(inputs)?;
    StructuredClient::new(provider).request(&prompt, model).await
}

/// Concept, idea and answers to a streamed markdown specification
pub async fn stream_specification(
    provider: &dyn Provider,
    inputs: &StageInputs<'_>,
    model: &str,
    cancel: CancellationToken,
) -> Result<TextStream, PipelineError> {
    let prompt = StagePrompts::specification(inputs)?;
    StreamingClient::new(provider)
        .open(&prompt, model, cancel)
        .await
}

/// Specification to a streamed single-file HTML game
pub async fn stream_code(
    provider: &dyn Provider,
    inputs: &StageInputs<'_>,
    model: &str,
    cancel: CancellationToken,
) -> Result<TextStream, PipelineError> {
    let prompt = StagePrompts::code(inputs)?;
    StreamingClient::new(provider)
        .open(&prompt, model, cancel)
        .await
}
