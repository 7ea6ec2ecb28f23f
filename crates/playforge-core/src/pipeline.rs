use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playforge_agent::Provider;
use playforge_logging::{LogEvent, Logger};
use playforge_prompts::{GameIdea, Question, MIN_SPECIFICATION_LEN};

use crate::catalog::looks_like_html_document;
use crate::client::{ChunkCallback, TextStream};
use crate::outcome::StreamOutcome;
use crate::session::{Session, SessionEvent};
use crate::{stages, PipelineError, Stage};

/// Model used for each provider-backed stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageModels {
    pub ideas: String,
    pub requirements: String,
    pub specification: String,
    pub code: String,
}

impl Default for StageModels {
    fn default() -> Self {
        Self {
            ideas: "gpt-5-nano".to_string(),
            requirements: "gpt-4o-mini".to_string(),
            specification: "gpt-5-mini".to_string(),
            code: "gpt-5-mini".to_string(),
        }
    }
}

impl StageModels {
    /// The same model for every stage
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            ideas: model.clone(),
            requirements: model.clone(),
            specification: model.clone(),
            code: model,
        }
    }

    /// Model for the generation that runs during `stage`
    pub fn for_stage(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::IdeaSelection => Some(&self.ideas),
            Stage::RequirementsGathering => Some(&self.requirements),
            Stage::SpecificationReview => Some(&self.specification),
            Stage::CodeGeneration => Some(&self.code),
            Stage::ConceptSelection | Stage::Done => None,
        }
    }
}

/// Identifies one entry into a stage; changes on every advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryToken(u64);

impl EntryToken {
    pub fn value(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Generation state of the current stage entry.
///
/// `Idle` and `Failed` allow a trigger; `Complete` makes a trigger return the
/// cached result without calling the provider; `InFlight` rejects a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Idle,
    InFlight,
    Failed,
    Complete,
}

#[derive(Debug)]
struct Generation {
    entry: EntryToken,
    status: GenerationStatus,
    attempts: u32,
    outcome: Option<StreamOutcome>,
}

impl Generation {
    fn new(entry: EntryToken) -> Self {
        Self {
            entry,
            status: GenerationStatus::Idle,
            attempts: 0,
            outcome: None,
        }
    }
}

enum StreamRun {
    Finished { text: String, chunks: usize },
    Abandoned(StreamOutcome),
}

/// Drives the wizard through its stages, one provider call per stage entry
pub struct Pipeline<'a> {
    provider: &'a dyn Provider,
    models: StageModels,
    logger: Arc<Logger>,
    run_id: String,
    stage: Stage,
    session: Session,
    ideas: Vec<GameIdea>,
    generation: Generation,
    started_at: Instant,
}

impl<'a> Pipeline<'a> {
    pub fn new(provider: &'a dyn Provider, models: StageModels, logger: Arc<Logger>) -> Self {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(run_id = %run_id, provider = provider.name(), "Starting pipeline");
        logger.log(&LogEvent::PipelineStarted {
            run_id: run_id.clone(),
        });

        let pipeline = Self {
            provider,
            models,
            logger,
            run_id,
            stage: Stage::ConceptSelection,
            session: Session::new(),
            ideas: Vec::new(),
            generation: Generation::new(EntryToken(1)),
            started_at: Instant::now(),
        };
        pipeline.log_stage_entered();
        pipeline
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Candidate ideas from the most recent successful idea generation
    pub fn ideas(&self) -> &[GameIdea] {
        &self.ideas
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn models(&self) -> &StageModels {
        &self.models
    }

    pub fn entry_token(&self) -> EntryToken {
        self.generation.entry
    }

    pub fn generation_status(&self) -> GenerationStatus {
        self.generation.status
    }

    /// Provider calls made during the current stage entry
    pub fn attempts(&self) -> u32 {
        self.generation.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn select_concept(&mut self, concept: &str) -> Result<(), PipelineError> {
        self.require_stage(Stage::ConceptSelection, "select_concept")?;
        self.session = self
            .session
            .apply(SessionEvent::ConceptSelected(concept.to_string()))?;
        debug!(concept, "Concept selected");
        Ok(())
    }

    /// Ask the provider for three game ideas for the selected concept
    pub async fn generate_ideas(&mut self) -> Result<&[GameIdea], PipelineError> {
        self.require_stage(Stage::IdeaSelection, "generate_ideas")?;
        let model = self.models.ideas.clone();
        if !self.begin_generation(&model)? {
            return Ok(&self.ideas);
        }

        let started = Instant::now();
        let result =
            stages::generate_ideas(self.provider, &self.session.stage_inputs(), &model).await;
        match result {
            Ok(list) => {
                let bytes = serde_json::to_vec(&list).map(|v| v.len()).unwrap_or(0);
                self.ideas = list.ideas;
                self.complete_generation(started, bytes, None, None);
                Ok(&self.ideas)
            }
            Err(e) => Err(self.fail_generation(e)),
        }
    }

    pub fn select_idea(&mut self, id: i64) -> Result<(), PipelineError> {
        self.require_stage(Stage::IdeaSelection, "select_idea")?;
        let idea = self
            .ideas
            .iter()
            .find(|idea| idea.id == id)
            .cloned()
            .ok_or_else(|| PipelineError::InvalidInput(format!("no generated idea with id {}", id)))?;
        debug!(id, title = %idea.title, "Idea selected");
        self.session = self.session.apply(SessionEvent::IdeaSelected(idea))?;
        Ok(())
    }

    /// Ask the provider for five requirement questions about the selected idea
    pub async fn generate_requirements(&mut self) -> Result<&[Question], PipelineError> {
        self.require_stage(Stage::RequirementsGathering, "generate_requirements")?;
        let model = self.models.requirements.clone();
        if !self.begin_generation(&model)? {
            return Ok(self.session.questions());
        }

        let started = Instant::now();
        let result =
            stages::generate_requirements(self.provider, &self.session.stage_inputs(), &model)
                .await;
        let list = match result {
            Ok(list) => list,
            Err(e) => return Err(self.fail_generation(e)),
        };
        let bytes = serde_json::to_vec(&list).map(|v| v.len()).unwrap_or(0);
        match self
            .session
            .apply(SessionEvent::QuestionsGenerated(list.questions))
        {
            Ok(next) => self.session = next,
            Err(e) => return Err(self.fail_generation(e)),
        }
        self.complete_generation(started, bytes, None, None);
        Ok(self.session.questions())
    }

    pub fn record_answer(&mut self, question: &str, option: &str) -> Result<(), PipelineError> {
        self.require_stage(Stage::RequirementsGathering, "record_answer")?;
        self.session = self.session.apply(SessionEvent::AnswerRecorded {
            question: question.to_string(),
            option: option.to_string(),
        })?;
        self.logger.log(&LogEvent::AnswerRecorded {
            question: question.to_string(),
            option: option.to_string(),
            answered: self.session.answers().len(),
            total: self.session.questions().len(),
        });
        Ok(())
    }

    /// Stream the product requirements document.
    ///
    /// Chunks are handed to `on_chunk` as they arrive. The session only
    /// changes once the stream finishes; a cancelled stream leaves it as it
    /// was and the stage can be triggered again.
    pub async fn generate_specification(
        &mut self,
        cancel: CancellationToken,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<StreamOutcome, PipelineError> {
        self.require_stage(Stage::SpecificationReview, "generate_specification")?;
        let model = self.models.specification.clone();
        if !self.begin_generation(&model)? {
            return Ok(self.cached_outcome(self.session.specification()));
        }

        let started = Instant::now();
        let opened = stages::stream_specification(
            self.provider,
            &self.session.stage_inputs(),
            &model,
            cancel,
        )
        .await;
        match self.run_stream(opened, on_chunk).await? {
            StreamRun::Abandoned(outcome) => Ok(outcome),
            StreamRun::Finished { text, chunks } => {
                // The code stage needs at least MIN_SPECIFICATION_LEN characters
                let length = text.chars().count();
                if length < MIN_SPECIFICATION_LEN {
                    return Err(self.fail_generation(PipelineError::SchemaViolation {
                        path: "specification".to_string(),
                        reason: format!(
                            "{} characters, need at least {}",
                            length, MIN_SPECIFICATION_LEN
                        ),
                    }));
                }
                let bytes = text.len();
                match self.session.apply(SessionEvent::SpecificationCompleted(text)) {
                    Ok(next) => self.session = next,
                    Err(e) => return Err(self.fail_generation(e)),
                }
                let outcome = StreamOutcome::completed(chunks, bytes, started.elapsed());
                self.complete_generation(started, bytes, Some(chunks), Some(outcome.clone()));
                Ok(outcome)
            }
        }
    }

    /// Stream the single-file HTML game built from the specification
    pub async fn generate_code(
        &mut self,
        cancel: CancellationToken,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<StreamOutcome, PipelineError> {
        self.require_stage(Stage::CodeGeneration, "generate_code")?;
        let model = self.models.code.clone();
        if !self.begin_generation(&model)? {
            return Ok(self.cached_outcome(self.session.generated_artifact()));
        }

        let started = Instant::now();
        let opened =
            stages::stream_code(self.provider, &self.session.stage_inputs(), &model, cancel).await;
        match self.run_stream(opened, on_chunk).await? {
            StreamRun::Abandoned(outcome) => Ok(outcome),
            StreamRun::Finished { text, chunks } => {
                if !looks_like_html_document(&text) {
                    warn!(bytes = text.len(), "Generated code does not look like a full HTML document");
                }
                let bytes = text.len();
                match self.session.apply(SessionEvent::ArtifactCompleted(text)) {
                    Ok(next) => self.session = next,
                    Err(e) => return Err(self.fail_generation(e)),
                }
                let outcome = StreamOutcome::completed(chunks, bytes, started.elapsed());
                self.complete_generation(started, bytes, Some(chunks), Some(outcome.clone()));
                Ok(outcome)
            }
        }
    }

    /// Whether the current stage's completion condition holds
    pub fn can_advance(&self) -> bool {
        self.unmet_precondition().is_none()
    }

    /// Move to the next stage; fails without side effects if the current one is incomplete
    pub fn advance(&mut self) -> Result<Stage, PipelineError> {
        if let Some(reason) = self.unmet_precondition() {
            return Err(PipelineError::PreconditionNotMet {
                stage: self.stage,
                reason,
            });
        }
        let Some(next) = self.stage.next() else {
            return Err(PipelineError::PreconditionNotMet {
                stage: self.stage,
                reason: "pipeline is complete".to_string(),
            });
        };

        self.stage = next;
        self.generation = Generation::new(self.generation.entry.next());
        self.log_stage_entered();

        if next == Stage::Done {
            let artifact_bytes = self.session.generated_artifact().map_or(0, str::len);
            info!(run_id = %self.run_id, artifact_bytes, "Pipeline complete");
            self.logger.log(&LogEvent::PipelineCompleted {
                run_id: self.run_id.clone(),
                duration_secs: self.elapsed().as_secs_f64(),
                artifact_bytes,
            });
        }
        Ok(next)
    }

    /// Return a generation whose future was dropped mid-call to `Idle`
    pub fn reset_generation(&mut self) {
        if self.generation.status == GenerationStatus::InFlight {
            warn!(stage = %self.stage, "Resetting interrupted generation");
            self.generation.status = GenerationStatus::Idle;
        }
    }

    fn unmet_precondition(&self) -> Option<String> {
        let session = &self.session;
        match self.stage {
            Stage::ConceptSelection => session
                .selected_concept()
                .is_none()
                .then(|| "no concept selected".to_string()),
            Stage::IdeaSelection => session
                .selected_idea()
                .is_none()
                .then(|| "no idea selected".to_string()),
            Stage::RequirementsGathering => {
                if session.questions().is_empty() {
                    Some("requirements have not been generated".to_string())
                } else {
                    session
                        .next_unanswered()
                        .map(|q| format!("unanswered question: {}", q.question))
                }
            }
            Stage::SpecificationReview => session
                .specification()
                .is_none()
                .then(|| "specification has not finished streaming".to_string()),
            Stage::CodeGeneration => session
                .generated_artifact()
                .is_none()
                .then(|| "game code has not finished streaming".to_string()),
            Stage::Done => Some("pipeline is complete".to_string()),
        }
    }

    fn require_stage(&self, expected: Stage, operation: &'static str) -> Result<(), PipelineError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(PipelineError::WrongStage {
                operation,
                stage: self.stage,
            })
        }
    }

    fn agent_label(&self) -> String {
        self.stage.agent_name().unwrap_or("pipeline").to_string()
    }

    /// Returns `false` when this stage entry already has a result
    fn begin_generation(&mut self, model: &str) -> Result<bool, PipelineError> {
        match self.generation.status {
            GenerationStatus::Complete => {
                debug!(stage = %self.stage, entry = self.generation.entry.value(), "Reusing generation");
                self.logger.log(&LogEvent::GenerationDeduplicated {
                    stage: self.agent_label(),
                });
                Ok(false)
            }
            GenerationStatus::InFlight => {
                Err(PipelineError::GenerationInFlight { stage: self.stage })
            }
            GenerationStatus::Idle | GenerationStatus::Failed => {
                self.generation.status = GenerationStatus::InFlight;
                self.generation.attempts += 1;
                self.logger.log(&LogEvent::GenerationStarted {
                    stage: self.agent_label(),
                    model: model.to_string(),
                    attempt: self.generation.attempts,
                });
                Ok(true)
            }
        }
    }

    fn complete_generation(
        &mut self,
        started: Instant,
        bytes: usize,
        chunks: Option<usize>,
        outcome: Option<StreamOutcome>,
    ) {
        self.generation.status = GenerationStatus::Complete;
        self.generation.outcome = outcome;
        self.logger.log(&LogEvent::GenerationCompleted {
            stage: self.agent_label(),
            duration_secs: started.elapsed().as_secs_f64(),
            bytes,
            chunks,
        });
    }

    fn fail_generation(&mut self, err: PipelineError) -> PipelineError {
        self.generation.status = GenerationStatus::Failed;
        warn!(stage = %self.stage, error = %err, "Generation failed");
        self.logger.log(&LogEvent::GenerationFailed {
            stage: self.agent_label(),
            error: err.to_string(),
            retryable: err.is_retryable(),
        });
        err
    }

    fn cached_outcome(&self, text: Option<&str>) -> StreamOutcome {
        self.generation.outcome.clone().unwrap_or_else(|| {
            StreamOutcome::completed(0, text.map_or(0, str::len), Duration::ZERO)
        })
    }

    async fn run_stream(
        &mut self,
        opened: Result<TextStream, PipelineError>,
        on_chunk: Option<ChunkCallback>,
    ) -> Result<StreamRun, PipelineError> {
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail_generation(e)),
        };

        let label = self.agent_label();
        while let Some(chunk) = stream.next_chunk().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => return Err(self.fail_generation(e)),
            };
            self.logger.log(&LogEvent::StreamChunk {
                stage: label.clone(),
                index: stream.chunk_count(),
                len: chunk.len(),
            });
            if let Some(callback) = &on_chunk {
                callback(&chunk);
            }
        }

        if stream.is_abandoned() {
            let outcome =
                StreamOutcome::abandoned(stream.chunk_count(), stream.accumulated().len());
            self.generation.status = GenerationStatus::Idle;
            info!(stage = %self.stage, "Stream abandoned");
            self.logger.log(&LogEvent::StreamAbandoned {
                stage: label,
                discarded_bytes: stream.accumulated().len(),
            });
            return Ok(StreamRun::Abandoned(outcome));
        }

        let chunks = stream.chunk_count();
        match stream.into_text() {
            Some(text) if !text.trim().is_empty() => Ok(StreamRun::Finished { text, chunks }),
            _ => Err(self.fail_generation(PipelineError::EmptyResponse)),
        }
    }

    fn log_stage_entered(&self) {
        self.logger.log(&LogEvent::StageEntered {
            stage: self.stage.title().to_string(),
            number: self.stage.number(),
            entry: self.generation.entry.value(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_models() {
        let models = StageModels::default();
        assert_eq!(models.for_stage(Stage::IdeaSelection), Some("gpt-5-nano"));
        assert_eq!(
            models.for_stage(Stage::RequirementsGathering),
            Some("gpt-4o-mini")
        );
        assert_eq!(models.for_stage(Stage::CodeGeneration), Some("gpt-5-mini"));
        assert_eq!(models.for_stage(Stage::ConceptSelection), None);
    }

    #[test]
    fn test_uniform_models() {
        let models = StageModels::uniform("gpt-4.1");
        for stage in Stage::ALL.into_iter().filter(|s| s.is_generative()) {
            assert_eq!(models.for_stage(stage), Some("gpt-4.1"));
        }
    }

    #[test]
    fn test_entry_tokens_increase() {
        let first = EntryToken(1);
        assert!(first.next() > first);
        assert_eq!(first.next().value(), 2);
    }
}
