//! The wizard's accumulated artifacts.
//!
//! A [`Session`] is a plain value. Every change goes through
//! [`Session::apply`], which checks the event against what is already
//! recorded and returns the next value, leaving the receiver untouched.
//! A rejected event therefore never leaves a half-updated session behind.

use serde::Serialize;
use std::collections::BTreeMap;

use playforge_prompts::{GameIdea, Question, StageInputs, OPTION_COUNT, QUESTION_COUNT};

use crate::PipelineError;

/// Everything the user and the provider have produced so far
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Session {
    selected_concept: Option<String>,
    selected_idea: Option<GameIdea>,
    questions: Vec<Question>,
    /// Question text to chosen option
    answers: BTreeMap<String, String>,
    specification: Option<String>,
    generated_artifact: Option<String>,
}

/// A single change to a [`Session`]
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ConceptSelected(String),
    IdeaSelected(GameIdea),
    /// Replaces any earlier question set and clears its answers
    QuestionsGenerated(Vec<Question>),
    AnswerRecorded {
        question: String,
        option: String,
    },
    SpecificationCompleted(String),
    ArtifactCompleted(String),
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_concept(&self) -> Option<&str> {
        self.selected_concept.as_deref()
    }

    pub fn selected_idea(&self) -> Option<&GameIdea> {
        self.selected_idea.as_ref()
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub fn answer_for(&self, question: &str) -> Option<&str> {
        self.answers.get(question).map(String::as_str)
    }

    pub fn specification(&self) -> Option<&str> {
        self.specification.as_deref()
    }

    pub fn generated_artifact(&self) -> Option<&str> {
        self.generated_artifact.as_deref()
    }

    /// True once every generated question has an answer
    pub fn all_questions_answered(&self) -> bool {
        !self.questions.is_empty()
            && self
                .questions
                .iter()
                .all(|q| self.answers.contains_key(&q.question))
    }

    /// First question in generation order still missing an answer
    pub fn next_unanswered(&self) -> Option<&Question> {
        self.questions
            .iter()
            .find(|q| !self.answers.contains_key(&q.question))
    }

    /// Borrowed view of the artifacts the prompt builders consume.
    ///
    /// Answers are listed in question order, not map order.
    pub fn stage_inputs(&self) -> StageInputs<'_> {
        StageInputs {
            concept: self.selected_concept(),
            idea: self.selected_idea(),
            answers: self
                .questions
                .iter()
                .filter_map(|q| {
                    self.answers
                        .get(&q.question)
                        .map(|a| (q.question.as_str(), a.as_str()))
                })
                .collect(),
            specification: self.specification(),
        }
    }

    /// Validate `event` against the current session and return the next one
    pub fn apply(&self, event: SessionEvent) -> Result<Session, PipelineError> {
        let mut next = self.clone();
        match event {
            SessionEvent::ConceptSelected(concept) => {
                let concept = concept.trim();
                if concept.is_empty() {
                    return Err(PipelineError::InvalidInput(
                        "concept must not be empty".to_string(),
                    ));
                }
                next.selected_concept = Some(concept.to_string());
            }
            SessionEvent::IdeaSelected(idea) => {
                if self.selected_concept.is_none() {
                    return Err(PipelineError::InvalidInput(
                        "an idea cannot be selected before a concept".to_string(),
                    ));
                }
                next.selected_idea = Some(idea);
            }
            SessionEvent::QuestionsGenerated(questions) => {
                check_questions(&questions)?;
                next.questions = questions;
                next.answers.clear();
            }
            SessionEvent::AnswerRecorded { question, option } => {
                let Some(known) = self.questions.iter().find(|q| q.question == question) else {
                    return Err(PipelineError::InvalidInput(format!(
                        "unknown question: {}",
                        question
                    )));
                };
                if !known.has_option(&option) {
                    return Err(PipelineError::InvalidInput(format!(
                        "'{}' is not an option for: {}",
                        option, question
                    )));
                }
                next.answers.insert(question, option);
            }
            SessionEvent::SpecificationCompleted(text) => {
                if !self.all_questions_answered() {
                    return Err(PipelineError::InvalidInput(
                        "specification requires every question to be answered".to_string(),
                    ));
                }
                next.specification = Some(text);
            }
            SessionEvent::ArtifactCompleted(code) => {
                if self.specification.is_none() {
                    return Err(PipelineError::InvalidInput(
                        "code requires a completed specification".to_string(),
                    ));
                }
                next.generated_artifact = Some(code);
            }
        }
        Ok(next)
    }
}

/// Shape rules the schema cannot express on its own
fn check_questions(questions: &[Question]) -> Result<(), PipelineError> {
    if questions.len() != QUESTION_COUNT {
        return Err(PipelineError::SchemaViolation {
            path: "$.questions".to_string(),
            reason: format!(
                "expected exactly {} items, found {}",
                QUESTION_COUNT,
                questions.len()
            ),
        });
    }
    for (i, question) in questions.iter().enumerate() {
        if question.options.len() != OPTION_COUNT {
            return Err(PipelineError::SchemaViolation {
                path: format!("$.questions[{}].options", i),
                reason: format!(
                    "expected exactly {} items, found {}",
                    OPTION_COUNT,
                    question.options.len()
                ),
            });
        }
        // Answers are keyed by question text
        if questions[..i].iter().any(|q| q.question == question.question) {
            return Err(PipelineError::SchemaViolation {
                path: format!("$.questions[{}].question", i),
                reason: "duplicate question text".to_string(),
            });
        }
    }
    Ok(())
}
