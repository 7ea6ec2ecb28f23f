mod schema;
mod templates;
mod types;

pub use schema::{parse_structured, Field, Shape, StructuredOutput, ValidationError};
pub use templates::{PromptError, PromptPair, StageInputs, StagePrompts, MIN_SPECIFICATION_LEN};
pub use types::{GameIdea, IdeaList, Question, QuestionList, IDEA_COUNT, OPTION_COUNT, QUESTION_COUNT};
