use serde::{Deserialize, Serialize};

use crate::{Field, Shape, StructuredOutput};

/// Number of ideas the planner must return
pub const IDEA_COUNT: usize = 3;
/// Number of requirement questions
pub const QUESTION_COUNT: usize = 5;
/// Number of options per question
pub const OPTION_COUNT: usize = 3;

/// A candidate minigame proposed by the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameIdea {
    pub id: i64,
    pub title: String,
    pub description: String,
}

/// A multiple-choice requirement question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub question: String,
    pub options: Vec<String>,
}

impl Question {
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// Structured payload of the idea-generation stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdeaList {
    pub ideas: Vec<GameIdea>,
}

/// Structured payload of the requirements stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionList {
    pub questions: Vec<Question>,
}

impl StructuredOutput for IdeaList {
    const NAME: &'static str = "Ideas";

    fn shape() -> Shape {
        Shape::object(vec![Field::new(
            "ideas",
            Shape::array(
                Shape::object(vec![
                    Field::new("id", Shape::Integer),
                    Field::new("title", Shape::String),
                    Field::new("description", Shape::String),
                ]),
                IDEA_COUNT,
            ),
        )])
    }
}

impl StructuredOutput for QuestionList {
    const NAME: &'static str = "Requirements";

    fn shape() -> Shape {
        Shape::object(vec![Field::new(
            "questions",
            Shape::array(
                Shape::object(vec![
                    Field::new("id", Shape::Integer),
                    Field::new("question", Shape::String),
                    Field::new("options", Shape::array(Shape::String, OPTION_COUNT)),
                ]),
                QUESTION_COUNT,
            ),
        )])
    }
}
