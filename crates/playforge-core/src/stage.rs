use serde::{Deserialize, Serialize};

/// The five wizard steps plus the terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ConceptSelection,
    IdeaSelection,
    RequirementsGathering,
    SpecificationReview,
    CodeGeneration,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::ConceptSelection,
        Stage::IdeaSelection,
        Stage::RequirementsGathering,
        Stage::SpecificationReview,
        Stage::CodeGeneration,
        Stage::Done,
    ];

    /// The following stage; `None` from `Done`
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::ConceptSelection => Some(Stage::IdeaSelection),
            Stage::IdeaSelection => Some(Stage::RequirementsGathering),
            Stage::RequirementsGathering => Some(Stage::SpecificationReview),
            Stage::SpecificationReview => Some(Stage::CodeGeneration),
            Stage::CodeGeneration => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    /// 1-based step number shown to the user
    pub fn number(self) -> u8 {
        match self {
            Stage::ConceptSelection => 1,
            Stage::IdeaSelection => 2,
            Stage::RequirementsGathering => 3,
            Stage::SpecificationReview => 4,
            Stage::CodeGeneration => 5,
            Stage::Done => 6,
        }
    }

    pub fn agent_name(self) -> Option<&'static str> {
        match self {
            Stage::ConceptSelection => Some("Ideas Agent"),
            Stage::IdeaSelection => Some("Planner Agent"),
            Stage::RequirementsGathering => Some("Requirements Agent"),
            Stage::SpecificationReview => Some("Product Manager Agent"),
            Stage::CodeGeneration => Some("Coding Agent"),
            Stage::Done => None,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::ConceptSelection => "Choose an AI/ML Concept",
            Stage::IdeaSelection => "Select a Game Idea",
            Stage::RequirementsGathering => "Game Requirements",
            Stage::SpecificationReview => "Game Specification",
            Stage::CodeGeneration => "Game Creation",
            Stage::Done => "Done",
        }
    }

    /// Whether entering this stage calls the provider
    pub fn is_generative(self) -> bool {
        matches!(
            self,
            Stage::IdeaSelection
                | Stage::RequirementsGathering
                | Stage::SpecificationReview
                | Stage::CodeGeneration
        )
    }

    /// Whether this stage's provider call is streamed
    pub fn is_streamed(self) -> bool {
        matches!(self, Stage::SpecificationReview | Stage::CodeGeneration)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::ConceptSelection => write!(f, "concept selection"),
            Stage::IdeaSelection => write!(f, "idea selection"),
            Stage::RequirementsGathering => write!(f, "requirements gathering"),
            Stage::SpecificationReview => write!(f, "specification review"),
            Stage::CodeGeneration => write!(f, "code generation"),
            Stage::Done => write!(f, "done"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_are_strictly_linear() {
        let mut walked = vec![Stage::ConceptSelection];
        let mut current = Stage::ConceptSelection;
        while let Some(next) = current.next() {
            assert!(next > current);
            assert_eq!(next.number(), current.number() + 1);
            walked.push(next);
            current = next;
        }
        assert_eq!(walked, Stage::ALL.to_vec());
    }

    #[test]
    fn test_stage_metadata() {
        assert_eq!(Stage::IdeaSelection.agent_name(), Some("Planner Agent"));
        assert_eq!(Stage::SpecificationReview.title(), "Game Specification");
        assert_eq!(Stage::Done.agent_name(), None);
        assert!(!Stage::ConceptSelection.is_generative());
        assert!(Stage::CodeGeneration.is_streamed());
        assert!(!Stage::RequirementsGathering.is_streamed());
    }
}
