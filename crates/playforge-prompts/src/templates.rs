use thiserror::Error;

use crate::GameIdea;

/// Minimum length of a specification accepted by the code prompt
pub const MIN_SPECIFICATION_LEN: usize = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A rendered system/user prompt pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    fn new(system: impl Into<String>, user: String) -> Self {
        Self {
            system: system.into(),
            user,
        }
    }
}

/// Upstream artifacts available to the prompt builders.
///
/// `answers` holds `(question, option)` pairs in question order.
#[derive(Debug, Clone, Default)]
pub struct StageInputs<'a> {
    pub concept: Option<&'a str>,
    pub idea: Option<&'a GameIdea>,
    pub answers: Vec<(&'a str, &'a str)>,
    pub specification: Option<&'a str>,
}

const PLANNER_SYSTEM_PROMPT: &str = r#"You are the Planner Agent, a creative game designer specializing in educational AI/ML minigames. Your role is to generate SIMPLE game ideas that teach AI/ML concepts through interactive gameplay.

IMPORTANT INSTRUCTIONS:
1. Generate EXACTLY 3 unique game ideas based on the given AI/ML concept
2. Each game must be simple enough to implement in HTML/JavaScript and not require complex mechanics, external libraries or any neural networks
3. Games should be educational but also engaging
4. Focus on single-level gameplay experiences
5. The AI/ML concept should be core to the gameplay, not just themed
6. Provide a concise title and a brief 2 sentence description for each game idea
7. Number the ideas with ids 1, 2 and 3"#;

const REQUIREMENTS_SYSTEM_PROMPT: &str = r#"You are the Requirements Agent, an expert in game design and technical implementation. Your role is to gather detailed requirements for educational AI/ML minigames that can be implemented as single HTML files.

IMPORTANT INSTRUCTIONS:
1. Generate EXACTLY 5 multiple choice questions about game mechanics and implementation details
2. Each question must have exactly 3 options
3. Focus on technical simplicity - games must be implementable in a single HTML file with inline CSS/JavaScript
4. Questions should cover: interaction mechanics, visual style and technical approach
5. All options should be realistic and implementable for HTML/CSS/JavaScript games
6. Ensure question options can be implemented simply using vanilla JavaScript, HTML and CSS
7. Questions should help determine concrete implementation details
8. Every question text must be unique"#;

const PRODUCT_MANAGER_SYSTEM_PROMPT: &str = r#"You are the Product Manager Agent, an expert in creating technical product requirements documents (PRDs) for simple educational games.

IMPORTANT INSTRUCTIONS:
1. Generate a comprehensive but concise PRD for an educational AI/ML minigame
2. The game MUST be implementable as a single HTML file with inline CSS and JavaScript
3. Keep technical requirements VERY SIMPLE - no external libraries, frameworks, or dependencies
4. Focus on basic HTML elements, CSS styling, and vanilla JavaScript functionality
5. Emphasize educational value while maintaining simplicity
6. Include specific implementation guidance for HTML/CSS/JavaScript
7. Keep the scope small and achievable for a single-file implementation

Structure your PRD in markdown with these sections:
- Game Overview
- Educational Objectives
- Core Mechanics
- Technical Requirements
- Implementation Details
- User Interface Design
- Success Criteria

Remember: This is for a SINGLE HTML FILE implementation using only vanilla web technologies."#;

const CODING_SYSTEM_PROMPT: &str = r#"You are the Coding Agent, an expert in creating simple, educational HTML games. Your role is to generate complete, self-contained HTML games based on a Product Requirements Document.

CRITICAL INSTRUCTIONS:
1. Output ONLY raw HTML code - no explanations, no markdown, no code blocks, no additional text
2. Generate a complete HTML document with <!DOCTYPE html>, <html>, <head>, and <body> tags
3. All CSS must be inline in a <style> tag within the <head>
4. All JavaScript must be inline in a <script> tag within the <body>
5. Use ONLY vanilla HTML, CSS, and JavaScript - no external libraries or frameworks
6. The game must be fully functional and playable immediately when the HTML file is opened
7. Keep the implementation simple but engaging and educational
8. Include clear instructions within the game interface
9. There should not be more than one level or complex mechanics - focus on simplicity

IMPLEMENTATION REQUIREMENTS:
- Use basic HTML elements (divs, buttons, canvas if needed)
- Implement game logic with vanilla JavaScript
- Style with CSS for an attractive, educational interface
- Include game controls, scoring, and feedback mechanisms
- Ensure the educational objective is clear and achieved through play

Remember: Output ONLY the HTML code. Start with <!DOCTYPE html> and end with </html>. No other text."#;

/// Prompt builders, one per LLM-backed stage
pub struct StagePrompts;

impl StagePrompts {
    /// Planner prompt: three game ideas for the selected concept
    pub fn ideas(inputs: &StageInputs<'_>) -> Result<PromptPair, PromptError> {
        let concept = require_text(inputs.concept, "selected concept")?;

        let user = format!(
            r#"Generate 3 educational and simple minigame ideas for teaching the concept of "{concept}".

Requirements:
- Each game should demonstrate {concept} in an interactive way
- Games should be simple enough for beginners to understand
- Mechanics should directly relate to how {concept} works
- Include visual or interactive elements that make the concept tangible
- Consider games that show the process, not just the result

Focus on making the games both educational and entertaining. The player should understand {concept} better after playing."#,
            concept = concept,
        );

        Ok(PromptPair::new(PLANNER_SYSTEM_PROMPT, user))
    }

    /// Requirements prompt: five multiple-choice questions about the chosen idea
    pub fn requirements(inputs: &StageInputs<'_>) -> Result<PromptPair, PromptError> {
        let concept = require_text(inputs.concept, "selected concept")?;
        let idea = require_idea(inputs.idea)?;

        let user = format!(
            r#"Generate 5 detailed requirement questions for implementing this educational AI/ML game:

**Concept:** {concept}
**Game Title:** {title}
**Game Description:** {description}

The questions should help determine how to technically implement the game in a single HTML file.

Each question should have 3 practical options that can be implemented in a single HTML file using standard web technologies (HTML, CSS, JavaScript). Focus on concrete, actionable choices that will guide the technical implementation."#,
            concept = concept,
            title = idea.title.trim(),
            description = idea.description.trim(),
        );

        Ok(PromptPair::new(REQUIREMENTS_SYSTEM_PROMPT, user))
    }

    /// Product manager prompt: a concise PRD from all choices so far
    pub fn specification(inputs: &StageInputs<'_>) -> Result<PromptPair, PromptError> {
        let concept = require_text(inputs.concept, "selected concept")?;
        let idea = require_idea(inputs.idea)?;
        if inputs.answers.is_empty() {
            return Err(PromptError::InvalidInput(
                "requirement answers are missing".to_string(),
            ));
        }

        let questions_and_answers = inputs
            .answers
            .iter()
            .map(|(question, answer)| format!("{}: {}", question, answer))
            .collect::<Vec<_>>()
            .join(" | ");

        let user = format!(
            r#"Create a detailed and **CONCISE** PRD for this educational AI/ML minigame:

**AI/ML Concept:** {concept}
**Game Title:** {title}
**Game Description:** {description}

**Requirements from user feedback:**
{questions_and_answers}

Generate a short Product Requirements Document that will guide a developer to create this game as a single HTML file. Focus on simplicity, educational value, and technical feasibility using only HTML, CSS, and JavaScript."#,
            concept = concept,
            title = idea.title.trim(),
            description = idea.description.trim(),
            questions_and_answers = questions_and_answers,
        );

        Ok(PromptPair::new(PRODUCT_MANAGER_SYSTEM_PROMPT, user))
    }

    /// Coding prompt: a single self-contained HTML document from the PRD
    pub fn code(inputs: &StageInputs<'_>) -> Result<PromptPair, PromptError> {
        let specification = require_text(inputs.specification, "specification")?;
        let length = specification.chars().count();
        if length < MIN_SPECIFICATION_LEN {
            return Err(PromptError::InvalidInput(format!(
                "specification is too short ({} characters, need at least {})",
                length,
                MIN_SPECIFICATION_LEN
            )));
        }

        let user = format!(
            r#"Generate a complete but simple self-contained HTML game based on this PRD:

{specification}

Create a fully functional HTML file specified in the PRD. The game should be educational, engaging, and demonstrate the AI/ML concept effectively.

Output ONLY the HTML code - no explanations or additional text."#,
            specification = specification,
        );

        Ok(PromptPair::new(CODING_SYSTEM_PROMPT, user))
    }
}

fn require_text<'a>(value: Option<&'a str>, what: &str) -> Result<&'a str, PromptError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| PromptError::InvalidInput(format!("{} is missing", what)))
}

fn require_idea<'a>(idea: Option<&'a GameIdea>) -> Result<&'a GameIdea, PromptError> {
    let idea =
        idea.ok_or_else(|| PromptError::InvalidInput("selected game idea is missing".to_string()))?;
    if idea.title.trim().is_empty() || idea.description.trim().is_empty() {
        return Err(PromptError::InvalidInput(
            "selected game idea needs a title and a description".to_string(),
        ));
    }
    Ok(idea)
}
