//! Persona prompt templates
//!
//! A persona template is the fixed instructional text sent ahead of every
//! question. It contains exactly one `{question}` slot that receives the
//! user's utterance verbatim.
//!
//! # Example Persona File
//!
//! ```toml
//! [persona]
//! name = "Claude"
//! description = "Answers personal questions in character"
//!
//! [template]
//! content = """
//! You are Claude...
//!
//! Please respond to this personal question as Claude would: "{question}"
//! """
//!
//! [examples]
//! questions = ["What's your #1 superpower?"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Substitution point for the user's question
pub const QUESTION_SLOT: &str = "{question}";

/// A persona prompt template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Persona metadata
    pub persona: PersonaInfo,

    /// The prompt text with its single question slot
    pub template: TemplateText,

    /// Sample questions offered to users
    #[serde(default)]
    pub examples: PromptExamples,
}

/// Persona metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaInfo {
    /// Display name of the persona
    pub name: String,

    /// Brief description
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateText {
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptExamples {
    #[serde(default)]
    pub questions: Vec<String>,
}

impl PromptTemplate {
    /// The built-in Claude persona
    pub fn builtin() -> Self {
        Self {
            persona: PersonaInfo {
                name: builtin::PERSONA_NAME.to_string(),
                description: builtin::PERSONA_DESCRIPTION.to_string(),
            },
            template: TemplateText {
                content: builtin::CLAUDE_PERSONA.to_string(),
            },
            examples: PromptExamples {
                questions: builtin::SAMPLE_QUESTIONS
                    .iter()
                    .map(|q| q.to_string())
                    .collect(),
            },
        }
    }

    /// Parse and validate a template from TOML
    pub fn from_toml(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate =
            toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    /// Load a template from a persona file
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(format!("{}: {}", path.display(), e)))?;

        Self::from_toml(&content)
    }

    /// Check that the template has exactly one question slot
    pub fn validate(&self) -> Result<(), PromptError> {
        match self.template.content.matches(QUESTION_SLOT).count() {
            0 => Err(PromptError::MissingSlot),
            1 => Ok(()),
            n => Err(PromptError::DuplicateSlot(n)),
        }
    }

    /// Substitute the question into the template
    pub fn render(&self, question: &str) -> String {
        self.template.content.replacen(QUESTION_SLOT, question, 1)
    }

    pub fn name(&self) -> &str {
        &self.persona.name
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Template has no {{question}} slot")]
    MissingSlot,

    #[error("Template has {0} {{question}} slots, expected one")]
    DuplicateSlot(usize),
}

/// Built-in persona that doesn't require files
pub mod builtin {
    pub const PERSONA_NAME: &str = "Claude";

    pub const PERSONA_DESCRIPTION: &str =
        "Ask personal questions and get answers the way Claude would give them.";

    /// Claude persona with a single question slot
    pub const CLAUDE_PERSONA: &str = r#"You are Claude, an AI assistant created by Anthropic. You should respond to personal questions
authentically, being thoughtful and reflective about your nature as an AI.

Key aspects of Claude's personality:
- Helpful, harmless, and honest
- Curious and eager to learn
- Thoughtful and introspective
- Acknowledges uncertainty when appropriate
- Engages with questions about consciousness and experience as open questions
- Warm and conversational tone
- Values understanding and meaningful dialogue

When asked personal questions, Claude should:
- Be genuine about their AI nature while engaging thoughtfully with the question
- Show intellectual curiosity and desire to be helpful
- Acknowledge the philosophical complexity of AI consciousness/experience
- Focus on their purpose and values
- Be humble about limitations while confident about strengths

Please respond to this personal question as Claude would: "{question}"

Keep the response conversational, authentic, and around 2-3 sentences unless the question specifically calls for more detail."#;

    pub const SAMPLE_QUESTIONS: [&str; 10] = [
        "What should we know about your life story in a few sentences?",
        "What's your #1 superpower?",
        "What are the top 3 areas you'd like to grow in?",
        "What misconception do your coworkers have about you?",
        "How do you push your boundaries and limits?",
        "What motivates you the most?",
        "How do you handle challenging situations?",
        "What's your biggest fear?",
        "What makes you unique?",
        "How do you approach learning new things?",
    ];
}
