//! Prompt construction for proposal generation.

use serde::{Deserialize, Serialize};

use super::GenerationError;

const MAX_NAME_CHARS: usize = 100;
const MAX_RELATIONSHIP_CHARS: usize = 200;
const MAX_MEMORIES_CHARS: usize = 2_000;
const MAX_LANGUAGE_CHARS: usize = 40;
const DEFAULT_LANGUAGE: &str = "English";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tone {
    #[default]
    Romantic,
    Poetic,
    Funny,
    Heartfelt,
    Classic,
}

impl Tone {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Romantic => "ROMANTIC",
            Self::Poetic => "POETIC",
            Self::Funny => "FUNNY",
            Self::Heartfelt => "HEARTFELT",
            Self::Classic => "CLASSIC",
        }
    }

    const fn guidance(self) -> &'static str {
        match self {
            Self::Romantic => "warm, intimate and romantic",
            Self::Poetic => "lyrical and poetic, with vivid imagery and gentle rhythm",
            Self::Funny => "playful and lighthearted, with affectionate humour",
            Self::Heartfelt => "sincere and emotional, speaking from the heart",
            Self::Classic => "elegant and timeless, like a traditional love letter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Length {
    Short,
    #[default]
    Medium,
    Long,
}

impl Length {
    const fn word_range(self) -> (u32, u32) {
        match self {
            Self::Short => (50, 100),
            Self::Medium => (120, 200),
            Self::Long => (250, 400),
        }
    }
}

/// User-supplied inputs for a generated proposal.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRequest {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub recipient_name: String,
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub memories: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub length: Length,
}

/// A system instruction plus the user turn sent to a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl ProposalRequest {
    /// Validate the inputs and render the prompt.
    pub fn build_prompt(&self) -> Result<Prompt, GenerationError> {
        let recipient = required("recipientName", &self.recipient_name, MAX_NAME_CHARS)?;
        let sender = optional("senderName", self.sender_name.as_deref(), MAX_NAME_CHARS)?;
        let relationship = optional(
            "relationship",
            self.relationship.as_deref(),
            MAX_RELATIONSHIP_CHARS,
        )?;
        let memories = optional("memories", self.memories.as_deref(), MAX_MEMORIES_CHARS)?;
        let language = optional("language", self.language.as_deref(), MAX_LANGUAGE_CHARS)?
            .unwrap_or(DEFAULT_LANGUAGE);

        let (min_words, max_words) = self.length.word_range();

        let system = format!(
            "You write marriage proposals on behalf of the user. Write in {language}. \
             The tone is {}. Write between {min_words} and {max_words} words. \
             Address the recipient directly, end with the question itself, and \
             return only the proposal text with no title, preamble or notes.",
            self.tone.guidance()
        );

        let mut user = format!("Write a proposal to {recipient}");
        if let Some(sender) = sender {
            user.push_str(&format!(" from {sender}"));
        }
        user.push('.');
        if let Some(relationship) = relationship {
            user.push_str(&format!("\nAbout our relationship: {relationship}"));
        }
        if let Some(memories) = memories {
            user.push_str(&format!("\nMemories we share: {memories}"));
        }

        Ok(Prompt { system, user })
    }
}

fn required<'a>(field: &str, value: &'a str, max: usize) -> Result<&'a str, GenerationError> {
    optional(field, Some(value), max)?
        .ok_or_else(|| GenerationError::InvalidInput(format!("{field} is required")))
}

fn optional<'a>(
    field: &str,
    value: Option<&'a str>,
    max: usize,
) -> Result<Option<&'a str>, GenerationError> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > max {
        return Err(GenerationError::InvalidInput(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(value))
}
