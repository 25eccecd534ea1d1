use serde::{Deserialize, Serialize};
use std::fmt;

/// Emotional signal inferred from a single utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Sad,
    Happy,
    #[default]
    Neutral,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Sad => "sad",
            Mood::Happy => "happy",
            Mood::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A role-tagged message. Used for conversation history and LLM context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// What the voice platform speaks back for one turn.
///
/// Wire format: `{"speech": "...", "reprompt": "...", "end_session": false}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub speech: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reprompt: Option<String>,
    #[serde(default)]
    pub end_session: bool,
}

impl Reply {
    /// A reply that keeps the session open with a follow-up prompt.
    pub fn ask(speech: impl Into<String>, reprompt: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            reprompt: Some(reprompt.into()),
            end_session: false,
        }
    }

    /// A reply that closes the session.
    pub fn tell(speech: impl Into<String>) -> Self {
        Self {
            speech: speech.into(),
            reprompt: None,
            end_session: true,
        }
    }
}

/// Truncate text for log output without splitting a character.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push_str("...");
    }
    out
}
