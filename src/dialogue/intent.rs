use std::fmt;
use std::str::FromStr;

/// The kind of request a turn carries, as tagged by the voice platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Launch,
    ProvideName,
    PositiveResponse,
    NegativeResponse,
    Conversation,
    ClearMemory,
    Help,
    Stop,
    SessionEnded,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown intent '{0}'")]
pub struct UnknownIntent(pub String);

impl Intent {
    /// Canonical platform name.
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Launch => "LaunchRequest",
            Intent::ProvideName => "ProvideNameIntent",
            Intent::PositiveResponse => "PositiveResponseIntent",
            Intent::NegativeResponse => "NegativeResponseIntent",
            Intent::Conversation => "ConversationIntent",
            Intent::ClearMemory => "ClearMemoryIntent",
            Intent::Help => "AMAZON.HelpIntent",
            Intent::Stop => "AMAZON.StopIntent",
            Intent::SessionEnded => "SessionEndedRequest",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let intent = match s.trim() {
            "LaunchRequest" => Intent::Launch,
            "ProvideNameIntent" => Intent::ProvideName,
            "PositiveResponseIntent" => Intent::PositiveResponse,
            "NegativeResponseIntent" => Intent::NegativeResponse,
            "ConversationIntent" | "AMAZON.FallbackIntent" => Intent::Conversation,
            "ClearMemoryIntent" => Intent::ClearMemory,
            "AMAZON.HelpIntent" => Intent::Help,
            "AMAZON.CancelIntent" | "AMAZON.StopIntent" => Intent::Stop,
            "SessionEndedRequest" => Intent::SessionEnded,
            other => return Err(UnknownIntent(other.to_string())),
        };
        Ok(intent)
    }
}
