use crate::types::Mood;

/// Static keyword lists, matched as plain substrings of the lower-cased
/// utterance. A keyword inside a longer word still counts.
const SADNESS_KEYWORDS: &[&str] = &[
    "triste",
    "tristeza",
    "deprimid",
    "llor",
    "me siento mal",
    "no me siento bien",
    "me duele",
    "dolor",
    "preocupad",
    "angustia",
    "cansad",
    "desanimad",
    "extraño",
    "falleci",
    "sad",
    "unhappy",
    "depressed",
    "crying",
    "worried",
    "hurts",
    "grief",
];

const JOY_KEYWORDS: &[&str] = &[
    "feliz",
    "contenta",
    "contento",
    "alegr",
    "bien",
    "bonito",
    "maravill",
    "excelente",
    "emocionad",
    "me encanta",
    "happy",
    "glad",
    "great",
    "wonderful",
    "good",
    "love",
];

/// Overlaps partially with the sadness list; both count toward `sad`.
const LONELINESS_KEYWORDS: &[&str] = &[
    "sola",
    "soledad",
    "me siento solo",
    "nadie me",
    "aislad",
    "abandonad",
    "extraño",
    "lonely",
    "alone",
    "nobody",
    "miss ",
];

/// Keyword hit counts for one utterance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoodScores {
    pub sadness: usize,
    pub joy: usize,
    pub loneliness: usize,
}

impl MoodScores {
    /// Sadness and loneliness take precedence over joy.
    pub fn mood(&self) -> Mood {
        if self.sadness > 0 || self.loneliness > 0 {
            Mood::Sad
        } else if self.joy > 0 {
            Mood::Happy
        } else {
            Mood::Neutral
        }
    }
}

/// Count keyword hits in each list.
pub fn score(text: &str) -> MoodScores {
    let lower = text.to_lowercase();
    let hits = |keywords: &[&str]| keywords.iter().filter(|kw| lower.contains(**kw)).count();

    MoodScores {
        sadness: hits(SADNESS_KEYWORDS),
        joy: hits(JOY_KEYWORDS),
        loneliness: hits(LONELINESS_KEYWORDS),
    }
}

/// Classify an utterance as sad, happy or neutral.
pub fn classify(text: &str) -> Mood {
    score(text).mood()
}
