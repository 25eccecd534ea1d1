use std::sync::Arc;

use crate::phrases::{PhrasePicker, choose};
use crate::types::Mood;

/// If any of these already appear, the reply acknowledges the sadness.
const AFFECT_WORDS: &[&str] = &[
    "triste",
    "preocup",
    "lamento",
    "lo siento",
    "pena",
    "sad",
    "worried",
    "sorry",
];

const SAD_LEAD_INS: &[&str] = &[
    "Ay, te entiendo. ",
    "Aquí estoy contigo. ",
    "Me quedo aquí a tu lado. ",
];

/// Exclamations or cheerful phrases that make a lead-in redundant.
const POSITIVE_MARKERS: &[&str] = &[
    "!",
    "¡",
    "qué bien",
    "qué alegría",
    "me alegra",
    "great",
    "wonderful",
];

const HAPPY_LEAD_IN: &str = "¡Qué alegría! ";

/// Prepends a short empathetic lead-in to a generated reply when the
/// user's mood calls for it and the reply doesn't already carry one.
#[derive(Clone)]
pub struct EmpathyFilter {
    picker: Arc<dyn PhrasePicker>,
}

impl EmpathyFilter {
    pub fn new(picker: Arc<dyn PhrasePicker>) -> Self {
        Self { picker }
    }

    pub fn apply(&self, response: &str, mood: Mood) -> String {
        let lower = response.to_lowercase();
        match mood {
            Mood::Sad if !contains_any(&lower, AFFECT_WORDS) => {
                let lead_in = choose(self.picker.as_ref(), SAD_LEAD_INS)
                    .copied()
                    .unwrap_or_default();
                format!("{lead_in}{response}")
            }
            Mood::Happy if !contains_any(&lower, POSITIVE_MARKERS) => {
                format!("{HAPPY_LEAD_IN}{response}")
            }
            _ => response.to_string(),
        }
    }
}

fn contains_any(lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| lower.contains(*n))
}
