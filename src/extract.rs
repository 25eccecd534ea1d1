use tracing::debug;

use crate::store::UserProfile;

/// Introductions, tried in order. The first one that captures a plausible
/// name wins.
const NAME_PATTERNS: &[&str] = &[
    "my name is ",
    "me llamo ",
    "mi nombre es ",
    "call me ",
    "llámame ",
    "llamame ",
    "i'm ",
    "i am ",
    "soy ",
];

/// Words that follow "soy"/"I'm" without being a name.
const NOT_A_NAME: &[&str] = &[
    "a", "an", "the", "not", "so", "very", "just", "here", "fine", "okay", "ok", "sorry",
    "tired", "going", "back", "still", "also", "really", "doing", "feeling", "from", "sad",
    "happy", "lonely", "good", "great", "worried", "un", "una", "el", "la", "los", "las", "de",
    "del", "en", "con", "como", "muy", "yo", "tu", "su", "mi", "que", "aquí", "nuevo", "nueva",
    "mayor", "viuda", "viudo", "abuela", "abuelo", "jubilada", "jubilado", "bastante", "algo",
    "otra", "otro", "triste", "feliz", "contenta", "contento", "alegre", "cansada", "cansado",
    "sola", "solo", "bien", "mal", "preocupada", "preocupado", "enferma", "enfermo",
];

const FAMILY_KEYWORDS: &[&str] = &[
    "hijo", "hija", "nieto", "nieta", "bisnieto", "bisnieta", "esposo", "esposa", "marido",
    "hermano", "hermana", "mamá", "papá", "madre", "padre", "sobrino", "sobrina", "yerno",
    "nuera", "daughter", "grandson", "granddaughter", "grandchild", "husband", "wife",
    "brother", "sister", "mother", "father",
];

const INTEREST_KEYWORDS: &[&str] = &[
    "jardín", "jardinería", "plantas", "flores", "cocina", "cocinar", "recetas", "música",
    "cantar", "bailar", "baile", "leer", "libros", "novelas", "tejer", "costura", "fútbol",
    "béisbol", "iglesia", "misa", "caminar", "pintar", "telenovelas", "crucigramas", "garden",
    "gardening", "cooking", "music", "reading", "books", "knitting", "walking", "painting",
    "church", "soccer", "baseball",
];

/// What one utterance taught us about the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub name: Option<String>,
    pub new_family: Vec<String>,
    pub new_interests: Vec<String>,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.new_family.is_empty() && self.new_interests.is_empty()
    }
}

/// Scan an utterance for a name, family mentions and interests and merge
/// them into the profile. A found name overwrites the previous one; family
/// and interest keywords are only added when not already known.
pub fn extract_into(text: &str, profile: &mut UserProfile) -> Extracted {
    let mut found = Extracted::default();
    if text.trim().is_empty() {
        return found;
    }

    let lower = text.to_lowercase();

    if let Some(name) = extract_name(&lower) {
        profile.user_name = Some(name.clone());
        found.name = Some(name);
    }

    for keyword in matching_keywords(&lower, FAMILY_KEYWORDS) {
        if profile.family_mentioned.insert(keyword.to_string()) {
            found.new_family.push(keyword.to_string());
        }
    }

    for keyword in matching_keywords(&lower, INTEREST_KEYWORDS) {
        if profile.interests.insert(keyword.to_string()) {
            found.new_interests.push(keyword.to_string());
        }
    }

    if !found.is_empty() {
        debug!(
            name = ?found.name,
            family = ?found.new_family,
            interests = ?found.new_interests,
            "extracted user facts"
        );
    }

    found
}

/// Apply the introduction patterns to lower-cased text.
pub fn extract_name(lower: &str) -> Option<String> {
    NAME_PATTERNS
        .iter()
        .find_map(|pattern| capture_after(lower, pattern))
}

/// A bare name answer such as "Rosa" or "pues Rosa": the last word, when
/// it looks like a name.
pub fn bare_name(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let word = lower
        .split(|c: char| !is_name_char(c))
        .filter(|w| !w.is_empty())
        .last()?;
    plausible_name(word).then(|| capitalize(word))
}

fn capture_after(lower: &str, pattern: &str) -> Option<String> {
    for (pos, _) in lower.match_indices(pattern) {
        let at_word_start = lower[..pos]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        if !at_word_start {
            continue;
        }

        let rest = lower[pos + pattern.len()..].trim_start();
        let word: String = rest.chars().take_while(|c| is_name_char(*c)).collect();
        if plausible_name(&word) {
            return Some(capitalize(&word));
        }
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_alphabetic() || c == '-' || c == '\''
}

fn plausible_name(word: &str) -> bool {
    let word = word.trim_matches(|c| c == '-' || c == '\'');
    word.chars().count() >= 2
        && !NOT_A_NAME.contains(&word)
        && !FAMILY_KEYWORDS.contains(&word)
}

fn capitalize(word: &str) -> String {
    let word = word.trim_matches(|c| c == '-' || c == '\'');
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Keywords present as whole words, allowing a plural `s`/`es` suffix.
fn matching_keywords<'a>(lower: &str, keywords: &'a [&'a str]) -> Vec<&'a str> {
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    keywords
        .iter()
        .copied()
        .filter(|kw| {
            words.iter().any(|w| {
                *w == *kw
                    || w.strip_prefix(*kw)
                        .is_some_and(|suffix| suffix == "s" || suffix == "es")
            })
        })
        .collect()
}
