use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::types::{ChatMessage, Mood};

/// The complete per-user conversational state handed to a turn.
///
/// Every field is always populated. Records read from the backend pass
/// through [`ProfileRecord::ensure_integrity`] before they become a
/// `UserProfile`, so a partially-shaped profile cannot exist.
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub user_name: Option<String>,
    pub interaction_count: u64,
    pub last_interaction_at: DateTime<Utc>,
    pub conversation_history: Vec<ChatMessage>,
    pub emotional_history: Vec<Mood>,
    pub family_mentioned: BTreeSet<String>,
    pub interests: BTreeSet<String>,
    pub last_question_asked: Option<String>,
    pub user_mood: Mood,
}

impl UserProfile {
    /// A fresh profile for a user we have never seen.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            user_name: None,
            interaction_count: 0,
            last_interaction_at: now,
            conversation_history: Vec::new(),
            emotional_history: Vec::new(),
            family_mentioned: BTreeSet::new(),
            interests: BTreeSet::new(),
            last_question_asked: None,
            user_mood: Mood::Neutral,
        }
    }

    /// A fresh profile that keeps only identity facts: name, family, interests.
    pub fn retained(&self, now: DateTime<Utc>) -> Self {
        Self {
            user_name: self.user_name.clone(),
            family_mentioned: self.family_mentioned.clone(),
            interests: self.interests.clone(),
            ..Self::new(now)
        }
    }

    /// Most recent mood, `neutral` when nothing has been recorded yet.
    pub fn recent_mood(&self) -> Mood {
        self.emotional_history.last().copied().unwrap_or_default()
    }

    pub fn record_mood(&mut self, mood: Mood) {
        self.emotional_history.push(mood);
        self.user_mood = mood;
    }

    /// Append one user/assistant exchange to the conversation history.
    pub fn push_exchange(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.conversation_history.push(ChatMessage::user(user));
        self.conversation_history.push(ChatMessage::assistant(assistant));
    }

    pub fn is_expired(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_interaction_at) > window
    }

    /// Keep only the newest entries of both histories, in original order.
    pub fn truncate_histories(&mut self, conversation_cap: usize, emotional_cap: usize) {
        keep_newest(&mut self.conversation_history, conversation_cap);
        keep_newest(&mut self.emotional_history, emotional_cap);
    }

    /// Serialize to the persisted record shape.
    pub fn to_record(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(ProfileRecord::from(self.clone()))
    }
}

fn keep_newest<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let drain_count = items.len() - cap;
        items.drain(..drain_count);
    }
}

/// The persisted shape of a profile. Any field may be void.
///
/// Decoding is lenient per field: a missing key, a `null`, or a value of
/// the wrong type leaves that one field as `None` instead of rejecting
/// the whole record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub user_name: Option<String>,
    pub interaction_count: Option<u64>,
    #[serde(rename = "last_interaction")]
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub conversation_history: Option<Vec<ChatMessage>>,
    pub emotional_history: Option<Vec<Mood>>,
    pub family_mentioned: Option<BTreeSet<String>>,
    pub interests: Option<BTreeSet<String>>,
    pub last_question_asked: Option<String>,
    pub user_mood: Option<Mood>,
}

impl ProfileRecord {
    /// Decode a stored JSON value. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        Self {
            user_name: obj.get("user_name").and_then(non_empty_str),
            interaction_count: obj.get("interaction_count").and_then(Value::as_u64),
            last_interaction_at: obj.get("last_interaction").and_then(parse_timestamp),
            conversation_history: obj.get("conversation_history").and_then(|v| lenient_list(v)),
            emotional_history: obj.get("emotional_history").and_then(|v| lenient_list(v)),
            family_mentioned: obj
                .get("family_mentioned")
                .and_then(|v| lenient_list::<String>(v))
                .map(|items| items.into_iter().collect()),
            interests: obj
                .get("interests")
                .and_then(|v| lenient_list::<String>(v))
                .map(|items| items.into_iter().collect()),
            last_question_asked: obj.get("last_question_asked").and_then(non_empty_str),
            user_mood: obj
                .get("user_mood")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }

    /// Backfill every void field with its default. Idempotent.
    ///
    /// A missing `user_mood` is derived from the tail of the emotional
    /// history so the two never disagree after healing.
    pub fn ensure_integrity(self, now: DateTime<Utc>) -> UserProfile {
        let emotional_history = self.emotional_history.unwrap_or_default();
        let user_mood = self
            .user_mood
            .unwrap_or_else(|| emotional_history.last().copied().unwrap_or_default());

        UserProfile {
            user_name: self.user_name.filter(|n| !n.trim().is_empty()),
            interaction_count: self.interaction_count.unwrap_or(0),
            last_interaction_at: self.last_interaction_at.unwrap_or(now),
            conversation_history: self.conversation_history.unwrap_or_default(),
            emotional_history,
            family_mentioned: self.family_mentioned.unwrap_or_default(),
            interests: self.interests.unwrap_or_default(),
            last_question_asked: self.last_question_asked.filter(|q| !q.trim().is_empty()),
            user_mood,
        }
    }
}

impl From<UserProfile> for ProfileRecord {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_name: profile.user_name,
            interaction_count: Some(profile.interaction_count),
            last_interaction_at: Some(profile.last_interaction_at),
            conversation_history: Some(profile.conversation_history),
            emotional_history: Some(profile.emotional_history),
            family_mentioned: Some(profile.family_mentioned),
            interests: Some(profile.interests),
            last_question_asked: profile.last_question_asked,
            user_mood: Some(profile.user_mood),
        }
    }
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Decode an array element by element, skipping elements that don't fit.
fn lenient_list<T: serde::de::DeserializeOwned>(value: &Value) -> Option<Vec<T>> {
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| serde_json::from_value(item.clone()).ok())
            .collect(),
    )
}

/// RFC 3339, or a naive ISO-8601 timestamp taken as UTC.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
