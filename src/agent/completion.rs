use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use super::Completer;
use crate::config::LlmConfig;
use crate::types::ChatMessage;

/// Spoken when no API key is configured. No request is made.
pub const MISSING_CREDENTIAL_REPLY: &str = "Ay, disculpa, parece que tengo un pequeño problema técnico en este momento. ¿Mejor platicamos en un ratito?";

/// Spoken when the endpoint does not answer within the timeout.
pub const TIMEOUT_REPLY: &str = "Perdona, me quedé pensando un momentito y me distraje. ¿Qué me decías?";

/// Spoken for any other failure: bad status, unreadable body, transport.
pub const FAILURE_REPLY: &str =
    "Ay, creo que se me cruzaron los cables. ¿Podrías repetirme, por favor?";

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("no API key configured")]
    MissingCredential,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl CompletionError {
    /// The in-character line spoken instead of a completion.
    pub fn fallback_reply(&self) -> &'static str {
        match self {
            CompletionError::MissingCredential => MISSING_CREDENTIAL_REPLY,
            CompletionError::Timeout(_) => TIMEOUT_REPLY,
            _ => FAILURE_REPLY,
        }
    }
}

/// Everything needed to call the remote chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub timeout: Duration,
}

impl From<&LlmConfig> for CompletionSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for an OpenAI-compatible chat-completions endpoint.
///
/// One request per call, bounded by the configured timeout. Failures are
/// never retried; the user's next utterance is the retry.
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    settings: CompletionSettings,
}

impl CompletionClient {
    pub fn new(settings: CompletionSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    /// `[system] + prior + [user]`, in that order.
    pub fn build_messages(
        prior: &[ChatMessage],
        user_message: &str,
        system_prompt: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(prior.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(prior);
        messages.push(ChatMessage::user(user_message));
        messages
    }

    /// Call the endpoint and return the trimmed top completion.
    pub async fn try_complete(
        &self,
        prior: &[ChatMessage],
        user_message: &str,
        system_prompt: &str,
    ) -> Result<String, CompletionError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(CompletionError::MissingCredential)?;

        let messages = Self::build_messages(prior, user_message, system_prompt);
        let body = CompletionRequest {
            model: &self.settings.model,
            messages: &messages,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };

        let timeout = self.settings.timeout;
        let started = Instant::now();
        let text = tokio::time::timeout(timeout, self.send(api_key, &body))
            .await
            .map_err(|_| CompletionError::Timeout(timeout))??;

        debug!(
            model = %self.settings.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "completion received"
        );
        Ok(text)
    }

    async fn send(
        &self,
        api_key: &str,
        body: &CompletionRequest<'_>,
    ) -> Result<String, CompletionError> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let raw = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }

        let parsed: CompletionResponse =
            serde_json::from_str(&raw).map_err(|e| CompletionError::Malformed(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| CompletionError::Malformed("no completion text in response".into()))
    }

    fn transport_error(&self, e: reqwest::Error) -> CompletionError {
        if e.is_timeout() {
            CompletionError::Timeout(self.settings.timeout)
        } else {
            CompletionError::Transport(e)
        }
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(
        &self,
        prior: &[ChatMessage],
        user_message: &str,
        system_prompt: &str,
    ) -> String {
        match self.try_complete(prior, user_message, system_prompt).await {
            Ok(text) => text,
            Err(e) => {
                match &e {
                    CompletionError::MissingCredential => {
                        error!("no API key configured for completion endpoint")
                    }
                    CompletionError::Timeout(_) => warn!("completion request timed out: {e}"),
                    _ => error!("completion request failed: {e}"),
                }
                e.fallback_reply().to_string()
            }
        }
    }
}
