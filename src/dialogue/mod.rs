pub mod handlers;
pub mod intent;

use futures::FutureExt;
use serde::Deserialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

pub use handlers::{DISTRACTED, Effect, Outcome};
pub use intent::{Intent, UnknownIntent};

use crate::agent::{CompletionClient, CompletionSettings, Completer, EmpathyFilter};
use crate::config::{ComadreConfig, DialogueConfig};
use crate::phrases::{PhrasePicker, RandomPicker};
use crate::store::{FileBackend, MemoryBackend, ProfileStore, RetentionPolicy};
use crate::types::Reply;
use handlers::Context;

/// One request from the voice platform, minus the user id.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub intent: String,
    #[serde(default)]
    pub utterance: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TurnRequest {
    pub fn new(intent: Intent) -> Self {
        Self {
            intent: intent.name().to_string(),
            utterance: None,
            reason: None,
        }
    }

    pub fn with_utterance(mut self, utterance: impl Into<String>) -> Self {
        self.utterance = Some(utterance.into());
        self
    }
}

#[derive(Debug, thiserror::Error)]
enum TurnError {
    #[error(transparent)]
    UnknownIntent(#[from] UnknownIntent),
    #[error("request carries no user id")]
    MissingUser,
}

/// Runs turns: load the profile, dispatch on the intent, persist.
///
/// Built once at startup and shared by every request.
#[derive(Clone)]
pub struct TurnHandler {
    store: ProfileStore,
    completer: Arc<dyn Completer>,
    empathy: EmpathyFilter,
    picker: Arc<dyn PhrasePicker>,
    settings: DialogueConfig,
}

impl TurnHandler {
    pub fn new(
        store: ProfileStore,
        completer: Arc<dyn Completer>,
        picker: Arc<dyn PhrasePicker>,
        settings: DialogueConfig,
    ) -> Self {
        Self {
            store,
            completer,
            empathy: EmpathyFilter::new(picker.clone()),
            picker,
            settings,
        }
    }

    /// Wire up the production collaborators described by `config`.
    pub fn from_config(config: &ComadreConfig) -> Self {
        let policy = RetentionPolicy::from(&config.memory);
        let store = match config.memory.backend.as_str() {
            "memory" => ProfileStore::new(Arc::new(MemoryBackend::new()), policy),
            _ => {
                let dir = config.memory.profile_dir();
                match FileBackend::open(&dir) {
                    Ok(backend) => ProfileStore::new(Arc::new(backend), policy),
                    Err(e) => {
                        warn!("profile store at {} unavailable: {e}", dir.display());
                        ProfileStore::unavailable(policy)
                    }
                }
            }
        };
        let completer = CompletionClient::new(CompletionSettings::from(&config.llm));

        Self::new(
            store,
            Arc::new(completer),
            Arc::new(RandomPicker),
            config.dialogue.clone(),
        )
    }

    pub fn store(&self) -> &ProfileStore {
        &self.store
    }

    /// Handle one turn. Never fails: any error or panic along the way is
    /// answered with the "distracted" apology.
    pub async fn handle(&self, user_id: &str, request: TurnRequest) -> Reply {
        let intent = request.intent.clone();
        match AssertUnwindSafe(self.run(user_id, request))
            .catch_unwind()
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(user_id, %intent, "turn rejected: {e}");
                handlers::distracted()
            }
            Err(_) => {
                error!(user_id, %intent, "turn panicked");
                handlers::distracted()
            }
        }
    }

    /// Free-form conversation turn: `(spoken text, follow-up prompt)`.
    pub async fn converse(&self, user_id: &str, utterance: Option<&str>) -> (String, String) {
        let mut request = TurnRequest::new(Intent::Conversation);
        request.utterance = utterance.map(str::to_string);
        let reply = self.handle(user_id, request).await;
        let reprompt = reply.reprompt.unwrap_or_default();
        (reply.speech, reprompt)
    }

    async fn run(&self, user_id: &str, request: TurnRequest) -> Result<Reply, TurnError> {
        let intent: Intent = request.intent.parse()?;
        if user_id.trim().is_empty() {
            return Err(TurnError::MissingUser);
        }

        let mut profile = self.store.load(user_id).await;
        let ctx = Context {
            completer: self.completer.as_ref(),
            empathy: &self.empathy,
            picker: self.picker.as_ref(),
            dialogue: &self.settings,
            retain_identity_on_clear: self.store.policy().retain_identity_on_clear,
        };
        let utterance = request.utterance.as_deref();

        let outcome = match intent {
            Intent::Launch => handlers::launch(&mut profile),
            Intent::ProvideName => handlers::provide_name(&mut profile, utterance),
            Intent::PositiveResponse => handlers::positive_response(&mut profile, &ctx),
            Intent::NegativeResponse => handlers::negative_response(&mut profile, &ctx),
            Intent::Conversation => handlers::conversation(&mut profile, utterance, &ctx).await,
            Intent::ClearMemory => handlers::clear_memory(&profile, &ctx),
            Intent::Help => handlers::help(),
            Intent::Stop => handlers::stop(&profile, &ctx),
            Intent::SessionEnded => handlers::session_ended(request.reason.as_deref()),
        };

        match outcome.effect {
            Effect::Save => self.store.save(user_id, &mut profile).await,
            Effect::Clear => self.store.clear(user_id).await,
            Effect::Discard => {}
        }

        info!(user_id, %intent, effect = ?outcome.effect, "turn handled");
        Ok(outcome.reply)
    }
}
