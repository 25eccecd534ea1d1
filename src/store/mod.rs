pub mod backend;
pub mod profile;

use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub use backend::{FileBackend, MemoryBackend, ProfileBackend, StoreError};
pub use profile::{ProfileRecord, UserProfile};

use crate::config::{MAX_RETENTION_HOURS, MemoryConfig};

/// How long profiles live and how much history they carry.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Idle time after which a profile's history is considered stale.
    pub retention_window: chrono::Duration,
    pub conversation_cap: usize,
    pub emotional_cap: usize,
    /// Keep name, family and interests when a profile expires.
    pub retain_identity_on_expiry: bool,
    /// Keep name, family and interests on an explicit clear request.
    pub retain_identity_on_clear: bool,
    /// Upper bound on any single backend call.
    pub op_timeout: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::from(&MemoryConfig::default())
    }
}

impl From<&MemoryConfig> for RetentionPolicy {
    fn from(config: &MemoryConfig) -> Self {
        Self {
            retention_window: retention_window(config.retention_hours),
            conversation_cap: config.conversation_cap,
            emotional_cap: config.emotional_cap,
            retain_identity_on_expiry: config.retain_identity_on_expiry,
            retain_identity_on_clear: config.retain_identity_on_clear,
            op_timeout: Duration::from_millis(config.store_timeout_ms),
        }
    }
}

/// Hours to a window, clamped to the largest accepted value.
fn retention_window(hours: u64) -> chrono::Duration {
    i64::try_from(hours.min(MAX_RETENTION_HOURS))
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or(chrono::Duration::MAX)
}

/// Owns the persisted profile records.
///
/// Every operation is safe to call when the backend is unreachable: loads
/// degrade to a transient default profile, writes are logged and dropped.
/// Nothing here returns an error to the caller.
///
/// Turns for the same user are not serialized. Two overlapping turns each
/// load their own copy and the later save wins.
#[derive(Clone)]
pub struct ProfileStore {
    backend: Option<Arc<dyn ProfileBackend>>,
    policy: RetentionPolicy,
}

impl ProfileStore {
    pub fn new(backend: Arc<dyn ProfileBackend>, policy: RetentionPolicy) -> Self {
        Self {
            backend: Some(backend),
            policy,
        }
    }

    /// A store whose backend could not be reached at startup.
    pub fn unavailable(policy: RetentionPolicy) -> Self {
        Self {
            backend: None,
            policy,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Load a user's profile, creating a default one for unknown users.
    ///
    /// A profile idle for longer than the retention window comes back
    /// reset (identity facts kept if the policy says so).
    pub async fn load(&self, user_id: &str) -> UserProfile {
        let now = Utc::now();

        let profile = match self.fetch(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                debug!(user_id, "no stored profile, starting fresh");
                return UserProfile::new(now);
            }
            Err(StoreError::Unavailable) => {
                warn!(user_id, "profile store unavailable, using transient profile");
                return UserProfile::new(now);
            }
            Err(e) => {
                error!(user_id, "failed to load profile: {e}");
                return UserProfile::new(now);
            }
        };

        if profile.is_expired(now, self.policy.retention_window) {
            info!(
                user_id,
                last_interaction = %profile.last_interaction_at,
                retain_identity = self.policy.retain_identity_on_expiry,
                "profile expired, resetting history"
            );
            return if self.policy.retain_identity_on_expiry {
                profile.retained(now)
            } else {
                UserProfile::new(now)
            };
        }

        profile
    }

    /// Persist a profile at the end of a turn.
    ///
    /// Truncates both histories to their caps, stamps the interaction time
    /// and bumps the interaction count on the caller's copy before writing.
    pub async fn save(&self, user_id: &str, profile: &mut UserProfile) {
        profile.truncate_histories(self.policy.conversation_cap, self.policy.emotional_cap);
        profile.last_interaction_at = Utc::now();
        profile.interaction_count += 1;

        match self.write(user_id, profile).await {
            Ok(()) => debug!(
                user_id,
                interactions = profile.interaction_count,
                "profile saved"
            ),
            Err(StoreError::Unavailable) => {
                warn!(user_id, "profile store unavailable, profile not saved")
            }
            Err(e) => error!(user_id, "failed to save profile: {e}"),
        }
    }

    /// Forget a user. Depending on policy the record is deleted outright or
    /// rewritten with only identity facts.
    pub async fn clear(&self, user_id: &str) {
        let result = if self.policy.retain_identity_on_clear {
            self.clear_retaining(user_id).await
        } else {
            self.remove(user_id).await
        };

        match result {
            Ok(()) => info!(
                user_id,
                retain_identity = self.policy.retain_identity_on_clear,
                "profile cleared"
            ),
            Err(StoreError::Unavailable) => {
                warn!(user_id, "profile store unavailable, nothing cleared")
            }
            Err(e) => error!(user_id, "failed to clear profile: {e}"),
        }
    }

    /// Backfill any void field of a stored record with its default.
    pub fn ensure_integrity(record: ProfileRecord) -> UserProfile {
        record.ensure_integrity(Utc::now())
    }

    async fn clear_retaining(&self, user_id: &str) -> Result<(), StoreError> {
        match self.fetch(user_id).await {
            Ok(Some(profile)) => self.write(user_id, &profile.retained(Utc::now())).await,
            Ok(None) => Ok(()),
            Err(StoreError::Unavailable) => Err(StoreError::Unavailable),
            Err(e) => {
                warn!(user_id, "could not read profile before clearing, deleting: {e}");
                self.remove(user_id).await
            }
        }
    }

    async fn fetch(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        let backend = self.backend()?;
        let record = self.bounded(backend.get(user_id)).await?;
        Ok(record.map(|value| Self::ensure_integrity(ProfileRecord::from_value(&value))))
    }

    async fn write(&self, user_id: &str, profile: &UserProfile) -> Result<(), StoreError> {
        let backend = self.backend()?;
        let record = profile.to_record()?;
        self.bounded(backend.put(user_id, record)).await
    }

    async fn remove(&self, user_id: &str) -> Result<(), StoreError> {
        let backend = self.backend()?;
        self.bounded(backend.delete(user_id)).await
    }

    fn backend(&self) -> Result<&Arc<dyn ProfileBackend>, StoreError> {
        self.backend.as_ref().ok_or(StoreError::Unavailable)
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.policy.op_timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.policy.op_timeout))?
    }
}
