use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use comadre::store::{
    FileBackend, MemoryBackend, ProfileBackend, ProfileRecord, ProfileStore, RetentionPolicy,
    StoreError, UserProfile,
};
use comadre::types::{ChatMessage, Mood};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

fn policy() -> RetentionPolicy {
    RetentionPolicy {
        retention_window: ChronoDuration::hours(48),
        conversation_cap: 4,
        emotional_cap: 3,
        retain_identity_on_expiry: true,
        retain_identity_on_clear: false,
        op_timeout: Duration::from_secs(1),
    }
}

fn memory_store(policy: RetentionPolicy) -> (Arc<MemoryBackend>, ProfileStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = ProfileStore::new(backend.clone(), policy);
    (backend, store)
}

fn stale_record(hours_ago: i64) -> Value {
    json!({
        "user_name": "Ana",
        "interaction_count": 7,
        "last_interaction": (Utc::now() - ChronoDuration::hours(hours_ago)).to_rfc3339(),
        "conversation_history": [
            {"role": "user", "content": "hola"},
            {"role": "assistant", "content": "¡Hola, Ana!"}
        ],
        "emotional_history": ["sad"],
        "family_mentioned": ["nieta"],
        "interests": ["cocina"],
        "last_question_asked": "¿Cómo estás?",
        "user_mood": "sad"
    })
}

// =============================================================
// Load / save
// =============================================================

#[tokio::test]
async fn unknown_user_loads_default_profile() {
    let (_, store) = memory_store(policy());
    let profile = store.load("nobody").await;
    assert!(profile.user_name.is_none());
    assert_eq!(profile.interaction_count, 0);
    assert!(profile.conversation_history.is_empty());
    assert_eq!(profile.user_mood, Mood::Neutral);
}

#[tokio::test]
async fn save_bumps_count_and_round_trips() {
    let (backend, store) = memory_store(policy());

    let mut profile = store.load("u1").await;
    profile.user_name = Some("Rosa".into());
    profile.record_mood(Mood::Happy);
    store.save("u1", &mut profile).await;
    assert_eq!(profile.interaction_count, 1);
    assert_eq!(backend.count().await, 1);

    let reloaded = store.load("u1").await;
    assert_eq!(reloaded.user_name.as_deref(), Some("Rosa"));
    assert_eq!(reloaded.interaction_count, 1);
    assert_eq!(reloaded.emotional_history, vec![Mood::Happy]);
    assert_eq!(reloaded.user_mood, Mood::Happy);
}

#[tokio::test]
async fn save_keeps_only_the_newest_entries_in_order() {
    let (_, store) = memory_store(policy());

    let mut profile = store.load("u1").await;
    for i in 0..5 {
        profile.push_exchange(format!("u{i}"), format!("a{i}"));
    }
    for mood in [Mood::Happy, Mood::Sad, Mood::Neutral, Mood::Happy, Mood::Sad] {
        profile.record_mood(mood);
    }
    store.save("u1", &mut profile).await;

    let reloaded = store.load("u1").await;
    assert_eq!(
        reloaded.conversation_history,
        vec![
            ChatMessage::user("u3"),
            ChatMessage::assistant("a3"),
            ChatMessage::user("u4"),
            ChatMessage::assistant("a4"),
        ]
    );
    assert_eq!(
        reloaded.emotional_history,
        vec![Mood::Neutral, Mood::Happy, Mood::Sad]
    );
}

// =============================================================
// Expiry
// =============================================================

#[tokio::test]
async fn expired_profile_keeps_identity_when_policy_retains() {
    let (backend, store) = memory_store(policy());
    backend.put("ana", stale_record(72)).await.unwrap();

    let profile = store.load("ana").await;
    assert_eq!(profile.user_name.as_deref(), Some("Ana"));
    assert!(profile.family_mentioned.contains("nieta"));
    assert!(profile.interests.contains("cocina"));
    assert!(profile.conversation_history.is_empty());
    assert!(profile.emotional_history.is_empty());
    assert!(profile.last_question_asked.is_none());
    assert_eq!(profile.interaction_count, 0);
}

#[tokio::test]
async fn expired_profile_resets_fully_without_retention() {
    let mut policy = policy();
    policy.retain_identity_on_expiry = false;
    let (backend, store) = memory_store(policy);
    backend.put("ana", stale_record(72)).await.unwrap();

    let profile = store.load("ana").await;
    let fresh = UserProfile::new(profile.last_interaction_at);
    assert_eq!(profile, fresh);
}

#[tokio::test]
async fn recent_profile_is_not_expired() {
    let (backend, store) = memory_store(policy());
    backend.put("ana", stale_record(2)).await.unwrap();

    let profile = store.load("ana").await;
    assert_eq!(profile.conversation_history.len(), 2);
    assert_eq!(profile.interaction_count, 7);
}

// =============================================================
// Clear
// =============================================================

#[tokio::test]
async fn clear_deletes_by_default() {
    let (backend, store) = memory_store(policy());
    backend.put("ana", stale_record(1)).await.unwrap();

    store.clear("ana").await;
    assert_eq!(backend.count().await, 0);
    assert!(store.load("ana").await.user_name.is_none());
}

#[tokio::test]
async fn clear_with_retention_keeps_identity_only() {
    let mut policy = policy();
    policy.retain_identity_on_clear = true;
    let (backend, store) = memory_store(policy);
    backend.put("ana", stale_record(1)).await.unwrap();

    store.clear("ana").await;
    let profile = store.load("ana").await;
    assert_eq!(profile.user_name.as_deref(), Some("Ana"));
    assert!(profile.conversation_history.is_empty());
    assert!(profile.emotional_history.is_empty());
    assert!(profile.family_mentioned.contains("nieta"));
}

// =============================================================
// Schema healing
// =============================================================

#[test]
fn malformed_fields_are_backfilled() {
    let record = ProfileRecord::from_value(&json!({
        "user_name": 42,
        "interaction_count": "many",
        "conversation_history": [{"role": "user", "content": "hola"}, "garbage"],
        "emotional_history": ["sad", "furious", "happy"],
        "family_mentioned": null,
        "last_question_asked": "   "
    }));
    let profile = ProfileStore::ensure_integrity(record);

    assert!(profile.user_name.is_none());
    assert_eq!(profile.interaction_count, 0);
    assert_eq!(profile.conversation_history, vec![ChatMessage::user("hola")]);
    assert_eq!(profile.emotional_history, vec![Mood::Sad, Mood::Happy]);
    assert!(profile.family_mentioned.is_empty());
    assert!(profile.last_question_asked.is_none());
    assert_eq!(profile.user_mood, Mood::Happy);
}

#[test]
fn non_object_record_heals_to_defaults() {
    let profile = ProfileStore::ensure_integrity(ProfileRecord::from_value(&json!([1, 2, 3])));
    assert!(profile.user_name.is_none());
    assert_eq!(profile.interaction_count, 0);
}

#[test]
fn ensure_integrity_is_idempotent() {
    let record = ProfileRecord::from_value(&json!({
        "user_name": "Rosa",
        "emotional_history": ["happy", "sad"],
        "interests": ["tejer"]
    }));
    let once = ProfileStore::ensure_integrity(record);
    let twice = ProfileStore::ensure_integrity(ProfileRecord::from(once.clone()));
    assert_eq!(once, twice);
}

// =============================================================
// Degraded backends
// =============================================================

#[tokio::test]
async fn unavailable_store_degrades_silently() {
    let store = ProfileStore::unavailable(policy());
    assert!(!store.is_available());

    let mut profile = store.load("ana").await;
    assert!(profile.user_name.is_none());

    profile.user_name = Some("Ana".into());
    store.save("ana", &mut profile).await;
    store.clear("ana").await;
    assert!(store.load("ana").await.user_name.is_none());
}

struct BrokenBackend;

#[async_trait]
impl ProfileBackend for BrokenBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        Err(std::io::Error::other("disk on fire").into())
    }
    async fn put(&self, _key: &str, _record: Value) -> Result<(), StoreError> {
        Err(std::io::Error::other("disk on fire").into())
    }
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(std::io::Error::other("disk on fire").into())
    }
}

#[tokio::test]
async fn failing_backend_never_surfaces_errors() {
    let store = ProfileStore::new(Arc::new(BrokenBackend), policy());
    let mut profile = store.load("ana").await;
    assert_eq!(profile.interaction_count, 0);
    store.save("ana", &mut profile).await;
    store.clear("ana").await;
}

struct SlowBackend;

#[async_trait]
impl ProfileBackend for SlowBackend {
    async fn get(&self, _key: &str) -> Result<Option<Value>, StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }
    async fn put(&self, _key: &str, _record: Value) -> Result<(), StoreError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(())
    }
    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test]
async fn slow_backend_is_bounded_by_timeout() {
    let mut policy = policy();
    policy.op_timeout = Duration::from_millis(50);
    let store = ProfileStore::new(Arc::new(SlowBackend), policy);

    let started = std::time::Instant::now();
    let mut profile = store.load("ana").await;
    store.save("ana", &mut profile).await;
    assert!(started.elapsed() < Duration::from_secs(2));
}

// =============================================================
// File backend
// =============================================================

#[tokio::test]
async fn file_backend_persists_across_instances() {
    let dir = tempfile::tempdir().unwrap();

    {
        let backend = FileBackend::open(dir.path().join("profiles")).unwrap();
        let store = ProfileStore::new(Arc::new(backend), policy());
        let mut profile = store.load("amzn1.ask.account/ABC").await;
        profile.user_name = Some("Carmen".into());
        store.save("amzn1.ask.account/ABC", &mut profile).await;
    }

    let backend = FileBackend::open(dir.path().join("profiles")).unwrap();
    let store = ProfileStore::new(Arc::new(backend), policy());
    let profile = store.load("amzn1.ask.account/ABC").await;
    assert_eq!(profile.user_name.as_deref(), Some("Carmen"));
    assert_eq!(profile.interaction_count, 1);
}

#[tokio::test]
async fn file_backend_handles_very_long_user_ids() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::open(dir.path()).unwrap();
    let store = ProfileStore::new(Arc::new(backend), policy());

    let long_id = format!("amzn1.ask.account.{}", "A".repeat(300));
    let accented_id = "ñ".repeat(150);
    for (user_id, name) in [(long_id.as_str(), "Rosa"), (accented_id.as_str(), "Begoña")] {
        let mut profile = store.load(user_id).await;
        profile.user_name = Some(name.into());
        store.save(user_id, &mut profile).await;
    }

    assert_eq!(store.load(&long_id).await.user_name.as_deref(), Some("Rosa"));
    assert_eq!(
        store.load(&accented_id).await.user_name.as_deref(),
        Some("Begoña")
    );

    let neighbour = format!("amzn1.ask.account.{}B", "A".repeat(299));
    assert!(store.load(&neighbour).await.user_name.is_none());
}

#[tokio::test]
async fn file_backend_missing_record_is_absent() {
    let dir = tempfile::tempdir().unwrap();
    let backend = FileBackend::open(dir.path()).unwrap();
    assert!(backend.get("ghost").await.unwrap().is_none());
    backend.delete("ghost").await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn file_backend_restricts_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let profiles = dir.path().join("profiles");
    let backend = FileBackend::open(&profiles).unwrap();
    backend.put("rosa", json!({"user_name": "Rosa"})).await.unwrap();

    let dir_mode = std::fs::metadata(&profiles).unwrap().permissions().mode() & 0o777;
    let file_mode = std::fs::metadata(profiles.join("rosa.json"))
        .unwrap()
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(dir_mode, 0o700);
    assert_eq!(file_mode, 0o600);
}
