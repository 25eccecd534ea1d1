use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use comadre::agent::completion::{FAILURE_REPLY, MISSING_CREDENTIAL_REPLY, TIMEOUT_REPLY};
use comadre::agent::{Completer, CompletionClient, CompletionError, CompletionSettings};
use comadre::types::{ChatMessage, Role};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Default)]
struct MockState {
    hits: AtomicUsize,
    last_body: Mutex<Option<Value>>,
    last_auth: Mutex<Option<String>>,
}

async fn ok_handler(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    *state.last_body.lock().await = Some(body);
    *state.last_auth.lock().await = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    Json(json!({
        "choices": [{"message": {"role": "assistant", "content": "  ¡Qué bonito día, Rosa!  "}}]
    }))
}

async fn slow_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"choices": [{"message": {"content": "too late"}}]}))
}

async fn error_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "upstream exploded")
}

async fn garbage_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    "this is not json"
}

async fn empty_handler(State(state): State<Arc<MockState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    Json(json!({"choices": []}))
}

async fn start_mock_server() -> (String, Arc<MockState>, tokio::task::JoinHandle<()>) {
    let state = Arc::new(MockState::default());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/ok", post(ok_handler))
        .route("/slow", post(slow_handler))
        .route("/error", post(error_handler))
        .route("/garbage", post(garbage_handler))
        .route("/empty", post(empty_handler))
        .with_state(state.clone());
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), state, handle)
}

fn client(endpoint: String, api_key: Option<&str>, timeout: Duration) -> CompletionClient {
    CompletionClient::new(CompletionSettings {
        endpoint,
        model: "llama3-8b-8192".into(),
        api_key: api_key.map(String::from),
        max_tokens: 100,
        temperature: 0.75,
        top_p: None,
        timeout,
    })
}

#[tokio::test]
async fn success_returns_trimmed_text_and_sends_ordered_messages() {
    let (base, state, _server) = start_mock_server().await;
    let client = client(format!("{base}/ok"), Some("gsk-test"), Duration::from_secs(5));

    let prior = vec![ChatMessage::user("hola"), ChatMessage::assistant("¡Hola!")];
    let reply = client.complete(&prior, "hace sol", "Eres Comadre").await;
    assert_eq!(reply, "¡Qué bonito día, Rosa!");

    let body = state.last_body.lock().await.clone().unwrap();
    assert_eq!(body["model"], "llama3-8b-8192");
    assert_eq!(body["max_tokens"], 100);
    assert!(body.get("top_p").is_none());
    let roles: Vec<&str> = body["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
    assert_eq!(body["messages"][3]["content"], "hace sol");

    assert_eq!(
        state.last_auth.lock().await.as_deref(),
        Some("Bearer gsk-test")
    );
}

#[tokio::test]
async fn timeout_yields_apology_without_retry() {
    let (base, state, _server) = start_mock_server().await;
    let client = client(format!("{base}/slow"), Some("gsk-test"), Duration::from_millis(200));

    let started = std::time::Instant::now();
    let reply = client.complete(&[], "hola", "Eres Comadre").await;
    assert_eq!(reply, TIMEOUT_REPLY);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);

    let err = client.try_complete(&[], "hola", "Eres Comadre").await.unwrap_err();
    assert!(matches!(err, CompletionError::Timeout(_)));
}

#[tokio::test]
async fn server_error_yields_generic_apology() {
    let (base, state, _server) = start_mock_server().await;
    let client = client(format!("{base}/error"), Some("gsk-test"), Duration::from_secs(5));

    assert_eq!(client.complete(&[], "hola", "sys").await, FAILURE_REPLY);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);

    match client.try_complete(&[], "hola", "sys").await {
        Err(CompletionError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("exploded"));
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_payload_yields_generic_apology() {
    let (base, _state, _server) = start_mock_server().await;

    let garbage = client(format!("{base}/garbage"), Some("k"), Duration::from_secs(5));
    assert_eq!(garbage.complete(&[], "hola", "sys").await, FAILURE_REPLY);

    let empty = client(format!("{base}/empty"), Some("k"), Duration::from_secs(5));
    assert!(matches!(
        empty.try_complete(&[], "hola", "sys").await,
        Err(CompletionError::Malformed(_))
    ));
}

#[tokio::test]
async fn missing_credential_skips_the_request() {
    let (base, state, _server) = start_mock_server().await;

    let none = client(format!("{base}/ok"), None, Duration::from_secs(5));
    assert_eq!(none.complete(&[], "hola", "sys").await, MISSING_CREDENTIAL_REPLY);

    let blank = client(format!("{base}/ok"), Some("   "), Duration::from_secs(5));
    assert_eq!(blank.complete(&[], "hola", "sys").await, MISSING_CREDENTIAL_REPLY);

    assert_eq!(state.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unreachable_endpoint_yields_apology() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = client(
        format!("http://127.0.0.1:{port}/v1/chat/completions"),
        Some("k"),
        Duration::from_secs(2),
    );
    let reply = client.complete(&[], "hola", "sys").await;
    assert!(reply == FAILURE_REPLY || reply == TIMEOUT_REPLY);
}

#[test]
fn build_messages_puts_system_first_and_user_last() {
    let prior = vec![ChatMessage::user("a"), ChatMessage::assistant("b")];
    let messages = CompletionClient::build_messages(&prior, "c", "sys");
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[0].content, "sys");
    assert_eq!(messages[3], ChatMessage::user("c"));
}
