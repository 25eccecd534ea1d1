use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Instrument, info, info_span, warn};

use super::auth;
use crate::config::ComadreConfig;
use crate::dialogue::{TurnHandler, TurnRequest};
use crate::types::Reply;

pub struct AppState {
    pub token: Option<String>,
    pub turns: TurnHandler,
}

/// Body of `POST /turn`.
#[derive(Debug, Deserialize)]
struct TurnBody {
    user_id: String,
    #[serde(flatten)]
    turn: TurnRequest,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/turn", post(turn_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

pub async fn run(config: ComadreConfig, token: Option<String>) -> anyhow::Result<()> {
    let is_loopback = config.gateway.bind == "127.0.0.1"
        || config.gateway.bind == "::1"
        || config.gateway.bind == "localhost";

    if !is_loopback && token.is_none() {
        anyhow::bail!(
            "Auth token required when binding to non-loopback address. \
             Set --token or COMADRE_TOKEN env var."
        );
    }

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let turns = TurnHandler::from_config(&config);
    info!(
        model = %config.llm.model,
        store_available = turns.store().is_available(),
        "turn handler ready"
    );

    let app = router(Arc::new(AppState { token, turns }));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("comadre gateway listening on {addr}");
    if is_loopback {
        info!("bound to loopback, local access only");
    } else {
        warn!("bound to {addr}, ensure auth token is set");
    }

    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// Handle one voice-platform turn.
///
/// Anything wrong with the body still gets a spoken reply and a 200,
/// since the platform reads whatever comes back to the user.
async fn turn_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !auth::verify_bearer(&headers, &state.token) {
        return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
    }

    let request_id = uuid::Uuid::new_v4();
    let body: TurnBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!(%request_id, "malformed turn body: {e}");
            return Json(crate::dialogue::handlers::distracted()).into_response();
        }
    };

    let span = info_span!("turn", %request_id, user_id = %body.user_id, intent = %body.turn.intent);
    let reply: Reply = state
        .turns
        .handle(&body.user_id, body.turn)
        .instrument(span)
        .await;

    Json(reply).into_response()
}
