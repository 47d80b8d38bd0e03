//! HTTP server for Trello webhooks.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, info, warn, Level};

use crate::dedup::{DedupGuard, RunIdentity};
use crate::pipeline::Relay;
use crate::trello::{verify_webhook_signature, WebhookPayload, SIGNATURE_HEADER};

/// Largest accepted webhook body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Upper bound on handling one request; runs continue in the background.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Webhook signature settings.
#[derive(Debug, Clone, Default)]
pub struct WebhookAuth {
    /// Trello app secret; signatures are only checked when set
    pub secret: Option<String>,
    /// Callback URL registered with Trello
    pub callback_url: Option<String>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub guard: DedupGuard,
    pub auth: WebhookAuth,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/webhooks/trello", get(alive).post(trello_webhook))
        .route("/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
                )
                .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    REQUEST_TIMEOUT,
                )),
        )
        .with_state(state)
}

/// Liveness probe. Trello checks the callback URL with HEAD, which the GET
/// route also answers.
async fn alive() -> &'static str {
    "Trello webhook alive"
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Handle a Trello webhook delivery.
///
/// Acknowledges immediately; admitted runs continue in the background and
/// report through a card comment.
pub async fn trello_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, StatusCode> {
    if let Some(secret) = &state.auth.secret {
        let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
            warn!("Missing X-Trello-Webhook header");
            return Err(StatusCode::UNAUTHORIZED);
        };
        let callback_url = state.auth.callback_url.as_deref().unwrap_or_default();
        if !verify_webhook_signature(&body, callback_url, signature, secret) {
            warn!("Invalid webhook signature");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let value: Value = serde_json::from_slice(&body).map_err(|e| {
        warn!("Failed to parse webhook payload: {e}");
        StatusCode::BAD_REQUEST
    })?;

    let ack = Json(json!({ "ok": true }));
    let Some(event) = WebhookPayload::from_json(value).and_then(|p| p.card_event()) else {
        return Ok(ack);
    };

    let permit = match state.guard.admit(RunIdentity::for_event(&event)) {
        Ok(permit) => permit,
        Err(rejection) => {
            debug!(card_id = %event.card_id, "Duplicate delivery ignored: {}", rejection);
            return Ok(ack);
        }
    };

    info!(card_id = %event.card_id, trigger = ?event.trigger, "Accepted card event");
    let relay = state.relay.clone();
    tokio::spawn(async move {
        // released when the run ends, whatever the outcome
        let _permit = permit;
        if let Err(e) = relay.run(event).await {
            debug!(kind = e.kind().as_str(), "Run ended with an error");
        }
    });

    Ok(ack)
}
