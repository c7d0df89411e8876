//! HTTP surface: the public page, a liveness probe and, in webhook mode,
//! the Slack Events API and interactivity endpoints.
//!
//! Webhook bodies are signature-checked before they are parsed. Accepted
//! events are handed to the event queue and acknowledged immediately; the
//! worker does the rest.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use csp_core::Config;
use csp_page::{PageRenderer, SnapshotStore};
use csp_slack::events::{parse_callback, parse_interaction, Callback};
use csp_slack::signature::{self, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use csp_slack::{EventQueue, SlackEvent};

pub const INDEX_ENDPOINT: &str = "/";
pub const HEALTH_ENDPOINT: &str = "/health";
pub const EVENT_ENDPOINT: &str = "/slack/event/handle";
pub const INTERACTION_ENDPOINT: &str = "/slack/interaction/handle";

const HEALTH_BODY: &str = "cursed-status-page";

/// Shared handler state.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SnapshotStore>,
    pub renderer: PageRenderer,
    /// Present in webhook mode only.
    pub queue: Option<Arc<EventQueue>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route(INDEX_ENDPOINT, get(handle_index))
        .route(HEALTH_ENDPOINT, get(handle_health));
    if state.queue.is_some() {
        app = app
            .route(EVENT_ENDPOINT, post(handle_event))
            .route(INTERACTION_ENDPOINT, post(handle_interaction));
    }
    app.with_state(state)
}

// ─────────────────────────────────────────────
// Page
// ─────────────────────────────────────────────

async fn handle_index(State(state): State<Arc<AppState>>) -> Response {
    let snapshot = state.store.current();
    match state.renderer.render(&snapshot, &state.config) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render status page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render status page").into_response()
        }
    }
}

async fn handle_health() -> Response {
    (StatusCode::OK, Json(json!(HEALTH_BODY))).into_response()
}

// ─────────────────────────────────────────────
// Webhooks
// ─────────────────────────────────────────────

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Reject the request with 401 unless Slack signed it.
fn verify_request(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), Response> {
    signature::verify(
        &state.config.slack.signing_secret,
        header(headers, TIMESTAMP_HEADER),
        header(headers, SIGNATURE_HEADER),
        body,
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        warn!(error = %e, "rejecting unsigned Slack request");
        (StatusCode::UNAUTHORIZED, "invalid request signature").into_response()
    })
}

async fn enqueue(state: &AppState, event: SlackEvent) -> Response {
    let Some(queue) = &state.queue else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let kind = event.kind();
    match queue.publish(event).await {
        Ok(()) => {
            debug!(kind, "queued webhook event");
            StatusCode::OK.into_response()
        }
        Err(e) => {
            error!(error = %e, kind, "event queue closed");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

async fn handle_event(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = verify_request(&state, &headers, &body) {
        return rejection;
    }
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "unparseable Events API body");
            return (StatusCode::BAD_REQUEST, "invalid JSON body").into_response();
        }
    };

    match parse_callback(&payload) {
        Callback::UrlVerification { challenge } => {
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        Callback::RateLimited => {
            warn!("Slack is rate limiting event delivery");
            StatusCode::OK.into_response()
        }
        Callback::Event(Some(event)) => enqueue(&state, event).await,
        Callback::Event(None) => StatusCode::OK.into_response(),
        Callback::Unknown(kind) => {
            debug!(kind = %kind, "ignoring unknown callback type");
            StatusCode::OK.into_response()
        }
    }
}

/// Interactivity bodies are `application/x-www-form-urlencoded` with the
/// JSON in a `payload` field.
fn interaction_payload(body: &[u8]) -> Option<Value> {
    let raw = url::form_urlencoded::parse(body)
        .find(|(key, _)| key == "payload")
        .map(|(_, value)| value.into_owned())?;
    serde_json::from_str(&raw).ok()
}

async fn handle_interaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(rejection) = verify_request(&state, &headers, &body) {
        return rejection;
    }
    let Some(payload) = interaction_payload(&body) else {
        warn!("interaction body without a JSON payload");
        return (StatusCode::BAD_REQUEST, "missing payload").into_response();
    };
    match parse_interaction(&payload) {
        Some(event) => enqueue(&state, event).await,
        None => StatusCode::OK.into_response(),
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
