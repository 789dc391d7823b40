//! HTTP API server for outbound sends and session status.
//!
//! Spawned as a background task in the gateway. Handlers only read the
//! session snapshot; they never change connection state.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use warelay_core::{
    config::ApiConfig, message::OutboundRequest, session::SessionSnapshot, traits::Channel,
};

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    channel: Arc<dyn Channel>,
    session: watch::Receiver<SessionSnapshot>,
    api_key: Option<String>,
    send_timeout: Duration,
}

impl ApiState {
    pub fn new(
        channel: Arc<dyn Channel>,
        session: watch::Receiver<SessionSnapshot>,
        config: &ApiConfig,
    ) -> Self {
        let api_key = if config.api_key.is_empty() {
            None
        } else {
            Some(config.api_key.clone())
        };
        Self {
            channel,
            session,
            api_key,
            send_timeout: config.send_timeout(),
        }
    }
}

fn error_response(code: StatusCode, message: impl Into<String>) -> ApiError {
    (
        code,
        Json(json!({"status": "error", "message": message.into()})),
    )
}

/// Constant-time string comparison to prevent timing attacks on API token validation.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

/// Check bearer token auth.
fn check_auth(headers: &HeaderMap, api_key: &Option<String>) -> Result<(), ApiError> {
    let Some(key) = api_key else {
        return Ok(());
    };

    let value = headers
        .get("authorization")
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "missing Authorization header"))?
        .to_str()
        .map_err(|_| error_response(StatusCode::UNAUTHORIZED, "invalid Authorization header"))?;

    match value.strip_prefix("Bearer ") {
        Some(token) if constant_time_eq(token, key) => Ok(()),
        _ => Err(error_response(StatusCode::UNAUTHORIZED, "invalid token")),
    }
}

/// `POST /send-message`: deliver `{to, message}` through the live session.
async fn send_message(
    headers: HeaderMap,
    State(state): State<ApiState>,
    body: Result<Json<OutboundRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    check_auth(&headers, &state.api_key)?;

    let Json(req) = body.map_err(|e| {
        error_response(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e.body_text()))
    })?;

    let to = req.to.trim();
    if to.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "'to' must not be empty"));
    }
    if req.message.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "'message' must not be empty",
        ));
    }

    state
        .session
        .borrow()
        .ensure_connected()
        .map_err(|_| error_response(StatusCode::BAD_REQUEST, "whatsapp is not connected"))?;

    let address = state.channel.qualify(to);
    match tokio::time::timeout(
        state.send_timeout,
        state.channel.send_text(&address, &req.message),
    )
    .await
    {
        Ok(Ok(())) => {
            info!("api: message sent to {address}");
            Ok(Json(json!({"status": "success", "message": "message sent"})))
        }
        Ok(Err(e)) => {
            error!("api: send to {address} failed: {e}");
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
            ))
        }
        Err(_) => {
            warn!(
                "api: send to {address} timed out after {}s",
                state.send_timeout.as_secs_f32()
            );
            Err(error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "send timed out",
            ))
        }
    }
}

/// `GET /status`: connection state.
async fn status(
    headers: HeaderMap,
    State(state): State<ApiState>,
) -> Result<Json<Value>, ApiError> {
    check_auth(&headers, &state.api_key)?;

    let snapshot = state.session.borrow().clone();
    Ok(Json(json!({
        "status": snapshot.state.as_str(),
        "connected": snapshot.is_connected(),
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// `GET /qr`: raw pending pairing code, if any.
async fn qr(headers: HeaderMap, State(state): State<ApiState>) -> Result<Json<Value>, ApiError> {
    check_auth(&headers, &state.api_key)?;

    let snapshot = state.session.borrow().clone();
    Ok(Json(json!({
        "status": snapshot.state.as_str(),
        "qr": snapshot.pending_qr,
    })))
}

/// Build the axum router with shared state.
fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/send-message", post(send_message))
        .route("/status", get(status))
        .route("/qr", get(qr))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Start the API server. Called from `Gateway::run()`.
pub async fn serve(config: ApiConfig, state: ApiState) {
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("API server failed to bind to {addr}: {e}");
            return;
        }
    };

    info!("API server listening on {addr}");

    if let Err(e) = axum::serve(listener, app).await {
        error!("API server error: {e}");
    }
}
