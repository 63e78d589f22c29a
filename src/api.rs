//! Local control API for the headless device host.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

use crate::error::EntrigError;
use crate::headless::HeadlessPlatform;
use crate::models::{InboundMessage, OpenIntent, RegistrationAck};
use crate::platform::SurfaceId;
use crate::registration::DEFAULT_SDK_LABEL;
use crate::sdk::Entrig;

const MAX_BODY_BYTES: usize = 64 * 1024;
const MAX_IN_FLIGHT: usize = 64;

// Request models
#[derive(Deserialize)]
struct RegisterRequest {
    user_id: String,
    sdk: Option<String>,
    surface: Option<u64>,
}

#[derive(Deserialize)]
struct PermissionRequest {
    granted: bool,
}

#[derive(Deserialize)]
struct PermissionPromptRequest {
    surface: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum LifecycleState {
    Created,
    Resumed,
    Paused,
    Destroyed,
}

#[derive(Deserialize)]
struct LifecycleRequest {
    surface: u64,
    state: LifecycleState,
    intent: Option<OpenIntent>,
}

// API state
pub struct ApiState {
    pub sdk: Entrig,
    pub platform: Arc<HeadlessPlatform>,
    /// How long `/register` waits before answering 202 for a parked request.
    pub register_wait: Duration,
}

// Set up API router
pub fn create_api_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/register", post(register_user))
        .route("/unregister", post(unregister_user))
        .route("/registration", get(get_registration))
        .route("/messages", post(receive_message))
        .route("/open", post(open_notification))
        .route("/token/rotate", post(rotate_token))
        .route("/permission", post(permission_result))
        .route("/permission/request", post(request_permission))
        .route("/lifecycle", post(lifecycle))
        .route("/initial", get(initial_notification))
        .route("/notifications", get(shown_notifications))
        .route("/metrics", get(metrics))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(ConcurrencyLimitLayer::new(MAX_IN_FLIGHT))
        .layer(CorsLayer::permissive()) // Local development host
}

fn error_response(e: &EntrigError) -> Response {
    let status = match e {
        EntrigError::NotInitialized => StatusCode::SERVICE_UNAVAILABLE,
        EntrigError::PermissionSurfaceUnavailable => StatusCode::CONFLICT,
        EntrigError::NotRegistered => StatusCode::NOT_FOUND,
        EntrigError::Network(_) | EntrigError::BackendRejected { .. } => StatusCode::BAD_GATEWAY,
        EntrigError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        EntrigError::Storage(_) | EntrigError::Platform(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

// API handlers
async fn register_user(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<RegisterRequest>,
) -> Response {
    tracing::info!("Registering user: {}", req.user_id);

    let (tx, rx) = oneshot::channel();
    let sdk_label = req.sdk.as_deref().unwrap_or(DEFAULT_SDK_LABEL);
    state
        .sdk
        .register(&req.user_id, sdk_label, req.surface.map(SurfaceId), move |result| {
            let _ = tx.send(result);
        });

    match tokio::time::timeout(state.register_wait, rx).await {
        Ok(Ok(Ok(RegistrationAck::Registered(record)))) => (
            StatusCode::OK,
            Json(json!({ "status": "registered", "registration_id": record.registration_id })),
        )
            .into_response(),
        Ok(Ok(Ok(RegistrationAck::AlreadyRegistered))) => {
            (StatusCode::OK, Json(json!({ "status": "unchanged" }))).into_response()
        }
        Ok(Ok(Err(e))) => error_response(&e),
        // Handler dropped: a newer request replaced this one at the consent prompt
        Ok(Err(_)) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "superseded" })),
        )
            .into_response(),
        Err(_) => (StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response(),
    }
}

async fn unregister_user(State(state): State<Arc<ApiState>>) -> Response {
    let (tx, rx) = oneshot::channel();
    state.sdk.unregister(move |result| {
        let _ = tx.send(result);
    });

    match rx.await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => error_response(&e),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn get_registration(State(state): State<Arc<ApiState>>) -> Response {
    match state.sdk.registration().await {
        Ok(Some(record)) => Json(json!({
            "registration_id": record.registration_id,
            "user_id": record.user_id,
            "push_token": record.push_token,
        }))
        .into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => error_response(&e),
    }
}

async fn receive_message(
    State(state): State<Arc<ApiState>>,
    Json(message): Json<InboundMessage>,
) -> StatusCode {
    state.sdk.on_message_received(message);
    StatusCode::ACCEPTED
}

async fn open_notification(
    State(state): State<Arc<ApiState>>,
    Json(intent): Json<OpenIntent>,
) -> Json<serde_json::Value> {
    let opened = state.sdk.handle_intent(&intent);
    Json(json!({ "opened": opened }))
}

async fn rotate_token(State(state): State<Arc<ApiState>>) -> Json<serde_json::Value> {
    let token = state.platform.rotate_token();
    state.sdk.on_new_token(&token);
    Json(json!({ "token": token }))
}

async fn permission_result(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PermissionRequest>,
) -> StatusCode {
    state.platform.set_consent(req.granted);
    state.sdk.on_permission_result(req.granted);
    StatusCode::ACCEPTED
}

async fn request_permission(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<PermissionPromptRequest>,
) -> Response {
    let (tx, rx) = oneshot::channel();
    state
        .sdk
        .request_permission(req.surface.map(SurfaceId), move |result| {
            let _ = tx.send(result);
        });

    match tokio::time::timeout(state.register_wait, rx).await {
        Ok(Ok(Ok(granted))) => Json(json!({ "granted": granted })).into_response(),
        Ok(Ok(Err(e))) => error_response(&e),
        Ok(Err(_)) => (
            StatusCode::CONFLICT,
            Json(json!({ "status": "superseded" })),
        )
            .into_response(),
        Err(_) => (StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))).into_response(),
    }
}

async fn lifecycle(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<LifecycleRequest>,
) -> Json<serde_json::Value> {
    let surface = SurfaceId(req.surface);
    match req.state {
        LifecycleState::Created => state.sdk.on_surface_created(surface, req.intent.as_ref()),
        LifecycleState::Resumed => state.sdk.on_surface_resumed(surface, req.intent.as_ref()),
        LifecycleState::Paused => state.sdk.on_surface_paused(surface),
        LifecycleState::Destroyed => state.sdk.on_surface_destroyed(surface),
    }
    Json(json!({ "foreground": state.sdk.is_in_foreground() }))
}

async fn initial_notification(State(state): State<Arc<ApiState>>) -> Response {
    match state.sdk.initial_notification() {
        Some(event) => Json(event).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn shown_notifications(State(state): State<Arc<ApiState>>) -> Response {
    Json(state.platform.shown()).into_response()
}

async fn metrics() -> String {
    crate::metrics::render_metrics()
}
