//! Axum Handlers for the REST API
//!
//! This module contains the logic for handling HTTP requests for voiceboard
//! sessions. It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::{future::Future, sync::Arc};
use tracing::error;
use voiceboard_core::RegistryError;

use crate::{
    models::{
        CacheEntry, CacheResponse, ChatPayload, ChatReply, ClearedResponse,
        CreateVoiceboardPayload, ErrorResponse, HealthResponse, RemovedResponse, ServiceInfo,
        SessionStatus,
    },
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::BadRequest(error) => (StatusCode::BAD_REQUEST, error),
            ApiError::NotFound(error) => (StatusCode::NOT_FOUND, error),
            ApiError::Conflict(error) => (StatusCode::CONFLICT, error),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(_) => Self::BadRequest(err.to_string()),
            RegistryError::NotFound(_) => Self::NotFound(err.to_string()),
            RegistryError::AlreadyExists(_) => Self::Conflict(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Runs registry work on its own task so it finishes even if the client
/// goes away, and a panic surfaces as a 500 instead of a dropped connection.
async fn run_detached<T, F>(work: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, RegistryError>> + Send + 'static,
    T: Send + 'static,
{
    match tokio::spawn(work).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(join_error) => Err(ApiError::InternalServerError(
            anyhow::Error::new(join_error).context("Session task failed"),
        )),
    }
}

/// Create a voiceboard session and research its persona.
#[utoipa::path(
    post,
    path = "/voiceboard/create",
    request_body = CreateVoiceboardPayload,
    responses(
        (status = 201, description = "Session created and initialized", body = SessionStatus),
        (status = 400, description = "Missing personName or sessionId", body = ErrorResponse),
        (status = 409, description = "Session id already in use", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_voiceboard(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateVoiceboardPayload>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(payload) = payload?;
    let registry = state.registry.clone();
    let snapshot = run_detached(async move {
        registry
            .create(&payload.session_id, &payload.person_name)
            .await
    })
    .await?;

    Ok((StatusCode::CREATED, Json(SessionStatus::from(snapshot))))
}

/// Send a message to a voiceboard persona.
#[utoipa::path(
    post,
    path = "/voiceboard/chat",
    request_body = ChatPayload,
    responses(
        (status = 200, description = "The persona's reply", body = ChatReply),
        (status = 400, description = "Missing sessionId or message", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatPayload>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(payload) = payload?;
    let registry = state.registry.clone();
    let session_id = payload.session_id.trim().to_string();
    let outcome = run_detached(async move {
        registry
            .chat(
                &payload.session_id,
                &payload.message,
                payload.person_name.as_deref(),
            )
            .await
    })
    .await?;

    Ok(Json(ChatReply::new(session_id, outcome)))
}

/// Get the status of a voiceboard session.
#[utoipa::path(
    get,
    path = "/voiceboard/status/{session_id}",
    responses(
        (status = 200, description = "Session status", body = SessionStatus),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID")
    )
)]
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let snapshot = state.registry.snapshot(&session_id).await?;
    Ok(Json(snapshot.into()))
}

/// Delete a voiceboard session. Deleting an unknown session is not an error.
#[utoipa::path(
    delete,
    path = "/voiceboard/{session_id}",
    responses(
        (status = 200, description = "Whether a session was removed", body = RemovedResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID")
    )
)]
pub async fn delete_voiceboard(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<RemovedResponse> {
    let removed = state.registry.remove(&session_id).await;
    Json(RemovedResponse { removed })
}

/// Clear the conversation history of a session, keeping its persona research.
#[utoipa::path(
    post,
    path = "/voiceboard/{session_id}/clear",
    responses(
        (status = 200, description = "History cleared", body = ClearedResponse),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID")
    )
)]
pub async fn clear_conversation(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearedResponse>, ApiError> {
    state.registry.clear(&session_id).await?;
    Ok(Json(ClearedResponse {
        session_id,
        cleared: true,
    }))
}

/// Discard cached research for the session's persona and research it again.
#[utoipa::path(
    post,
    path = "/voiceboard/{session_id}/reinitialize",
    responses(
        (status = 200, description = "Session reinitialized", body = SessionStatus),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID")
    )
)]
pub async fn reinitialize_voiceboard(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionStatus>, ApiError> {
    let registry = state.registry.clone();
    let snapshot = run_detached(async move { registry.reinitialize(&session_id).await }).await?;
    Ok(Json(snapshot.into()))
}

/// List the persona research cache.
#[utoipa::path(
    get,
    path = "/voiceboard/cache",
    responses(
        (status = 200, description = "Cached personas", body = CacheResponse)
    )
)]
pub async fn cache_info(State(state): State<Arc<AppState>>) -> Json<CacheResponse> {
    let response = match state.registry.coordinator().cache() {
        Some(cache) => CacheResponse {
            enabled: true,
            entries: cache.info().await.into_iter().map(CacheEntry::from).collect(),
        },
        None => CacheResponse {
            enabled: false,
            entries: Vec::new(),
        },
    };
    Json(response)
}

/// Drop every cached persona so new sessions research from scratch.
#[utoipa::path(
    delete,
    path = "/voiceboard/cache",
    responses(
        (status = 200, description = "Cache emptied", body = CacheResponse)
    )
)]
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> Json<CacheResponse> {
    let enabled = match state.registry.coordinator().cache() {
        Some(cache) => {
            cache.clear().await;
            true
        }
        None => false,
    };
    Json(CacheResponse {
        enabled,
        entries: Vec::new(),
    })
}

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        active_sessions: state.registry.len().await,
    })
}

/// Service information.
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service name, version and endpoints", body = ServiceInfo)
    )
)]
pub async fn service_info(State(state): State<Arc<AppState>>) -> Json<ServiceInfo> {
    let endpoints = [
        "GET /ws",
        "POST /voiceboard/create",
        "POST /voiceboard/chat",
        "GET /voiceboard/status/{sessionId}",
        "DELETE /voiceboard/{sessionId}",
        "POST /voiceboard/{sessionId}/clear",
        "POST /voiceboard/{sessionId}/reinitialize",
        "GET /voiceboard/cache",
        "DELETE /voiceboard/cache",
        "GET /health",
        "GET /swagger-ui",
    ];
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.chat_model.clone(),
        endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
    })
}
