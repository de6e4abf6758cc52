//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{
        CacheEntry, CacheResponse, ChatPayload, ChatReply, ClearedResponse,
        CreateVoiceboardPayload, ErrorResponse, HealthResponse, RemovedResponse, ServiceInfo,
        SessionStatus,
    },
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{delete, get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_voiceboard,
        handlers::chat,
        handlers::session_status,
        handlers::delete_voiceboard,
        handlers::clear_conversation,
        handlers::reinitialize_voiceboard,
        handlers::cache_info,
        handlers::clear_cache,
        handlers::health,
        handlers::service_info,
    ),
    components(
        schemas(
            CreateVoiceboardPayload, ChatPayload, SessionStatus, ChatReply, RemovedResponse,
            ClearedResponse, CacheEntry, CacheResponse, HealthResponse, ServiceInfo, ErrorResponse
        )
    ),
    tags(
        (name = "Voiceboard API", description = "Persona chat sessions backed by web research")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/", get(handlers::service_info))
        .route("/health", get(handlers::health))
        .route("/voiceboard/create", post(handlers::create_voiceboard))
        .route("/voiceboard/chat", post(handlers::chat))
        .route(
            "/voiceboard/cache",
            get(handlers::cache_info).delete(handlers::clear_cache),
        )
        .route(
            "/voiceboard/status/{session_id}",
            get(handlers::session_status),
        )
        .route("/voiceboard/{session_id}", delete(handlers::delete_voiceboard))
        .route(
            "/voiceboard/{session_id}/clear",
            post(handlers::clear_conversation),
        )
        .route(
            "/voiceboard/{session_id}/reinitialize",
            post(handlers::reinitialize_voiceboard),
        )
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
