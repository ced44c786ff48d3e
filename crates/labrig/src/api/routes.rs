//! API route definitions.

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use axum::routing::{delete, get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::{DefaultMakeSpan, TraceLayer};
use tracing::{Level, warn};

use crate::api::handlers::{cluster, misc, sessions, terminal, validation};
use crate::api::state::AppState;

/// Assemble the API router. The caller nests it under `/api`.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state);

    Router::new()
        .route("/health", get(misc::health))
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/{session_id}", delete(sessions::delete_session))
        .route(
            "/sessions/{session_id}/execute",
            post(sessions::execute_command),
        )
        .route(
            "/sessions/{session_id}/output",
            get(sessions::session_output),
        )
        .route("/session/create", post(sessions::create_workspace_session))
        .route("/session/end", post(sessions::end_session))
        .route("/terminal/execute", post(terminal::execute_terminal))
        .route("/validate", post(validation::validate_step))
        .route("/create-namespace", post(cluster::create_namespace))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

/// CORS from the configured origins, falling back to any origin when none
/// parse or none are configured.
fn build_cors_layer(state: &AppState) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN]);

    let origins: Vec<HeaderValue> = state
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin, "ignoring unparseable CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if !state.cors_allowed_origins.is_empty() {
            warn!("no configured CORS origin parsed, allowing any origin");
        }
        layer.allow_origin(AllowOrigin::any())
    } else {
        layer.allow_origin(origins)
    }
}
