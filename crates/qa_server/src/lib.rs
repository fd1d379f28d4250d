//! # qa_server
//!
//! HTTP surface for qa-agent.
//!
//! Exposes each pipeline phase as a JSON route under `/api`, plus a
//! server-sent-events route that streams test results while a run is in
//! progress. Requests are scoped to a session by the `x-session-id` header.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::ServerConfig;
pub use error::{ApiError, ServerError, ServerResult};
pub use routes::SESSION_HEADER;
pub use state::AppState;

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/explore", post(routes::explore))
        .route("/api/design", post(routes::design))
        .route("/api/implement", post(routes::implement))
        .route("/api/verify", post(routes::verify))
        .route("/api/verify-stream", post(routes::verify_stream))
        .route("/api/critique", post(routes::critique))
        .route("/api/refine", post(routes::refine))
        .route("/api/chat", post(routes::chat))
        .route("/api/reset", post(routes::reset))
        .route("/api/state", get(routes::workflow_state))
        .route("/api/code", get(routes::code))
        .route("/api/evidence", get(routes::evidence))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
