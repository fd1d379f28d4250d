//! Route handlers.
//!
//! Every handler reads the session from the `x-session-id` header and
//! answers with JSON; failures are rendered by [`ApiError`].

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use qa_core::{WorkflowStatus, DEFAULT_SESSION};
use qa_pipeline::{
    ChatResult, CodeView, CritiqueResult, DesignResult, ExploreResult, ImplementResult,
    RefineResult, VerifyResult,
};
use qa_runner::{EvidenceListing, RunEvent};

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-session-id";

/// Buffered events per streaming run.
const STREAM_BUFFER: usize = 16;

type AppResult<T> = Result<Json<T>, ApiError>;

/// Session id from the request header, or the default session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for SessionId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_SESSION);
        Ok(Self(id.to_string()))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExploreRequest {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DesignRequest {
    pub guidance: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CritiqueRequest {
    pub critique: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessageRequest {
    #[serde(alias = "feedback")]
    pub message: String,
}

/// Body of a JSON request, or its default when none was sent.
fn body<T: Default>(body: Option<Json<T>>) -> T {
    body.map(|Json(inner)| inner).unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub llm_available: bool,
    pub model: String,
    pub timestamp: String,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        llm_available: state.llm_available,
        model: state.pipeline.model().to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn explore(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
    request: Option<Json<ExploreRequest>>,
) -> AppResult<ExploreResult> {
    let request = body(request);
    Ok(Json(state.pipeline.explore(&session, &request.url).await?))
}

pub async fn design(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
    request: Option<Json<DesignRequest>>,
) -> AppResult<DesignResult> {
    let request = body(request);
    let guidance = request.guidance.as_deref().map(str::trim).filter(|g| !g.is_empty());
    Ok(Json(state.pipeline.design(&session, guidance).await?))
}

pub async fn implement(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> AppResult<ImplementResult> {
    Ok(Json(state.pipeline.implement(&session).await?))
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> AppResult<VerifyResult> {
    Ok(Json(state.pipeline.verify(&session).await?))
}

/// Stream a run as `data: {"event": .., "data": {..}}` frames.
///
/// The run continues in its own task; the stream closes once the runner's
/// terminal event has been sent.
pub async fn verify_stream(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<RunEvent>(STREAM_BUFFER);
    let pipeline = state.pipeline.clone();
    tokio::spawn(async move {
        match pipeline.verify_stream(&session, tx).await {
            Ok(report) => debug!(session = %session, summary = %report.summary(), "Stream finished"),
            Err(e) => warn!(session = %session, error = %e, "Streaming verification failed"),
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let frame = Event::default().json_data(&event).unwrap_or_else(|e| {
            Event::default().data(
                json!({ "event": "error", "data": { "error": e.to_string() } }).to_string(),
            )
        });
        Ok(frame)
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)))
}

pub async fn critique(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
    request: Option<Json<CritiqueRequest>>,
) -> AppResult<CritiqueResult> {
    let request = body(request);
    Ok(Json(state.pipeline.critique(&session, &request.critique).await?))
}

pub async fn refine(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
    request: Option<Json<MessageRequest>>,
) -> AppResult<RefineResult> {
    let request = body(request);
    Ok(Json(state.pipeline.refine(&session, &request.message).await?))
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
    request: Option<Json<MessageRequest>>,
) -> AppResult<ChatResult> {
    let request = body(request);
    Ok(Json(state.pipeline.chat(&session, &request.message).await?))
}

pub async fn reset(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> Json<Value> {
    state.pipeline.reset(&session).await;
    Json(json!({
        "success": true,
        "message": "Session reset successfully",
    }))
}

pub async fn workflow_state(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> Json<WorkflowStatus> {
    Json(state.pipeline.state(&session).await)
}

pub async fn code(
    State(state): State<Arc<AppState>>,
    SessionId(session): SessionId,
) -> Json<CodeView> {
    Json(state.pipeline.code(&session).await)
}

#[derive(Debug, Serialize)]
pub struct EvidenceResponse {
    pub success: bool,
    #[serde(flatten)]
    pub listing: EvidenceListing,
}

pub async fn evidence(State(state): State<Arc<AppState>>) -> Json<EvidenceResponse> {
    Json(EvidenceResponse {
        success: true,
        listing: state.pipeline.evidence(),
    })
}
