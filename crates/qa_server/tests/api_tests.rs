//! Route tests driven through the router with scripted collaborators.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use qa_core::ArtifactStore;
use qa_llm::ScriptedLlm;
use qa_pipeline::Pipeline;
use qa_runner::{MockInspector, MockRun, MockRunner};
use qa_server::{router, AppState, SESSION_HEADER};

const PAGE_MODEL_REPLY: &str = r##"{"url": "https://example.com", "elements": [{"type": "button", "locator": "#login-btn", "description": "Login"}]}"##;
const DESIGN_REPLY: &str = r#"[{"id": "TC001", "title": "Login works", "priority": "high"}]"#;
const CODE_REPLY: &str = "```python\nfrom playwright.sync_api import Page, expect\n\ndef test_login(page: Page):\n    page.goto(\"https://example.com\")\n    expect(page).to_have_title(\"Example\")\n```";

fn app(llm: ScriptedLlm, runner: MockRunner) -> (Router, TempDir) {
    let temp = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(llm),
        Arc::new(runner.evidence_dir_path(temp.path().join("evidence"))),
        Arc::new(MockInspector::new()),
        ArtifactStore::new(temp.path()),
    );
    (router(AppState::new(pipeline, true)), temp)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn test_health() {
    let (app, _temp) = app(ScriptedLlm::new(), MockRunner::new());

    let (status, body) = send(&app, get("/api/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["llm_available"], true);
    assert_eq!(body["model"], "scripted-model");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_explore_validates_url() {
    let (app, _temp) = app(ScriptedLlm::new(), MockRunner::new());

    let (status, body) = send(&app, post("/api/explore", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "URL is required" }));

    let (status, body) = send(&app, post("/api/explore", json!({ "url": "not a url" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid URL format");
}

#[tokio::test]
async fn test_out_of_order_phases_are_rejected() {
    let (app, _temp) = app(ScriptedLlm::new(), MockRunner::new());

    let (status, body) = send(&app, post("/api/design", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please explore a URL first");

    let (status, body) = send(&app, post("/api/verify", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please implement tests first");

    let (status, body) = send(&app, post("/api/critique", json!({ "critique": "faster" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Please run verification first");
}

#[tokio::test]
async fn test_collaborator_failure_is_server_error() {
    let (app, _temp) = app(ScriptedLlm::new().fail("upstream down"), MockRunner::new());

    let (status, body) = send(
        &app,
        post("/api/explore", json!({ "url": "https://example.com" })),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "LLM request failed: upstream down");
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let llm = ScriptedLlm::with_replies([PAGE_MODEL_REPLY, DESIGN_REPLY, CODE_REPLY]);
    let runner = MockRunner::new().add_run(MockRun::with_results(&[("test_login", true)]));
    let (app, _temp) = app(llm, runner);

    let (status, body) = send(
        &app,
        post("/api/explore", json!({ "url": "https://example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["page_data"]["elements"][0]["locator"], "#login-btn");
    assert!(body["response_time"].is_number());
    assert_eq!(body["metrics"]["iteration_count"], 1);

    let (status, body) = send(&app, post("/api/design", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["test_cases"][0]["id"], "TC001");
    assert_eq!(body["summary"]["high_priority"], 1);

    let (status, body) = send(&app, post("/api/implement", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["self_correction"]["attempts"], 0);
    assert!(body["code"].as_str().unwrap().contains("def test_login"));

    let (status, body) = send(&app, post("/api/verify", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["status"], "passed");
    assert_eq!(body["report"]["summary"], "Executed 1 tests: 1 passed, 0 failed");

    let (_, body) = send(&app, get("/api/state")).await;
    assert_eq!(body["phase"], "verified");
    assert_eq!(body["suggested_action"], "complete");

    let (_, body) = send(&app, get("/api/code")).await;
    assert_eq!(body["has_code"], true);
}

#[tokio::test]
async fn test_sessions_are_scoped_by_header() {
    let (app, _temp) = app(ScriptedLlm::with_replies([PAGE_MODEL_REPLY]), MockRunner::new());

    let mut request = post("/api/explore", json!({ "url": "https://example.com" }));
    request
        .headers_mut()
        .insert(SESSION_HEADER, "alice".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);

    let mut request = get("/api/state");
    request
        .headers_mut()
        .insert(SESSION_HEADER, "alice".parse().unwrap());
    let (_, alice) = send(&app, request).await;
    let (_, default) = send(&app, get("/api/state")).await;

    assert_eq!(alice["phase"], "explored");
    assert_eq!(default["phase"], "idle");
    assert_eq!(default["suggested_action"], "explore");
}

#[tokio::test]
async fn test_reset() {
    let (app, _temp) = app(ScriptedLlm::with_replies([PAGE_MODEL_REPLY]), MockRunner::new());
    send(&app, post("/api/explore", json!({ "url": "https://example.com" }))).await;

    let (status, body) = send(&app, post("/api/reset", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session reset successfully");
    let (_, state) = send(&app, get("/api/state")).await;
    assert_eq!(state["phase"], "idle");
    assert_eq!(state["has_page_structure"], false);
}

#[tokio::test]
async fn test_chat_requires_message() {
    let (app, _temp) = app(ScriptedLlm::with_replies(["Hello!"]), MockRunner::new());

    let (status, body) = send(&app, post("/api/chat", json!({ "message": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Message is required");

    let (status, body) = send(&app, post("/api/chat", json!({ "message": "hi" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "Hello!");
}

#[tokio::test]
async fn test_verify_stream_without_code_emits_error_event() {
    let (app, _temp) = app(ScriptedLlm::new(), MockRunner::new());

    let response = app.oneshot(post("/api/verify-stream", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let frames: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();
    assert_eq!(
        frames,
        vec![json!({ "event": "error", "data": { "error": "Please implement tests first" } })]
    );
}

#[tokio::test]
async fn test_verify_stream_emits_results() {
    let llm = ScriptedLlm::with_replies([PAGE_MODEL_REPLY, DESIGN_REPLY, CODE_REPLY]);
    let runner = MockRunner::new().add_run(MockRun::with_results(&[
        ("test_login", true),
        ("test_logout", false),
    ]));
    let (app, _temp) = app(llm, runner);
    send(&app, post("/api/explore", json!({ "url": "https://example.com" }))).await;
    send(&app, post("/api/design", json!({}))).await;
    send(&app, post("/api/implement", json!({}))).await;

    let response = app
        .clone()
        .oneshot(post("/api/verify-stream", json!({})))
        .await
        .unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let events: Vec<Value> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .map(|d| serde_json::from_str(d).unwrap())
        .collect();

    let names: Vec<&str> = events.iter().map(|e| e["event"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["start", "test_result", "test_result", "complete"]);
    assert_eq!(events[1]["data"]["display_name"], "test_login");
    assert_eq!(events[2]["data"]["passed"], false);
    assert_eq!(events[3]["data"]["passed"], 1);
    assert_eq!(events[3]["data"]["failed"], 1);

    let (_, state) = send(&app, get("/api/state")).await;
    assert_eq!(state["phase"], "verified");
}

#[tokio::test]
async fn test_evidence_listing() {
    let (app, temp) = app(ScriptedLlm::new(), MockRunner::new());
    let session = temp.path().join("evidence").join("20240101_120000");
    std::fs::create_dir_all(&session).unwrap();
    std::fs::write(session.join("test_login.webm"), b"video").unwrap();

    let (status, body) = send(&app, get("/api/evidence")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["videos"][0]["name"], "test_login.webm");
    assert_eq!(body["videos"][0]["size"], 5);
}

#[tokio::test]
async fn test_state_for_unknown_session_registers_nothing() {
    let temp = TempDir::new().unwrap();
    let pipeline = Pipeline::new(
        Arc::new(ScriptedLlm::new()),
        Arc::new(MockRunner::new()),
        Arc::new(MockInspector::new()),
        ArtifactStore::new(temp.path()),
    );
    let state = AppState::new(pipeline, true);
    let app = router(state.clone());

    for uri in ["/api/state", "/api/code"] {
        let mut request = get(uri);
        request
            .headers_mut()
            .insert(SESSION_HEADER, "newcomer".parse().unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
    }
    let mut request = post("/api/design", json!({}));
    request
        .headers_mut()
        .insert(SESSION_HEADER, "newcomer".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(state.pipeline.sessions().len(), 0);
}
