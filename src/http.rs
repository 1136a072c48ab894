//! HTTP surface: the streaming `POST /api/chat` endpoint plus the ordinary
//! JSON read endpoints over sessions, tools and skills.
//!
//! The teacher SDK has no web-server layer of its own - this module's
//! SSE-over-channel wiring (`ReceiverStream` feeding an `axum::response::sse::Sse`,
//! client-disconnect detected via `Sender::closed()`) is grounded in the
//! `querymt-querymt` service binary in the example pack, adapted to this
//! runtime's `AgentEvent` shape instead of an OpenAI-compatible chat-completion
//! chunk.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{AgentDeps, AgentLoop, Cancellation};
use crate::error::Error;
use crate::session::normalize_session_key;
use crate::skills::SkillRegistry;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub deps: Arc<AgentDeps>,
    pub skills: Arc<SkillRegistry>,
    pub agent_loop: Arc<AgentLoop>,
}

/// Build the full router: the SSE chat endpoint plus the read-only JSON API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(post_chat))
        .route("/api/sessions", get(list_sessions))
        .route("/api/sessions/:key", get(get_session).patch(rename_session).delete(delete_session))
        .route("/api/tools", get(list_tools))
        .route("/api/tools/:name", get(get_tool))
        .route("/api/skills", get(list_skills))
        .route("/api/skills/:name", get(get_skill))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidInput(_) | Error::BadArguments { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> (StatusCode, Json<Value>) {
    let status = error_status(&err);
    (status, Json(json!({ "error": err.user_message() })))
}

// ---------------------------------------------------------------------------
// POST /api/chat
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    session_key: String,
}

async fn post_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, (StatusCode, Json<Value>)> {
    if req.message.trim().is_empty() {
        return Err(error_response(Error::invalid_input("message must not be empty")));
    }
    let session_key = normalize_session_key(&req.session_key).map_err(error_response)?;

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let cancellation = Cancellation::new();

    // A client that closes the connection drops the SSE body, which drops
    // the receiving end of the channel; `Sender::closed()` resolves as soon
    // as that happens, regardless of how many other senders are still live.
    let watcher_cancellation = cancellation.clone();
    let watcher_tx = tx.clone();
    tokio::spawn(async move {
        watcher_tx.closed().await;
        watcher_cancellation.cancel();
    });

    let agent_loop = state.agent_loop.clone();
    tokio::spawn(async move {
        if let Err(err) = agent_loop.run(&session_key, &req.message, cancellation, tx).await {
            log::error!("agent loop failed for session '{session_key}': {err}");
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| json!({"type": "error"}).to_string());
        Ok(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new()))
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SessionListResponse {
    sessions: Vec<SessionRow>,
}

#[derive(Serialize)]
struct SessionRow {
    key: String,
    name: String,
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionListResponse>, (StatusCode, Json<Value>)> {
    let sessions = state.deps.sessions.list_sessions().await.map_err(error_response)?;
    Ok(Json(SessionListResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionRow { key: s.key, name: s.display_name })
            .collect(),
    }))
}

#[derive(Serialize)]
struct SessionMessagesResponse {
    messages: Vec<crate::types::Message>,
}

async fn get_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionMessagesResponse>, (StatusCode, Json<Value>)> {
    let key = normalize_session_key(&key).map_err(error_response)?;
    let messages = state.deps.sessions.list(&key).await.map_err(error_response)?;
    Ok(Json(SessionMessagesResponse { messages }))
}

#[derive(Deserialize)]
struct RenameSessionRequest {
    name: String,
}

async fn rename_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<RenameSessionRequest>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let key = normalize_session_key(&key).map_err(error_response)?;
    state.deps.sessions.rename(&key, &req.name).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_session(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<Value>)> {
    let key = normalize_session_key(&key).map_err(error_response)?;
    state.deps.sessions.delete(&key).await.map_err(error_response)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ToolSummary {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    categories: std::collections::BTreeMap<String, Vec<ToolSummary>>,
}

async fn list_tools(State(state): State<AppState>) -> Json<ToolListResponse> {
    let mut categories: std::collections::BTreeMap<String, Vec<ToolSummary>> = std::collections::BTreeMap::new();
    for spec in state.deps.tools.list() {
        categories.entry(spec.category.clone()).or_default().push(ToolSummary {
            name: spec.name.clone(),
            description: spec.description.clone(),
        });
    }
    Json(ToolListResponse { categories })
}

#[derive(Serialize)]
struct ToolDetail {
    name: String,
    description: String,
    parameters: Value,
}

async fn get_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToolDetail>, (StatusCode, Json<Value>)> {
    let spec = state
        .deps
        .tools
        .get(&name)
        .ok_or_else(|| error_response(Error::not_found(format!("tool '{name}'"))))?;
    Ok(Json(ToolDetail {
        name: spec.name.clone(),
        description: spec.description.clone(),
        parameters: spec.parameters.clone(),
    }))
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SkillSummary {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct SkillListResponse {
    skills: Vec<SkillSummary>,
}

async fn list_skills(State(state): State<AppState>) -> Json<SkillListResponse> {
    Json(SkillListResponse {
        skills: state
            .skills
            .all()
            .into_iter()
            .map(|s| SkillSummary { name: s.name.clone(), description: s.description.clone() })
            .collect(),
    })
}

#[derive(Serialize)]
struct SkillDetail {
    name: String,
    description: String,
    triggers: Vec<String>,
    instructions: String,
    allowed_tools: Option<Vec<String>>,
}

async fn get_skill(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SkillDetail>, (StatusCode, Json<Value>)> {
    let skill = state
        .skills
        .get(&name)
        .ok_or_else(|| error_response(Error::not_found(format!("skill '{name}'"))))?;
    Ok(Json(SkillDetail {
        name: skill.name.clone(),
        description: skill.description.clone(),
        triggers: skill.triggers.clone(),
        instructions: skill.instructions.clone(),
        allowed_tools: skill.allowed_tools.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::memory::MemoryIndex;
    use crate::session::SessionStore;
    use crate::skills::SkillRegistry;
    use crate::tool_context::ToolContextStore;
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use crate::llm::{CompletionResult, LlmAdapter};
    use crate::types::Message;

    struct EchoLlm;

    #[async_trait]
    impl LlmAdapter for EchoLlm {
        async fn complete(&self, _messages: &[Message], _tools: &[crate::tools::ToolSpec]) -> crate::error::Result<CompletionResult> {
            Ok(CompletionResult { text: Some("hi".to_string()), tool_calls: vec![] })
        }

        async fn stream_answer(
            &self,
            _messages: &[Message],
            on_chunk: &mut (dyn FnMut(String) -> crate::error::Result<()> + Send),
        ) -> crate::error::Result<()> {
            on_chunk("hi".to_string())
        }
    }

    fn test_state() -> (AppState, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config::builder().openai_api_key("sk-test").storage_root(dir.path()).build().unwrap();
        let deps = Arc::new(AgentDeps {
            sessions: Arc::new(SessionStore::new(dir.path())),
            tool_context: Arc::new(ToolContextStore::new(dir.path())),
            memory: Arc::new(MemoryIndex::new(dir.path())),
            tools: Arc::new(ToolRegistry::new()),
            llm: Arc::new(EchoLlm),
            config,
        });
        let skills = Arc::new(SkillRegistry::new());
        let agent_loop = Arc::new(AgentLoop::new(deps.clone()));
        (AppState { deps, skills, agent_loop }, dir)
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_list_sessions_empty_store() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_get_unknown_tool_is_not_found() {
        let (state, _dir) = test_state();
        let app = router(state);
        let response = app
            .oneshot(Request::builder().uri("/api/tools/does-not-exist").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename_missing_session_is_not_found() {
        let (state, _dir) = test_state();
        let app = router(state);
        let body = Body::from(serde_json::to_vec(&json!({"name": "x"})).unwrap());
        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/sessions/nope")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_post_chat_rejects_empty_message() {
        let (state, _dir) = test_state();
        let app = router(state);
        let body = Body::from(serde_json::to_vec(&json!({"message": "", "session_key": "s1"})).unwrap());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_chat_streams_sse_events() {
        let (state, _dir) = test_state();
        let app = router(state);
        let body = Body::from(serde_json::to_vec(&json!({"message": "hello", "session_key": "s1"})).unwrap());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header("content-type", "application/json")
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").and_then(|v| v.to_str().ok()),
            Some("text/event-stream")
        );
    }
}
