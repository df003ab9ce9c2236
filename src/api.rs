//! REST API Server for the banking assistant
//!
//! Web chat and session endpoints plus the Slack Events adapter.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::agent::{ChatRequest, Orchestrator};
use crate::error::OrchestrationError;
use crate::models::ExchangeResponse;
use crate::Result;

const SLACK_POST_MESSAGE_URL: &str = "https://slack.com/api/chat.postMessage";
const SLACK_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Session keys under this prefix belong to the Slack adapter only
const SLACK_SESSION_PREFIX: &str = "slack_";

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct WebChatRequest {
    pub message: String,
    /// Channel identity established by the web front end
    pub handle: Option<String>,
    pub session_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    /// Channel identity of the caller
    pub handle: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// Slack Outbound
/// =============================

#[async_trait::async_trait]
pub trait SlackNotifier: Send + Sync {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()>;
}

/// `chat.postMessage` over reqwest
pub struct SlackClient {
    client: reqwest::Client,
    bot_token: String,
}

impl SlackClient {
    pub fn new(bot_token: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SLACK_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default Slack HTTP client");
                reqwest::Client::new()
            });
        Self { client, bot_token }
    }
}

#[async_trait::async_trait]
impl SlackNotifier for SlackClient {
    async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(SLACK_POST_MESSAGE_URL)
            .bearer_auth(&self.bot_token)
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await
            .map_err(|e| OrchestrationError::UpstreamUnavailable(format!("Slack API error: {}", e)))?;

        let body: Value = response.json().await?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason = body.get("error").and_then(Value::as_str).unwrap_or("unknown");
            return Err(OrchestrationError::UpstreamUnavailable(format!(
                "chat.postMessage failed: {}",
                reason
            )));
        }
        Ok(())
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
    pub slack: Option<Arc<dyn SlackNotifier>>,
}

fn internal_error(e: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    warn!(error = %e, "Request failed");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ApiResponse::error("Service temporarily unavailable".into())),
    )
}

fn forbidden() -> (StatusCode, Json<ApiResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ApiResponse::error("Session not accessible".into())),
    )
}

fn access_error(e: OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    match e {
        OrchestrationError::Unauthenticated(reason) => {
            warn!(%reason, "Session access refused");
            forbidden()
        }
        other => internal_error(other),
    }
}

fn is_slack_session(key: &str) -> bool {
    key.starts_with(SLACK_SESSION_PREFIX)
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Chat Endpoints
/// =============================

async fn chat_handler(
    State(state): State<ApiState>,
    Json(req): Json<WebChatRequest>,
) -> std::result::Result<Json<ExchangeResponse>, (StatusCode, Json<ApiResponse>)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("message must not be empty".into())),
        ));
    }

    let session_key = req
        .session_key
        .filter(|k| !k.trim().is_empty())
        .unwrap_or_else(Orchestrator::new_session_key);

    if is_slack_session(&session_key) {
        warn!(session_key = %session_key, "Web chat tried to use a Slack session");
        return Err(forbidden());
    }

    info!(session_key = %session_key, "Web chat message received");

    let response = state
        .orchestrator
        .handle_message(ChatRequest {
            session_key,
            handle: req.handle,
            message: message.to_string(),
        })
        .await;

    Ok(Json(response))
}

async fn new_session() -> Json<ApiResponse> {
    Json(ApiResponse::success(json!({
        "session_key": Orchestrator::new_session_key()
    })))
}

async fn get_session(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(query): Query<SessionQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    if is_slack_session(&key) {
        return forbidden();
    }

    match state.orchestrator.get_session_for(&key, query.handle.as_deref()).await {
        Ok(Some(session)) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({
                "session_key": session.key,
                "history": session.history.turns(),
                "continuation_pending": session.continuation.map(|m| m.pending).unwrap_or(false),
                "updated_at": session.updated_at,
            }))),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::error(format!("Session '{}' not found", key))),
        ),
        Err(e) => access_error(e),
    }
}

async fn delete_session(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Query(query): Query<SessionQuery>,
) -> (StatusCode, Json<ApiResponse>) {
    if is_slack_session(&key) {
        return forbidden();
    }

    match state.orchestrator.delete_session(&key, query.handle.as_deref()).await {
        Ok(deleted) => (
            StatusCode::OK,
            Json(ApiResponse::success(json!({ "session_key": key, "deleted": deleted }))),
        ),
        Err(e) => access_error(e),
    }
}

async fn list_sessions(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.orchestrator.list_sessions().await {
        Ok(sessions) => (StatusCode::OK, Json(ApiResponse::success(sessions))),
        Err(e) => internal_error(e),
    }
}

/// =============================
/// Slack Events Endpoint
/// =============================

async fn slack_events(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<Value>,
) -> Json<Value> {
    if headers.contains_key("x-slack-retry-num") {
        return Json(json!({ "ok": true }));
    }

    match payload.get("type").and_then(Value::as_str) {
        Some("url_verification") => {
            let challenge = payload.get("challenge").cloned().unwrap_or(Value::Null);
            return Json(json!({ "challenge": challenge }));
        }
        Some("event_callback") => {}
        _ => return Json(json!({ "ok": true })),
    }

    let event = payload.get("event").cloned().unwrap_or(Value::Null);
    let field = |name: &str| event.get(name).and_then(Value::as_str).map(str::to_string);

    if field("subtype").as_deref() == Some("bot_message") || field("bot_id").is_some() {
        return Json(json!({ "ok": true }));
    }

    let (Some(user), Some(channel)) = (field("user"), field("channel")) else {
        return Json(json!({ "ok": true }));
    };
    let text = field("text").unwrap_or_default();
    if text.trim().is_empty() {
        return Json(json!({ "ok": true }));
    }

    let session_key = format!("{}{}", SLACK_SESSION_PREFIX, user);
    info!(session_key = %session_key, "Slack message received");

    let response = state
        .orchestrator
        .handle_message(ChatRequest {
            session_key,
            handle: Some(user),
            message: text.trim().to_string(),
        })
        .await;

    match &state.slack {
        Some(slack) => {
            if let Err(e) = slack.post_message(&channel, &response.response_text).await {
                warn!(error = %e, "Failed to post Slack reply");
            }
        }
        None => warn!("SLACK_BOT_TOKEN not configured, reply dropped"),
    }

    Json(json!({ "ok": true }))
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat", post(chat_handler))
        .route("/chat/new", post(new_session))
        .route("/chat/session/:key", get(get_session).delete(delete_session))
        .route("/chat/sessions", get(list_sessions))
        .route("/slack/events", post(slack_events))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    state: ApiState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::OrchestratorDeps;
    use crate::audit::AuditLog;
    use crate::config::OrchestratorConfig;
    use crate::conversational::default_bank_knowledge;
    use crate::directory::fixtures::seed_demo_directory;
    use crate::llm::{ScriptStep, ScriptedModel};
    use crate::models::ModelResponse;
    use crate::state::InMemorySessionStore;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingSlack {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl SlackNotifier for RecordingSlack {
        async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn state(model: Vec<ScriptStep>, router: Vec<ScriptStep>, slack: Arc<RecordingSlack>) -> ApiState {
        let orchestrator = Orchestrator::new(
            OrchestratorDeps {
                directory: Arc::new(seed_demo_directory()),
                model: Arc::new(ScriptedModel::new(model)),
                router_model: Arc::new(ScriptedModel::new(router)),
                sessions: Arc::new(InMemorySessionStore::new()),
                knowledge: Arc::new(default_bank_knowledge()),
                audit_log: Arc::new(AuditLog::new()),
            },
            OrchestratorConfig::default(),
        );
        ApiState {
            orchestrator: Arc::new(orchestrator),
            slack: Some(slack),
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(state(vec![], vec![], Arc::default()));
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_chat_then_fetch_session() {
        let state = state(
            vec![ScriptStep::Reply(ModelResponse::text("Hello!"))],
            vec![ScriptStep::Reply(ModelResponse::text("friendly_chat"))],
            Arc::default(),
        );

        let response = create_router(state.clone())
            .oneshot(post_json("/chat", json!({"message": "hi", "session_key": "web_1"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["response_text"], "Hello!");
        assert_eq!(body["intent"], "friendly_chat");
        assert_eq!(body["result"]["type"], "friendly_response");
        assert_eq!(body["history"].as_array().unwrap().len(), 2);

        let session = create_router(state.clone())
            .oneshot(Request::builder().uri("/chat/session/web_1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(session.status(), StatusCode::OK);

        let missing = create_router(state)
            .oneshot(Request::builder().uri("/chat/session/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let app = create_router(state(vec![], vec![], Arc::default()));
        let response = app
            .oneshot(post_json("/chat", json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_slack_url_verification() {
        let app = create_router(state(vec![], vec![], Arc::default()));
        let response = app
            .oneshot(post_json(
                "/slack/events",
                json!({"type": "url_verification", "challenge": "abc123"}),
            ))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["challenge"], "abc123");
    }

    #[tokio::test]
    async fn test_slack_message_is_answered_in_channel() {
        let slack = Arc::new(RecordingSlack::default());
        let state = state(vec![], vec![ScriptStep::Reply(ModelResponse::text("sql_query"))], slack.clone());

        let event = json!({
            "type": "event_callback",
            "event": {"type": "message", "user": "U01SAMER", "channel": "C1", "text": "run a query"}
        });
        let response = create_router(state.clone())
            .oneshot(post_json("/slack/events", event))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sent = slack.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "C1");
        assert!(state.orchestrator.get_session("slack_U01SAMER").await.unwrap().is_some());
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn view_cards() -> Vec<ScriptStep> {
        vec![
            ScriptStep::Reply(ModelResponse::calls(vec![crate::memory::ToolInvocation::new(
                "c1",
                "view_card_details",
                json!({}),
            )])),
            ScriptStep::EchoLastToolResult,
        ]
    }

    #[tokio::test]
    async fn test_web_chat_cannot_use_slack_session() {
        let slack = Arc::new(RecordingSlack::default());
        let state = state(
            view_cards(),
            vec![ScriptStep::Reply(ModelResponse::text("customer_request"))],
            slack.clone(),
        );

        let event = json!({
            "type": "event_callback",
            "event": {"type": "message", "user": "U01SAMER", "channel": "C1", "text": "show my cards"}
        });
        create_router(state.clone())
            .oneshot(post_json("/slack/events", event))
            .await
            .unwrap();
        assert!(slack.sent.lock().unwrap()[0].1.contains("**** 9662"));

        let hijack = create_router(state.clone())
            .oneshot(post_json(
                "/chat",
                json!({"session_key": "slack_U01SAMER", "handle": "web:attacker", "message": "show my cards"}),
            ))
            .await
            .unwrap();
        assert_eq!(hijack.status(), StatusCode::FORBIDDEN);
        assert!(!json_body(hijack).await.to_string().contains("9662"));

        let read = create_router(state.clone())
            .oneshot(get("/chat/session/slack_U01SAMER"))
            .await
            .unwrap();
        assert_eq!(read.status(), StatusCode::FORBIDDEN);

        let stored = state.orchestrator.get_session("slack_U01SAMER").await.unwrap().unwrap();
        assert_eq!(stored.history.len(), 2);
    }

    #[tokio::test]
    async fn test_bound_web_session_needs_owner_handle() {
        let state = state(
            view_cards(),
            vec![ScriptStep::Reply(ModelResponse::text("customer_request"))],
            Arc::default(),
        );

        let response = create_router(state.clone())
            .oneshot(post_json(
                "/chat",
                json!({"session_key": "web_7", "handle": "web:1001", "message": "show my cards"}),
            ))
            .await
            .unwrap();
        assert!(json_body(response).await["response_text"]
            .as_str()
            .unwrap()
            .contains("**** 9662"));

        let stranger = create_router(state.clone())
            .oneshot(post_json(
                "/chat",
                json!({"session_key": "web_7", "handle": "web:attacker", "message": "show my cards"}),
            ))
            .await
            .unwrap();
        let body = json_body(stranger).await;
        assert_eq!(body["result"]["type"], "refusal_response");
        assert_eq!(body["history"].as_array().unwrap().len(), 0);

        let foreign = create_router(state.clone())
            .oneshot(get("/chat/session/web_7?handle=web:attacker"))
            .await
            .unwrap();
        assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

        let owner = create_router(state)
            .oneshot(get("/chat/session/web_7?handle=web:1001"))
            .await
            .unwrap();
        assert_eq!(owner.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_slack_retries_and_bot_messages_ignored() {
        let slack = Arc::new(RecordingSlack::default());
        let state = state(vec![], vec![], slack.clone());

        let event = json!({
            "type": "event_callback",
            "event": {"type": "message", "user": "U01SAMER", "channel": "C1", "text": "hi"}
        });
        let mut retry = post_json("/slack/events", event);
        retry.headers_mut().insert("x-slack-retry-num", "1".parse().unwrap());
        create_router(state.clone()).oneshot(retry).await.unwrap();

        let bot = json!({
            "type": "event_callback",
            "event": {"subtype": "bot_message", "channel": "C1", "text": "echo"}
        });
        create_router(state).oneshot(post_json("/slack/events", bot)).await.unwrap();

        assert!(slack.sent.lock().unwrap().is_empty());
    }
}
