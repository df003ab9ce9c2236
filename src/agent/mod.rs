//! Main orchestrator - the conversation state machine
//!
//! LOCK → LOAD → ROUTE → DISPATCH → GUARD → APPEND → PERSIST
//!
//! A live continuation marker sends the message straight to banking; every
//! other message goes through the intent router.

use crate::audit::{AuditLog, ToolAuditRecord};
use crate::auth::AuthenticationBinder;
use crate::classifier::IntentRouter;
use crate::config::OrchestratorConfig;
use crate::conversational::{FriendlyAgent, KnowledgeBase, RagAgent};
use crate::directory::BankDirectory;
use crate::error::OrchestrationError;
use crate::execution::{ExecutionEngine, LoopOutcome, LoopStatus};
use crate::llm::ChatModel;
use crate::memory::{ContextConfig, ContextManager, Turn};
use crate::models::{
    ContinuationMarker, ExchangeResponse, ExchangeResult, Intent, ResultType, Session,
    SessionSummary,
};
use crate::prompts::{
    APOLOGY_MESSAGE, BANKING_PROMPT, FALLBACK_MESSAGE, INCOMPLETE_MESSAGE, REFUSAL_MESSAGE,
};
use crate::state::{SessionLocks, SessionStore};
use crate::tools::create_banking_registry;
use crate::verification::{create_default_output_guard, GuardContext, OutputGuard};
use crate::Result;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const SESSION_KEY_LEN: usize = 16;

/// One inbound user message
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub session_key: String,
    /// Out-of-band channel identity (Slack user id, web handle)
    pub handle: Option<String>,
    pub message: String,
}

/// Everything the orchestrator talks to
pub struct OrchestratorDeps {
    pub directory: Arc<dyn BankDirectory>,
    /// Answers banking, friendly and knowledge requests
    pub model: Arc<dyn ChatModel>,
    /// Labels intents; may be the same instance as `model`
    pub router_model: Arc<dyn ChatModel>,
    pub sessions: Arc<dyn SessionStore>,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub audit_log: Arc<AuditLog>,
}

/// What one dispatched exchange produced, before guarding and persistence
struct Reply {
    result_type: ResultType,
    text: String,
    continuation: Option<ContinuationMarker>,
    supplied_pins: Vec<String>,
}

impl Reply {
    fn settled(result_type: ResultType, text: impl Into<String>) -> Self {
        Self {
            result_type,
            text: text.into(),
            continuation: None,
            supplied_pins: Vec::new(),
        }
    }
}

pub struct Orchestrator {
    directory: Arc<dyn BankDirectory>,
    binder: AuthenticationBinder,
    model: Arc<dyn ChatModel>,
    router: IntentRouter,
    friendly: FriendlyAgent,
    rag: RagAgent,
    sessions: Arc<dyn SessionStore>,
    locks: SessionLocks,
    audit_log: Arc<AuditLog>,
    guard: OutputGuard,
    context_manager: ContextManager,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(deps: OrchestratorDeps, config: OrchestratorConfig) -> Self {
        let context_manager = ContextManager::with_config(ContextConfig {
            preserve_recent_count: config.history_window,
        });

        Self {
            binder: AuthenticationBinder::new(deps.directory.clone()),
            router: IntentRouter::new(deps.router_model, config.round_timeout),
            friendly: FriendlyAgent::new(deps.model.clone(), context_manager.clone(), config.round_timeout),
            rag: RagAgent::new(deps.model.clone(), deps.knowledge, config.round_timeout),
            directory: deps.directory,
            model: deps.model,
            sessions: deps.sessions,
            locks: SessionLocks::new(),
            audit_log: deps.audit_log,
            guard: create_default_output_guard(),
            context_manager,
            config,
        }
    }

    /// Fresh random session key
    pub fn new_session_key() -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_KEY_LEN)
            .map(char::from)
            .collect();
        format!("session_{}", suffix)
    }

    /// Handle one user message end to end.
    ///
    /// Never fails: upstream and store errors become the fixed apology and
    /// leave the stored session as it was.
    pub async fn handle_message(&self, request: ChatRequest) -> ExchangeResponse {
        let _guard = self.locks.acquire(&request.session_key).await;

        let mut session = match self.sessions.load(&request.session_key).await {
            Ok(Some(session)) => session,
            Ok(None) => Session::new(request.session_key.clone()),
            Err(e) => {
                error!(session_key = %request.session_key, error = %e, "Session load failed");
                return apology(&Session::new(request.session_key.clone()), Intent::Fallback);
            }
        };

        if session.bound_identity.is_some() {
            match self.authorize(&session, request.handle.as_deref()).await {
                Ok(()) => {}
                Err(OrchestrationError::Unauthenticated(reason)) => {
                    warn!(session_key = %session.key, %reason, "Caller does not own this session");
                    return foreign_session_refusal(&request.session_key);
                }
                Err(e) => {
                    error!(session_key = %request.session_key, error = %e, "Session owner check failed");
                    return apology(&Session::new(request.session_key.clone()), Intent::Fallback);
                }
            }
        }

        let now = Utc::now();
        let continuation_live = match &session.continuation {
            Some(marker) if marker.is_live(self.config.continuation_ttl, now) => true,
            Some(marker) => {
                debug!(
                    session_key = %session.key,
                    reason = %marker.reason,
                    "Continuation marker expired"
                );
                false
            }
            None => false,
        };

        let intent = if continuation_live {
            debug!(session_key = %session.key, "Continuing pending banking flow");
            Intent::CustomerRequest
        } else {
            let previous = session.history.last_assistant().map(|t| t.content.as_str());
            self.router.classify(&request.message, previous).await
        };

        info!(session_key = %session.key, intent = %intent, "Routing message");

        let reply = match self.dispatch(&mut session, &request, intent).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(session_key = %request.session_key, error = %e, "Exchange aborted");
                let stored = self
                    .sessions
                    .load(&request.session_key)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| Session::new(request.session_key.clone()));
                return apology(&stored, intent);
            }
        };

        let guarded = self.guard.enforce(
            &reply.text,
            &GuardContext {
                supplied_pins: reply.supplied_pins,
            },
        );

        session
            .history
            .append_exchange(Turn::user(request.message.as_str()), Turn::assistant(guarded.text.as_str()));
        session.continuation = reply.continuation;
        session.updated_at = Utc::now();

        if let Err(e) = self.sessions.save(&session).await {
            error!(session_key = %session.key, error = %e, "Session save failed");
            let stored = self
                .sessions
                .load(&request.session_key)
                .await
                .ok()
                .flatten()
                .unwrap_or_else(|| Session::new(request.session_key.clone()));
            return apology(&stored, intent);
        }

        ExchangeResponse {
            response_text: guarded.text.clone(),
            intent,
            result: ExchangeResult {
                result_type: reply.result_type,
                content: guarded.text,
            },
            session_key: session.key.clone(),
            history: session.history.turns().to_vec(),
        }
    }

    async fn dispatch(&self, session: &mut Session, request: &ChatRequest, intent: Intent) -> Result<Reply> {
        match intent {
            Intent::CustomerRequest => self.banking(session, request).await,
            Intent::FriendlyChat => {
                let text = self.friendly.respond(&session.history, &request.message).await?;
                Ok(Reply::settled(ResultType::FriendlyResponse, text))
            }
            Intent::GeneralQuery => match self.rag.answer(&request.message).await? {
                Some(text) => Ok(Reply::settled(ResultType::RagResponse, text)),
                None => Ok(Reply::settled(ResultType::FallbackResponse, FALLBACK_MESSAGE)),
            },
            Intent::Fallback => Ok(Reply::settled(ResultType::FallbackResponse, FALLBACK_MESSAGE)),
        }
    }

    async fn banking(&self, session: &mut Session, request: &ChatRequest) -> Result<Reply> {
        let identity = match self.binder.resolve(session, request.handle.as_deref()).await {
            Ok(identity) => identity,
            Err(OrchestrationError::Unauthenticated(reason)) => {
                warn!(session_key = %session.key, %reason, "Refusing banking request");
                return Ok(Reply::settled(ResultType::RefusalResponse, REFUSAL_MESSAGE));
            }
            Err(e) => return Err(e),
        };

        if session.bound_identity.is_none() {
            info!(session_key = %session.key, "Binding session to client");
            session.bound_identity = Some(identity.clone());
        }

        let registry = create_banking_registry(identity.clone(), self.directory.clone());
        let engine = ExecutionEngine::new(registry, self.model.clone(), self.config.loop_config());

        let messages = self.context_manager.prepare_context_for_llm(
            BANKING_PROMPT,
            &session.history,
            &Turn::user(request.message.as_str()),
        );

        let outcome = engine.run(messages).await?;
        self.record_audit(&session.key, identity.client_id(), &outcome).await;

        let continuation = if outcome.any_tool_succeeded() {
            None
        } else if outcome.status == LoopStatus::Completed {
            Some(ContinuationMarker::pending("awaiting user input for banking request"))
        } else {
            Some(ContinuationMarker::pending("banking request not completed"))
        };

        let text = match outcome.status {
            LoopStatus::Completed | LoopStatus::Interrupted if !outcome.final_text.trim().is_empty() => {
                outcome.final_text.clone()
            }
            _ => INCOMPLETE_MESSAGE.to_string(),
        };

        Ok(Reply {
            result_type: ResultType::BankingResponse,
            text,
            continuation,
            supplied_pins: outcome.supplied_pins(),
        })
    }

    async fn record_audit(&self, session_key: &str, client_id: &str, outcome: &LoopOutcome) {
        for execution in &outcome.executions {
            let record = ToolAuditRecord::new(
                session_key,
                client_id,
                &execution.tool_name,
                &execution.arguments,
                execution.outcome,
                execution.execution_time_ms,
            );
            if let Err(e) = self.audit_log.record(record).await {
                warn!(error = %e, tool_name = %execution.tool_name, "Failed to write audit record");
            }
        }
    }

    /// Ok when `handle` may act for `session`. Unbound sessions are open;
    /// bound ones need a handle resolving to the bound client.
    async fn authorize(&self, session: &Session, handle: Option<&str>) -> Result<()> {
        if session.bound_identity.is_none() {
            return Ok(());
        }
        self.binder.resolve(session, handle).await.map(|_| ())
    }

    /// Unchecked read, for operators and tests
    pub async fn get_session(&self, key: &str) -> Result<Option<Session>> {
        self.sessions.load(key).await
    }

    /// Session as seen by a caller on `handle`. `Unauthenticated` when the
    /// session is bound to another client.
    pub async fn get_session_for(&self, key: &str, handle: Option<&str>) -> Result<Option<Session>> {
        let Some(session) = self.sessions.load(key).await? else {
            return Ok(None);
        };
        self.authorize(&session, handle).await?;
        Ok(Some(session))
    }

    pub async fn delete_session(&self, key: &str, handle: Option<&str>) -> Result<bool> {
        let _guard = self.locks.acquire(key).await;
        if let Some(session) = self.sessions.load(key).await? {
            self.authorize(&session, handle).await?;
        }
        self.sessions.delete(key).await
    }

    pub async fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        self.sessions.list().await
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit_log
    }
}

fn apology(stored: &Session, intent: Intent) -> ExchangeResponse {
    ExchangeResponse {
        response_text: APOLOGY_MESSAGE.to_string(),
        intent,
        result: ExchangeResult {
            result_type: ResultType::ErrorResponse,
            content: APOLOGY_MESSAGE.to_string(),
        },
        session_key: stored.key.clone(),
        history: stored.history.turns().to_vec(),
    }
}

/// Refusal for a caller presenting someone else's session key. The stored
/// session is neither shown nor modified.
fn foreign_session_refusal(session_key: &str) -> ExchangeResponse {
    ExchangeResponse {
        response_text: REFUSAL_MESSAGE.to_string(),
        intent: Intent::CustomerRequest,
        result: ExchangeResult {
            result_type: ResultType::RefusalResponse,
            content: REFUSAL_MESSAGE.to_string(),
        },
        session_key: session_key.to_string(),
        history: Vec::new(),
    }
}
