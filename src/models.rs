//! Core data models for the banking assistant

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::memory::{ConversationHistory, ToolInvocation, Turn};

//
// ================= Identity =================
//

/// A client identity resolved from an out-of-band handle or a prior session
/// binding. Never constructed from message text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AuthenticatedIdentity {
    client_id: String,
}

impl AuthenticatedIdentity {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Display for AuthenticatedIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.client_id)
    }
}

//
// ================= Intent =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CustomerRequest,
    FriendlyChat,
    GeneralQuery,
    Fallback,
}

impl Intent {
    /// Map a classifier label onto an intent. Anything outside the known set
    /// is `Fallback`.
    pub fn from_label(label: &str) -> Self {
        let cleaned: String = label
            .trim()
            .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
            .to_lowercase();

        match cleaned.as_str() {
            "customer_request" => Intent::CustomerRequest,
            "friendly_chat" => Intent::FriendlyChat,
            "general_query" => Intent::GeneralQuery,
            _ => Intent::Fallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CustomerRequest => "customer_request",
            Intent::FriendlyChat => "friendly_chat",
            Intent::GeneralQuery => "general_query",
            Intent::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Session =================
//

/// Marks a banking flow waiting on the user's next reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContinuationMarker {
    pub pending: bool,
    pub reason: String,
    pub set_at: DateTime<Utc>,
}

impl ContinuationMarker {
    pub fn pending(reason: impl Into<String>) -> Self {
        Self {
            pending: true,
            reason: reason.into(),
            set_at: Utc::now(),
        }
    }

    /// A marker older than `ttl` no longer diverts routing.
    pub fn is_live(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        self.pending && now.signed_duration_since(self.set_at) <= ttl
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub key: String,
    pub history: ConversationHistory,
    #[serde(default)]
    pub continuation: Option<ContinuationMarker>,
    #[serde(default)]
    pub bound_identity: Option<AuthenticatedIdentity>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            history: ConversationHistory::new(),
            continuation: None,
            bound_identity: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing entry for the session endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_key: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

//
// ================= Exchange Result =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    BankingResponse,
    FriendlyResponse,
    RagResponse,
    FallbackResponse,
    RefusalResponse,
    ErrorResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResult {
    #[serde(rename = "type")]
    pub result_type: ResultType,
    pub content: String,
}

/// What the orchestrator hands back to a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResponse {
    pub response_text: String,
    pub intent: Intent,
    pub result: ExchangeResult,
    pub session_key: String,
    pub history: Vec<Turn>,
}

//
// ================= Banking Records =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub client_id: String,
    pub handles: Vec<String>,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardRecord {
    pub card_token: String,
    pub client_id: String,
    pub card_number: String,
    pub card_type: String,
    pub product_type: String,
    pub currency: String,
    pub status: String,
    /// DDMMYYYY
    pub expiry_date: String,
    pub available_balance: f64,
    pub current_balance: f64,
    pub card_limit: f64,
    pub cashback: f64,
    #[serde(skip_serializing)]
    pub pin_hash: String,
}

impl CardRecord {
    pub fn last_four(&self) -> &str {
        let start = self
            .card_number
            .char_indices()
            .rev()
            .nth(3)
            .map(|(index, _)| index)
            .unwrap_or(0);
        &self.card_number[start..]
    }

    pub fn masked_number(&self) -> String {
        format!("**** {}", self.last_four())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// DDMMYYYY
    pub date: String,
    /// HHMMSS
    pub time: String,
    pub amount: String,
    pub currency: String,
    pub transaction_type: String,
    pub description: String,
    pub terminal_location: String,
    pub reference_number: String,
    pub status: String,
}

//
// ================= Model I/O =================
//

/// One model reply: final text, or tool requests (possibly with text)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}

impl ModelResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn calls(tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Function declaration advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text fed back to the model
    pub content: String,
    pub data: serde_json::Value,
}
